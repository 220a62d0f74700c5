//! AsyncValidationLoop - many independent executions at once
//!
//! Each request runs as its own task through the shared `ValidationLoop`.
//! A semaphore bounds how many run at the same time; results come back in
//! submission order no matter which finishes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::batch::cancel::{CancelReason, CancelToken};
use crate::error::{Result, VloopError};
use crate::runner::{ExecutionRequest, ExecutionResult, ValidationLoop};

/// Configuration for batch execution
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Executions allowed to run at the same time
    pub concurrency_limit: usize,
    /// Hard ceiling for the whole batch
    pub batch_timeout: Option<Duration>,
    /// Cancel the rest of the batch when one execution hits a fatal
    /// generation error
    pub abort_on_fatal: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            batch_timeout: None,
            abort_on_fatal: true,
        }
    }
}

impl BatchConfig {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn with_abort_on_fatal(mut self, abort: bool) -> Self {
        self.abort_on_fatal = abort;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(VloopError::InvalidConfig("concurrency_limit must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Runs batches of executions concurrently over one `ValidationLoop`
pub struct AsyncValidationLoop {
    runner: Arc<ValidationLoop>,
    config: BatchConfig,
    permits: Arc<Semaphore>,
}

impl AsyncValidationLoop {
    pub fn new(runner: ValidationLoop, config: BatchConfig) -> Result<Self> {
        Self::from_shared(Arc::new(runner), config)
    }

    /// Build over a loop shared with other callers
    pub fn from_shared(runner: Arc<ValidationLoop>, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.concurrency_limit)),
            runner,
            config,
        })
    }

    pub fn runner(&self) -> &Arc<ValidationLoop> {
        &self.runner
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a single execution under the concurrency limit
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return Ok(ExecutionResult::interrupted(CancelReason::Cancelled, Vec::new(), 0));
        };
        self.runner.run(&request).await
    }

    /// Run every request; the output has the same length and order as the input
    pub async fn execute_batch(&self, requests: Vec<ExecutionRequest>) -> Vec<Result<ExecutionResult>> {
        self.run_batch(requests, None).await
    }

    /// Like `execute_batch`, also stopping when `cancel` fires.
    ///
    /// Finished executions keep their results; the others come back as
    /// `Cancelled` (or `TimedOut` for the batch deadline).
    pub async fn execute_batch_with_cancel(
        &self,
        requests: Vec<ExecutionRequest>,
        cancel: &CancelToken,
    ) -> Vec<Result<ExecutionResult>> {
        self.run_batch(requests, Some(cancel.clone())).await
    }

    async fn run_batch(&self, requests: Vec<ExecutionRequest>, cancel: Option<CancelToken>) -> Vec<Result<ExecutionResult>> {
        let total = requests.len();
        let started = Instant::now();
        info!(
            "starting batch of {} executions (concurrency {})",
            total, self.config.concurrency_limit
        );

        // Dropping the set aborts every execution still queued or running
        let batch_token = CancelToken::new();
        let mut tasks: JoinSet<(usize, Result<ExecutionResult>)> = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let runner = self.runner.clone();
            let permits = self.permits.clone();
            let token = batch_token.clone();
            let abort_on_fatal = self.config.abort_on_fatal;
            tasks.spawn(async move {
                let queued = Instant::now();
                let permit = tokio::select! {
                    biased;
                    reason = token.cancelled() => {
                        debug!("execution {} never started ({:?})", index, reason);
                        return (index, Ok(ExecutionResult::interrupted(reason, Vec::new(), elapsed_ms(queued))));
                    }
                    permit = permits.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    let result = ExecutionResult::interrupted(CancelReason::Cancelled, Vec::new(), elapsed_ms(queued));
                    return (index, Ok(result));
                };

                let result = runner.run_until_cancelled(&request, &token).await;
                if abort_on_fatal && result.as_ref().is_ok_and(ExecutionResult::is_fatal) {
                    warn!("execution {} hit a fatal error, cancelling the rest of the batch", index);
                    token.cancel();
                }
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<ExecutionResult>>> = (0..total).map(|_| None).collect();
        let watcher = watch_batch(cancel, batch_token.clone(), self.config.batch_timeout);
        tokio::pin!(watcher);
        let mut watching = true;
        loop {
            tokio::select! {
                _ = &mut watcher, if watching => watching = false,
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, result))) => slots[index] = Some(result),
                    Some(Err(e)) => warn!("execution task failed: {}", e),
                    None => break,
                },
            }
        }

        let results: Vec<Result<ExecutionResult>> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Ok(ExecutionResult::failed("execution task failed".to_string(), Vec::new(), 0))))
            .collect();

        let succeeded = results.iter().filter(|r| r.as_ref().is_ok_and(|r| r.success)).count();
        info!(
            "batch finished: {}/{} succeeded in {}ms",
            succeeded,
            total,
            elapsed_ms(started)
        );
        results
    }
}

/// Forward the caller's cancellation and the batch deadline to the batch token
async fn watch_batch(parent: Option<CancelToken>, batch: CancelToken, deadline: Option<Duration>) {
    let parent_cancelled = async {
        match &parent {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let expired = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        reason = parent_cancelled => batch.cancel_with(reason),
        _ = expired => {
            warn!("batch deadline reached, cancelling unfinished executions");
            batch.cancel_with(CancelReason::Timeout);
        }
        _ = batch.cancelled() => {}
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
