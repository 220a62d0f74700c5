//! Validation loop - generate, validate, feed errors back, retry.
//!
//! One execution is strictly sequential: attempt N's prompt depends on
//! attempt N-1's feedback. The conversation is an immutable value; every
//! retry derives a new one, so concurrent executions share nothing but the
//! validation cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::batch::CancelToken;
use crate::cache::{CachedValidator, ValidationCache};
use crate::error::{Result, VloopError};
use crate::llm::{Conversation, ErrorClass, LlmClient, LlmError, Message};
use crate::prompt::{InputData, PromptRenderer, build_retry_prompt, build_system_prompt};
use crate::runner::extract::extract_candidate;
use crate::runner::result::{Attempt, AttemptOutcome, ExecutionResult};
use crate::runner::state::{LoopState, StateTracker};
use crate::validation::{FeedbackFormatter, ValidationContext, ValidationResult, Validator};

/// Configuration for the ValidationLoop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Retries after the first attempt; 0 means exactly one attempt
    pub max_retries: u32,
    /// Bound on generation plus validation of a single attempt
    pub per_attempt_timeout: Option<Duration>,
    /// List warnings in retry feedback as well as errors
    pub include_warnings: bool,
    /// Validate the first fenced code block instead of the whole reply
    pub extract_code_blocks: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            per_attempt_timeout: None,
            include_warnings: false,
            extract_code_blocks: false,
        }
    }
}

impl LoopConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    pub fn with_warnings(mut self, include: bool) -> Self {
        self.include_warnings = include;
        self
    }

    pub fn with_code_block_extraction(mut self, extract: bool) -> Self {
        self.extract_code_blocks = extract;
        self
    }
}

/// Everything one execution needs
#[derive(Clone)]
pub struct ExecutionRequest {
    pub template: String,
    pub validator: Arc<dyn Validator>,
    pub input: InputData,
    /// Extra inputs passed to the validator
    pub context: Option<ValidationContext>,
    /// Overrides `LoopConfig::max_retries`
    pub max_retries: Option<u32>,
    /// Overrides `LoopConfig::per_attempt_timeout`
    pub per_attempt_timeout: Option<Duration>,
    /// Name used in logs
    pub label: Option<String>,
}

impl ExecutionRequest {
    pub fn new(template: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        Self {
            template: template.into(),
            validator,
            input: InputData::new(),
            context: None,
            max_retries: None,
            per_attempt_timeout: None,
            label: None,
        }
    }

    pub fn with_input(mut self, input: InputData) -> Self {
        self.input = input;
        self
    }

    /// Set one template variable
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(name.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.validator.name())
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("label", &self.label)
            .field("validator", &self.validator.name())
            .field("input", &self.input)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// What one attempt produced before it is recorded
enum Step {
    Validated {
        raw: String,
        candidate: String,
        result: ValidationResult,
    },
    GenerationFailed(LlmError),
    TimedOut(Duration),
}

/// Sequential validate-and-retry state machine.
pub struct ValidationLoop {
    client: Arc<dyn LlmClient>,
    cache: Option<Arc<ValidationCache>>,
    renderer: PromptRenderer,
    feedback: FeedbackFormatter,
    config: LoopConfig,
}

impl ValidationLoop {
    /// Create a loop without a cache, using default configuration
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self::with_config(client, LoopConfig::default())
    }

    pub fn with_config(client: Arc<dyn LlmClient>, config: LoopConfig) -> Self {
        Self {
            client,
            cache: None,
            renderer: PromptRenderer::new(),
            feedback: FeedbackFormatter::new().with_warnings(config.include_warnings),
            config,
        }
    }

    /// Route every validator call through `cache`
    pub fn with_cache(mut self, cache: Arc<ValidationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<ValidationCache>> {
        self.cache.as_ref()
    }

    /// Render `template` with `input` and run it against `validator`
    pub async fn execute(
        &self,
        template: &str,
        validator: Arc<dyn Validator>,
        input: &InputData,
    ) -> Result<ExecutionResult> {
        let request = ExecutionRequest::new(template, validator).with_input(input.clone());
        self.run(&request).await
    }

    /// Run one execution to completion
    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        self.run_inner(request, None).await
    }

    /// Run one execution, stopping early if `cancel` fires.
    ///
    /// An execution that has not produced an outcome when the token fires
    /// is returned with status `Cancelled` or `TimedOut` and the attempts
    /// recorded so far.
    pub async fn run_until_cancelled(&self, request: &ExecutionRequest, cancel: &CancelToken) -> Result<ExecutionResult> {
        self.run_inner(request, Some(cancel)).await
    }

    async fn run_inner(&self, request: &ExecutionRequest, cancel: Option<&CancelToken>) -> Result<ExecutionResult> {
        let started = Instant::now();
        let label = request.label();

        // Fails before any generation call
        let initial_prompt = self.renderer.render(&request.template, &request.input)?;

        let validator: Arc<dyn Validator> = match &self.cache {
            Some(cache) => Arc::new(CachedValidator::new(request.validator.clone(), cache.clone())),
            None => request.validator.clone(),
        };
        let system = build_system_prompt(&request.validator.instructions());
        let max_retries = request.max_retries.unwrap_or(self.config.max_retries);
        let timeout = request.per_attempt_timeout.or(self.config.per_attempt_timeout);
        let max_attempts = max_retries.saturating_add(1);

        info!(
            "{}: starting execution with validator '{}' ({} attempts max)",
            label,
            request.validator.name(),
            max_attempts
        );

        let mut tracker = StateTracker::new(label);
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut conversation = Conversation::new();
        let mut prompt = initial_prompt;

        for ordinal in 1..=max_attempts {
            if let Some(reason) = cancel.and_then(CancelToken::reason) {
                info!("{}: stopped before attempt {} ({:?})", label, ordinal, reason);
                tracker.advance(LoopState::Cancelled);
                return Ok(ExecutionResult::interrupted(reason, attempts, elapsed_ms(started)));
            }

            if tracker.state() != LoopState::Init {
                tracker.advance(LoopState::Retrying);
            }
            tracker.advance(LoopState::Generating);

            let history = conversation.appended(Message::user(prompt.clone()));
            let started_at = Utc::now();
            let attempt_clock = Instant::now();

            let work = self.attempt(&system, &history, validator.as_ref(), request.context.as_ref(), timeout);
            let step = match cancel {
                Some(token) => tokio::select! {
                    step = work => step,
                    reason = token.cancelled() => {
                        info!("{}: attempt {} interrupted ({:?})", label, ordinal, reason);
                        tracker.advance(LoopState::Cancelled);
                        return Ok(ExecutionResult::interrupted(reason, attempts, elapsed_ms(started)));
                    }
                },
                None => work.await,
            };

            let duration_ms = elapsed_ms(attempt_clock);
            let record = |validation, outcome, raw_output, candidate| Attempt {
                ordinal,
                prompt: prompt.clone(),
                raw_output,
                candidate,
                validation,
                outcome,
                started_at,
                duration_ms,
            };

            match step {
                Step::Validated { raw, candidate, result } => {
                    tracker.advance(LoopState::Validating);
                    let valid = result.is_valid;
                    let feedback = self.feedback.format(&result);
                    let error_count = result.error_count();
                    attempts.push(record(
                        result,
                        AttemptOutcome::Validated,
                        Some(raw.clone()),
                        Some(candidate.clone()),
                    ));

                    if valid {
                        tracker.advance(LoopState::Success);
                        info!("{}: validation passed after {} attempt(s)", label, ordinal);
                        return Ok(ExecutionResult::succeeded(candidate, attempts, elapsed_ms(started)));
                    }

                    warn!(
                        "{}: attempt {}/{} failed validation with {} error(s)",
                        label, ordinal, max_attempts, error_count
                    );
                    conversation = history.appended(Message::assistant(raw));
                    prompt = build_retry_prompt(&feedback);
                }
                Step::GenerationFailed(err) => {
                    let outcome = match err.class() {
                        ErrorClass::Transient => AttemptOutcome::TransientError,
                        ErrorClass::Fatal => AttemptOutcome::FatalError,
                    };
                    let message = format!("generation error: {}", err);
                    attempts.push(record(ValidationResult::fail(message.clone()), outcome, None, None));

                    if outcome == AttemptOutcome::FatalError {
                        tracker.advance(LoopState::Failed);
                        error!("{}: aborting on fatal generation error: {}", label, err);
                        return Ok(ExecutionResult::failed(message, attempts, elapsed_ms(started)));
                    }
                    warn!("{}: attempt {}/{} hit a transient error: {}", label, ordinal, max_attempts, err);
                }
                Step::TimedOut(limit) => {
                    let message = format!("attempt timed out after {}ms", limit.as_millis());
                    attempts.push(record(ValidationResult::fail(message), AttemptOutcome::TimedOut, None, None));
                    warn!("{}: attempt {}/{} timed out", label, ordinal, max_attempts);
                }
            }
        }

        tracker.advance(LoopState::Failed);
        let final_error = attempts
            .last()
            .map(|a| a.validation.summary())
            .unwrap_or_else(|| "no attempts were made".to_string());
        error!("{}: validation failed after {} attempt(s)", label, attempts.len());
        Ok(ExecutionResult::failed(final_error, attempts, elapsed_ms(started)))
    }

    /// Generate, extract and validate once, bounded by `timeout`
    async fn attempt(
        &self,
        system: &str,
        history: &Conversation,
        validator: &dyn Validator,
        context: Option<&ValidationContext>,
        timeout: Option<Duration>,
    ) -> Step {
        let work = async {
            let raw = match self.client.send(system, history).await {
                Ok(raw) => raw,
                Err(e) => return Step::GenerationFailed(e),
            };
            let candidate = extract_candidate(&raw, self.config.extract_code_blocks);
            debug!("validating {} bytes with '{}'", candidate.len(), validator.name());

            let result = match validator.validate(&candidate, context).await {
                Ok(result) => result.normalized(),
                Err(e) => ValidationResult::fail(format!("validator error: {}", e)),
            };
            Step::Validated { raw, candidate, result }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Step::TimedOut(limit)),
            None => work.await,
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Input data from a JSON object
pub fn input_from_json(value: Value) -> Result<InputData> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect::<BTreeMap<_, _>>()),
        other => Err(VloopError::InvalidConfig(format!(
            "input data must be a JSON object, got {}",
            other
        ))),
    }
}
