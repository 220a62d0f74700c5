//! Adapters that turn plain functions into validators

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::pool::WorkerPool;
use crate::validation::traits::{ValidationContext, ValidationResult, Validator, ValidatorError};

type CheckFn = dyn Fn(&str, Option<&ValidationContext>) -> Result<ValidationResult, ValidatorError> + Send + Sync;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Fingerprint unique to one adapter instance.
///
/// Closures cannot be compared, so two adapters only share cache entries
/// when the caller opts in with `with_fingerprint`.
fn instance_fingerprint(kind: &str, name: &str) -> String {
    let id = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}#{}", kind, name, id)
}

/// Validator backed by a cheap synchronous function, run inline
pub struct FunctionValidator {
    name: String,
    fingerprint: String,
    check: Box<CheckFn>,
}

impl FunctionValidator {
    /// Wrap a function returning a full `ValidationResult`
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> ValidationResult + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            fingerprint: instance_fingerprint("function", &name),
            name,
            check: Box::new(move |content: &str, _: Option<&ValidationContext>| Ok(check(content))),
        }
    }

    /// Wrap a predicate; `false` fails with `error`
    pub fn predicate<F>(name: impl Into<String>, error: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let error = error.into();
        let name = name.into();
        Self {
            fingerprint: instance_fingerprint("predicate", &name),
            name,
            check: Box::new(move |content: &str, _: Option<&ValidationContext>| {
                if predicate(content) {
                    Ok(ValidationResult::pass())
                } else {
                    Ok(ValidationResult::fail(error.clone()))
                }
            }),
        }
    }

    /// Wrap a fallible function that also sees the validation context
    pub fn with_context<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str, Option<&ValidationContext>) -> Result<ValidationResult, ValidatorError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        Self {
            fingerprint: instance_fingerprint("function", &name),
            name,
            check: Box::new(check),
        }
    }

    /// Share cache entries with every adapter using the same fingerprint.
    ///
    /// Only do this for adapters wrapping the same logic.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }
}

#[async_trait]
impl Validator for FunctionValidator {
    async fn validate(
        &self,
        content: &str,
        context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        (self.check)(content, context)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}

/// Validator backed by a heavy or blocking function.
///
/// Each call is dispatched to the [`WorkerPool`]; the calling task suspends
/// until the job finishes, so sibling executions keep being scheduled.
pub struct BlockingValidator {
    name: String,
    fingerprint: String,
    check: Arc<CheckFn>,
    pool: WorkerPool,
}

impl BlockingValidator {
    pub fn new<F>(name: impl Into<String>, pool: WorkerPool, check: F) -> Self
    where
        F: Fn(&str, Option<&ValidationContext>) -> Result<ValidationResult, ValidatorError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        Self {
            fingerprint: instance_fingerprint("blocking", &name),
            name,
            check: Arc::new(check),
            pool,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }
}

#[async_trait]
impl Validator for BlockingValidator {
    async fn validate(
        &self,
        content: &str,
        context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        let check = self.check.clone();
        let content = content.to_string();
        let context = context.cloned();
        self.pool
            .run(move || check(&content, context.as_ref()))
            .await?
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}
