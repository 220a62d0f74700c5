//! Composite validator - combines several validators with AND / OR logic
//!
//! Branches are evaluated concurrently by default. All branch futures live in
//! one `FuturesUnordered` owned by the call, so returning early (OR success,
//! AND fail-fast) drops and cancels the branches still in flight.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::validation::traits::{ValidationContext, ValidationResult, Validator, ValidatorError};

/// How branch outcomes are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMode {
    /// Valid only if every branch is valid
    And,
    /// Valid if any branch is valid
    Or,
}

impl fmt::Display for CompositeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeMode::And => write!(f, "AND"),
            CompositeMode::Or => write!(f, "OR"),
        }
    }
}

/// A validator combining sub-validators with AND / OR semantics
pub struct CompositeValidator {
    mode: CompositeMode,
    validators: Vec<Arc<dyn Validator>>,
    concurrent: bool,
    fail_fast: bool,
    name: String,
}

impl CompositeValidator {
    /// Create an empty composite with the given mode
    pub fn new(mode: CompositeMode) -> Self {
        Self {
            mode,
            validators: Vec::new(),
            concurrent: true,
            fail_fast: false,
            name: format!("composite({})", mode),
        }
    }

    /// Every branch must pass
    pub fn all() -> Self {
        Self::new(CompositeMode::And)
    }

    /// Any branch passing is enough
    pub fn any() -> Self {
        Self::new(CompositeMode::Or)
    }

    /// Add a validator (builder pattern)
    pub fn with_validator(self, validator: impl Validator + 'static) -> Self {
        self.add_shared(Arc::new(validator))
    }

    /// Add an already shared validator
    pub fn add_shared(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set a custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Evaluate branches one after another, in insertion order
    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    /// AND mode: stop at the first failing branch instead of collecting all errors
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn mode(&self) -> CompositeMode {
        self.mode
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Names of all branches in insertion order
    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    fn branches<'a>(
        &'a self,
        content: &'a str,
        context: Option<&'a ValidationContext>,
    ) -> BoxStream<'a, (usize, ValidationResult)> {
        let indexed = self.validators.iter().enumerate();
        if self.concurrent {
            indexed
                .map(move |(index, validator)| async move {
                    (index, run_branch(validator.as_ref(), content, context).await)
                })
                .collect::<FuturesUnordered<_>>()
                .boxed()
        } else {
            stream::iter(indexed)
                .then(move |(index, validator)| async move {
                    (index, run_branch(validator.as_ref(), content, context).await)
                })
                .boxed()
        }
    }

    async fn validate_all(&self, content: &str, context: Option<&ValidationContext>) -> ValidationResult {
        let mut outcomes: Vec<Option<ValidationResult>> = vec![None; self.validators.len()];
        let mut branches = self.branches(content, context);

        while let Some((index, result)) = branches.next().await {
            let failed = !result.is_valid;
            outcomes[index] = Some(result);
            if failed && self.fail_fast {
                break;
            }
        }

        self.aggregate(outcomes)
    }

    async fn validate_any(&self, content: &str, context: Option<&ValidationContext>) -> ValidationResult {
        if self.validators.is_empty() {
            return ValidationResult::fail(format!("{} has no validators configured", self.name));
        }

        let mut outcomes: Vec<Option<ValidationResult>> = vec![None; self.validators.len()];
        let mut branches = self.branches(content, context);

        while let Some((index, result)) = branches.next().await {
            if result.is_valid {
                log::debug!(
                    "{}: branch '{}' passed, discarding remaining branches",
                    self.name,
                    self.validators[index].name()
                );
                return result.with_metadata("matched_validator", self.validators[index].name());
            }
            outcomes[index] = Some(result);
        }

        self.aggregate(outcomes)
    }

    /// Combine finished branches in insertion order, prefixing their messages
    fn aggregate(&self, outcomes: Vec<Option<ValidationResult>>) -> ValidationResult {
        let mut combined = ValidationResult::pass();
        let mut failed = Vec::new();
        let mut evaluated = 0;

        for (validator, outcome) in self.validators.iter().zip(outcomes) {
            let Some(result) = outcome else {
                continue;
            };
            evaluated += 1;
            let name = validator.name();
            if !result.is_valid {
                combined.is_valid = false;
                failed.push(name.to_string());
            }
            combined
                .errors
                .extend(result.errors.iter().map(|e| format!("[{}] {}", name, e)));
            combined
                .warnings
                .extend(result.warnings.iter().map(|w| format!("[{}] {}", name, w)));
        }

        if evaluated < self.validators.len() && self.mode == CompositeMode::And {
            combined.is_valid = false;
        }

        combined
            .with_metadata("operator", self.mode.to_string())
            .with_metadata("branches_evaluated", evaluated)
            .with_metadata("failed_validators", json!(failed))
    }
}

async fn run_branch(validator: &dyn Validator, content: &str, context: Option<&ValidationContext>) -> ValidationResult {
    match validator.validate(content, context).await {
        Ok(result) => result.normalized(),
        Err(e) => ValidationResult::fail(format!("validator error: {}", e)),
    }
}

#[async_trait]
impl Validator for CompositeValidator {
    async fn validate(
        &self,
        content: &str,
        context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        let result = match self.mode {
            CompositeMode::And => self.validate_all(content, context).await,
            CompositeMode::Or => self.validate_any(content, context).await,
        };
        Ok(result)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        let children: Vec<String> = self
            .validators
            .iter()
            .map(|v| format!("{}@{}", v.fingerprint(), v.version()))
            .collect();
        format!("composite:{}:fail_fast={}[{}]", self.mode, self.fail_fast, children.join(","))
    }

    fn instructions(&self) -> String {
        let joiner = match self.mode {
            CompositeMode::And => "ALL of the following must hold:",
            CompositeMode::Or => "AT LEAST ONE of the following must hold:",
        };
        let parts: Vec<String> = self.validators.iter().map(|v| format!("- {}", v.instructions())).collect();
        format!("{}\n{}", joiner, parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    struct MockValidator {
        name: String,
        should_pass: bool,
        delay: Duration,
    }

    impl MockValidator {
        fn passing(name: &str) -> Self {
            Self::new(name, true, Duration::ZERO)
        }

        fn failing(name: &str) -> Self {
            Self::new(name, false, Duration::ZERO)
        }

        fn new(name: &str, should_pass: bool, delay: Duration) -> Self {
            Self {
                name: name.to_string(),
                should_pass,
                delay,
            }
        }
    }

    #[async_trait]
    impl Validator for MockValidator {
        async fn validate(
            &self,
            _content: &str,
            _context: Option<&ValidationContext>,
        ) -> Result<ValidationResult, ValidatorError> {
            tokio::time::sleep(self.delay).await;
            if self.should_pass {
                Ok(ValidationResult::pass())
            } else {
                Ok(ValidationResult::fail(format!("{} rejected the output", self.name)))
            }
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn fingerprint(&self) -> String {
            format!("mock:{}:{}", self.name, self.should_pass)
        }
    }

    /// Records whether it ever ran to completion
    struct CompletionFlag {
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Validator for CompletionFlag {
        async fn validate(
            &self,
            _content: &str,
            _context: Option<&ValidationContext>,
        ) -> Result<ValidationResult, ValidatorError> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(ValidationResult::fail("slow branch"))
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn fingerprint(&self) -> String {
            format!("slow:{:?}", self.delay)
        }
    }

    struct Erroring;

    #[async_trait]
    impl Validator for Erroring {
        async fn validate(
            &self,
            _content: &str,
            _context: Option<&ValidationContext>,
        ) -> Result<ValidationResult, ValidatorError> {
            Err(ValidatorError::Internal("schema missing".to_string()))
        }

        fn name(&self) -> &str {
            "erroring"
        }

        fn fingerprint(&self) -> String {
            "erroring".to_string()
        }
    }

    #[test]
    fn test_composite_builder() {
        let composite = CompositeValidator::all()
            .with_name("full validation")
            .with_validator(MockValidator::passing("format"))
            .with_validator(MockValidator::passing("lint"));

        assert_eq!(composite.len(), 2);
        assert_eq!(composite.name(), "full validation");
        assert_eq!(composite.validator_names(), vec!["format", "lint"]);
        assert!(composite.is_concurrent());
        assert!(!composite.sequential().is_concurrent());
    }

    #[tokio::test]
    async fn test_and_all_pass() {
        let composite = CompositeValidator::all()
            .with_validator(MockValidator::passing("v1"))
            .with_validator(MockValidator::passing("v2"));

        let result = composite.validate("test", None).await.unwrap();
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_and_collects_all_branch_errors() {
        let composite = CompositeValidator::all()
            .with_validator(MockValidator::failing("first"))
            .with_validator(MockValidator::passing("second"))
            .with_validator(MockValidator::new("third", false, Duration::from_millis(50)));

        let result = composite.validate("test", None).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![
                "[first] first rejected the output".to_string(),
                "[third] third rejected the output".to_string(),
            ]
        );
        assert_eq!(result.metadata["failed_validators"], json!(["first", "third"]));
    }

    #[tokio::test]
    async fn test_and_fail_fast_stops_early() {
        let composite = CompositeValidator::all()
            .fail_fast()
            .with_validator(MockValidator::failing("fast"))
            .with_validator(MockValidator::new("slow", false, Duration::from_millis(500)));

        let start = Instant::now();
        let result = composite.validate("test", None).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["[fast] fast rejected the output".to_string()]);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_and_runs_concurrently() {
        let composite = CompositeValidator::all()
            .with_validator(MockValidator::new("v1", true, Duration::from_millis(100)))
            .with_validator(MockValidator::new("v2", true, Duration::from_millis(100)));

        let start = Instant::now();
        assert!(composite.validate("test", None).await.unwrap().is_valid);
        assert!(start.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_sequential_runs_in_order() {
        let composite = CompositeValidator::all()
            .sequential()
            .with_validator(MockValidator::new("v1", true, Duration::from_millis(60)))
            .with_validator(MockValidator::new("v2", true, Duration::from_millis(60)));

        let start = Instant::now();
        assert!(composite.validate("test", None).await.unwrap().is_valid);
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_or_one_passes() {
        let composite = CompositeValidator::any()
            .with_validator(MockValidator::failing("v1"))
            .with_validator(MockValidator::passing("v2"));

        let result = composite.validate("test", None).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.metadata["matched_validator"], "v2");
    }

    #[tokio::test]
    async fn test_or_short_circuits_and_cancels_slow_branch() {
        let finished = Arc::new(AtomicBool::new(false));
        let composite = CompositeValidator::any()
            .with_validator(MockValidator::failing("false"))
            .with_validator(MockValidator::new("true", true, Duration::from_millis(20)))
            .with_validator(CompletionFlag {
                delay: Duration::from_millis(400),
                finished: finished.clone(),
            });

        let start = Instant::now();
        let result = composite.validate("test", None).await.unwrap();
        assert!(result.is_valid);
        assert!(start.elapsed() < Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_or_none_pass_aggregates_errors() {
        let composite = CompositeValidator::any()
            .with_validator(MockValidator::failing("a"))
            .with_validator(MockValidator::failing("b"));

        let result = composite.validate("test", None).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.error_count(), 2);
        assert!(result.errors[0].starts_with("[a]"));
        assert!(result.errors[1].starts_with("[b]"));
    }

    #[tokio::test]
    async fn test_empty_composites() {
        assert!(CompositeValidator::all().validate("x", None).await.unwrap().is_valid);
        assert!(!CompositeValidator::any().validate("x", None).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_branch_error_becomes_branch_failure() {
        let composite = CompositeValidator::all()
            .with_validator(Erroring)
            .with_validator(MockValidator::passing("ok"));

        let result = composite.validate("x", None).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["[erroring] validator error: schema missing".to_string()]);
    }

    #[test]
    fn test_fingerprint_depends_on_mode_and_children() {
        let and = CompositeValidator::all().with_validator(MockValidator::passing("a"));
        let or = CompositeValidator::any().with_validator(MockValidator::passing("a"));
        let other = CompositeValidator::all().with_validator(MockValidator::passing("b"));

        assert_ne!(and.fingerprint(), or.fingerprint());
        assert_ne!(and.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_instructions_list_branches() {
        let composite = CompositeValidator::any()
            .with_validator(MockValidator::passing("json"))
            .with_validator(MockValidator::passing("yaml"));
        let text = composite.instructions();
        assert!(text.contains("AT LEAST ONE"));
        assert!(text.contains("json"));
        assert!(text.contains("yaml"));
    }
}
