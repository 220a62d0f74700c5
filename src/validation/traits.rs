//! Core validation interfaces

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra inputs a validator may consult besides the content itself
pub type ValidationContext = BTreeMap<String, Value>;

/// Error attached to an invalid result that carried no errors of its own
pub const MALFORMED_RESULT_ERROR: &str =
    "validator reported an invalid result without any error details";

/// Result of a validation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether validation passed
    pub is_valid: bool,
    /// Ordered list of specific errors found
    pub errors: Vec<String>,
    /// Ordered list of non-fatal observations
    pub warnings: Vec<String>,
    /// Free-form validator metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Optional quality score in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ValidationResult {
    /// Create a passing result
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
            score: None,
        }
    }

    /// Create a failing result with a single error
    pub fn fail(error: impl Into<String>) -> Self {
        Self::fail_with_errors(vec![error.into()])
    }

    /// Create a failing result with multiple errors
    pub fn fail_with_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            ..Self::pass()
        }
    }

    /// Attach a warning (builder pattern)
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Attach a metadata entry (builder pattern)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a score, clamped into [0, 1]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }

    /// Add an error to this result
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.metadata.extend(other.metadata);
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Invalid with nothing to tell the model about
    pub fn is_malformed(&self) -> bool {
        !self.is_valid && self.errors.is_empty()
    }

    /// Replace a malformed outcome with one carrying a diagnostic error
    pub fn normalized(mut self) -> Self {
        if self.is_malformed() {
            self.errors.push(MALFORMED_RESULT_ERROR.to_string());
        }
        self
    }

    /// Bullet list of errors (and optionally warnings) for a retry prompt
    pub fn feedback_text(&self, include_warnings: bool) -> String {
        let mut lines: Vec<String> = self.errors.iter().map(|e| format!("- ERROR: {}", e)).collect();
        if include_warnings {
            lines.extend(self.warnings.iter().map(|w| format!("- WARNING: {}", w)));
        }
        lines.join("\n")
    }

    /// Short one-line summary used as an execution's final error
    pub fn summary(&self) -> String {
        if self.is_valid {
            "valid".to_string()
        } else if self.errors.is_empty() {
            MALFORMED_RESULT_ERROR.to_string()
        } else {
            self.errors.join("; ")
        }
    }

    /// Serialized size of the result in bytes
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(0)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::pass()
    }
}

/// Failure raised by a validator itself, as opposed to a failed validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    #[error("{0}")]
    Internal(String),

    #[error("validator panicked: {0}")]
    Panicked(String),

    #[error("worker pool closed")]
    PoolClosed,
}

/// Capability interface every content checker implements.
///
/// Implementations must be pure functions of `(content, context)`; the
/// validation cache relies on it.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate candidate content
    async fn validate(
        &self,
        content: &str,
        context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError>;

    /// Short human-readable name
    fn name(&self) -> &str;

    /// Stable fingerprint of the validator's configuration.
    ///
    /// Two validators that may judge the same content differently must
    /// return different fingerprints. The name alone is not enough: it is
    /// a display label and may be shared by unrelated checks.
    fn fingerprint(&self) -> String;

    /// Logic version; bump when behavior changes without a config change
    fn version(&self) -> u32 {
        1
    }

    /// Instructions given to the model so it knows what will be checked
    fn instructions(&self) -> String {
        format!("Your response will be checked by the {} validator.", self.name())
    }
}
