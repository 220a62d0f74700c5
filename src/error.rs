//! Error types for vloop
//!
//! Centralized error handling using thiserror. Only failures that abort an
//! execution before it starts (or that the caller must handle) live here;
//! attempt-level failures are recorded in the attempt history instead.

use thiserror::Error;

use crate::llm::LlmError;
use crate::validation::ValidatorError;

/// All error types that can surface from the vloop library
#[derive(Debug, Error)]
pub enum VloopError {
    /// The prompt template could not be rendered with the given input data
    #[error("Template render error: {0}")]
    TemplateRender(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A validator name was not found in the registry
    #[error("Validator '{name}' not found. Available: {available:?}")]
    ValidatorNotFound { name: String, available: Vec<String> },

    /// The generation client failed outside of an attempt
    #[error("Generation error: {0}")]
    Generation(#[from] LlmError),

    /// A validator call failed outside of an attempt
    #[error("Validator error: {0}")]
    Validator(#[from] ValidatorError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for vloop operations
pub type Result<T> = std::result::Result<T, VloopError>;
