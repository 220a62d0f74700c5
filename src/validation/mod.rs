// Validation: the capability every content checker implements, the
// combinators and adapters built on it, and a small built-in catalog

pub mod composite;
pub mod feedback;
pub mod format;
pub mod function;
pub mod json;
pub mod registry;
pub mod traits;

pub use composite::{CompositeMode, CompositeValidator};
pub use feedback::FeedbackFormatter;
pub use format::{FormatConfig, FormatValidator};
pub use function::{BlockingValidator, FunctionValidator};
pub use json::JsonValidator;
pub use registry::ValidatorRegistry;
pub use traits::{MALFORMED_RESULT_ERROR, ValidationContext, ValidationResult, Validator, ValidatorError};
