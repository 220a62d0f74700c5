//! Vloop - validate-and-retry loops around LLM generation
//!
//! A `ValidationLoop` renders a prompt, asks a model for a candidate,
//! validates it, and feeds the errors back until a candidate passes or the
//! retry budget runs out. `AsyncValidationLoop` runs many of these at once
//! under a concurrency limit, and `ValidationCache` memoizes verdicts across
//! all of them.

pub mod batch;
pub mod cache;
pub mod error;
pub mod llm;
pub mod pool;
pub mod prompt;
pub mod runner;
pub mod validation;

pub use batch::{AsyncValidationLoop, BatchConfig, CancelReason, CancelToken};
pub use cache::{CacheConfig, ValidationCache};
pub use error::{Result, VloopError};
pub use runner::{ExecutionRequest, ExecutionResult, ExecutionStatus, ValidationLoop};
pub use validation::{CompositeValidator, ValidationResult, Validator};
