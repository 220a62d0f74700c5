//! Concurrent batch execution
//!
//! This module provides:
//! - AsyncValidationLoop, bounded concurrent execution in submission order
//! - BatchConfig
//! - CancelToken / CancelReason for batch-scoped cancellation and deadlines

mod cancel;
mod executor;

pub use cancel::{CancelReason, CancelToken};
pub use executor::{AsyncValidationLoop, BatchConfig};
