//! Sequential validate-and-retry execution.
//!
//! This module provides:
//! - ValidationLoop, the per-execution state machine
//! - ExecutionRequest and LoopConfig
//! - Attempt and ExecutionResult records, with JSON execution logs

mod extract;
mod loop_runner;
mod result;
mod state;

pub use extract::extract_candidate;
pub use loop_runner::{ExecutionRequest, LoopConfig, ValidationLoop, input_from_json};
pub use result::{Attempt, AttemptOutcome, ExecutionResult, ExecutionStatus};
pub use state::LoopState;
