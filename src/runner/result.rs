//! Attempt history and execution results

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::CancelReason;
use crate::error::Result;
use crate::validation::ValidationResult;

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// A candidate passed validation
    Succeeded,
    /// Retry budget exhausted, or a fatal generation error
    Failed,
    /// Stopped by a cancellation request before finishing
    Cancelled,
    /// Stopped by the batch deadline before finishing
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Stopped from outside rather than by its own outcome
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        };
        write!(f, "{}", name)
    }
}

impl From<CancelReason> for ExecutionStatus {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => ExecutionStatus::Cancelled,
            CancelReason::Timeout => ExecutionStatus::TimedOut,
        }
    }
}

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Output was generated and validated
    Validated,
    /// Retryable generation failure
    TransientError,
    /// Non-retryable generation failure; ends the execution
    FatalError,
    /// Exceeded the per-attempt timeout
    TimedOut,
}

/// One generation-plus-validation round. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based, strictly increasing within an execution
    pub ordinal: u32,
    /// User message sent for this attempt
    pub prompt: String,
    pub raw_output: Option<String>,
    /// Content handed to the validator
    pub candidate: Option<String>,
    /// Validator verdict; generation failures and timeouts are recorded as
    /// failed results describing what went wrong
    pub validation: ValidationResult,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Attempt {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }
}

/// Final outcome of one execution, with its full attempt history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub status: ExecutionStatus,
    /// Validated candidate on success, otherwise the last candidate produced
    pub output: Option<String>,
    pub attempts: Vec<Attempt>,
    pub total_attempts: u32,
    pub total_duration_ms: u64,
    pub final_error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn succeeded(output: String, attempts: Vec<Attempt>, total_duration_ms: u64) -> Self {
        Self {
            success: true,
            status: ExecutionStatus::Succeeded,
            output: Some(output),
            total_attempts: attempts.len() as u32,
            attempts,
            total_duration_ms,
            final_error: None,
        }
    }

    pub(crate) fn failed(final_error: String, attempts: Vec<Attempt>, total_duration_ms: u64) -> Self {
        Self::finished(ExecutionStatus::Failed, Some(final_error), attempts, total_duration_ms)
    }

    pub(crate) fn interrupted(reason: CancelReason, attempts: Vec<Attempt>, total_duration_ms: u64) -> Self {
        let message = match reason {
            CancelReason::Cancelled => "execution cancelled",
            CancelReason::Timeout => "batch deadline reached",
        };
        Self::finished(reason.into(), Some(message.to_string()), attempts, total_duration_ms)
    }

    fn finished(
        status: ExecutionStatus,
        final_error: Option<String>,
        attempts: Vec<Attempt>,
        total_duration_ms: u64,
    ) -> Self {
        let output = attempts.iter().rev().find_map(|a| a.candidate.clone());
        Self {
            success: false,
            status,
            output,
            total_attempts: attempts.len() as u32,
            attempts,
            total_duration_ms,
            final_error,
        }
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Verdict of the last attempt
    pub fn last_validation(&self) -> Option<&ValidationResult> {
        self.last_attempt().map(|a| &a.validation)
    }

    /// Whether the execution ended on a non-retryable generation error
    pub fn is_fatal(&self) -> bool {
        self.last_attempt()
            .is_some_and(|a| a.outcome == AttemptOutcome::FatalError)
    }

    /// Write a JSON execution log for debugging and analysis
    pub fn save_log(&self, path: &Path) -> Result<()> {
        let log = ExecutionLog {
            timestamp: Utc::now(),
            success: self.success,
            status: self.status,
            attempts: self.total_attempts,
            total_duration_ms: self.total_duration_ms,
            output: self.output.as_deref(),
            final_error: self.final_error.as_deref(),
            final_validation: self.last_validation(),
            attempt_history: &self.attempts,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&log)?)?;
        log::debug!("saved execution log to {}", path.display());
        Ok(())
    }
}

#[derive(Serialize)]
struct ExecutionLog<'a> {
    timestamp: DateTime<Utc>,
    success: bool,
    status: ExecutionStatus,
    attempts: u32,
    total_duration_ms: u64,
    output: Option<&'a str>,
    final_error: Option<&'a str>,
    final_validation: Option<&'a ValidationResult>,
    attempt_history: &'a [Attempt],
}
