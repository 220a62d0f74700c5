//! Execution state machine

use std::fmt;

use serde::{Deserialize, Serialize};

/// States of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Init,
    Generating,
    Validating,
    Retrying,
    Success,
    Failed,
    Cancelled,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Init, Generating) => true,
            (Generating, Validating | Retrying | Failed) => true,
            (Validating, Success | Retrying | Failed) => true,
            (Retrying, Generating | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Init => "INIT",
            LoopState::Generating => "GENERATING",
            LoopState::Validating => "VALIDATING",
            LoopState::Retrying => "RETRYING",
            LoopState::Success => "SUCCESS",
            LoopState::Failed => "FAILED",
            LoopState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Tracks the current state of one execution and logs transitions
#[derive(Debug)]
pub(crate) struct StateTracker<'a> {
    label: &'a str,
    state: LoopState,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(label: &'a str) -> Self {
        Self {
            label,
            state: LoopState::Init,
        }
    }

    pub(crate) fn state(&self) -> LoopState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        log::trace!("{}: {} -> {}", self.label, self.state, next);
        self.state = next;
    }
}
