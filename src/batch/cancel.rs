//! Batch-scoped cancellation
//!
//! A watch channel rather than `tokio_util`'s token, because waiters need to
//! learn why they were stopped (caller cancel vs batch deadline).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Why work was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    /// The caller asked to stop
    Cancelled,
    /// The batch deadline passed
    Timeout,
}

/// Cloneable cancellation signal shared by every execution in a batch.
///
/// The first reason recorded wins; later calls are ignored.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<Option<CancelReason>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state: Arc::new(state) }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Cancelled);
    }

    /// Request cancellation with an explicit reason
    pub fn cancel_with(&self, reason: CancelReason) {
        let changed = self.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if changed {
            log::debug!("cancellation requested: {:?}", reason);
        }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.state.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) -> CancelReason {
        let mut receiver = self.state.subscribe();
        loop {
            let current = *receiver.borrow_and_update();
            if let Some(reason) = current {
                return reason;
            }
            if receiver.changed().await.is_err() {
                // Unreachable while `self` holds the sender
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancelToken::new();
        token.cancel_with(CancelReason::Timeout);
        token.cancel();
        assert_eq!(token.reason(), Some(CancelReason::Timeout));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(reason, CancelReason::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel_with(CancelReason::Timeout);
        assert_eq!(token.cancelled().await, CancelReason::Timeout);
    }
}
