//! Generation client trait, error classification and a scripted mock client

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, Conversation};

/// Stateless generation client - each call carries the full conversation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model identifier used for requests that don't override it
    fn model(&self) -> &str;

    /// Send a system context plus conversation history and return the raw text
    async fn send(&self, system: &str, history: &Conversation) -> Result<String, LlmError> {
        let response = self
            .complete(CompletionRequest::from_conversation(system, history))
            .await?;
        Ok(response.content)
    }
}

/// How an execution should react to a generation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recorded as a failed attempt and retried
    Transient,
    /// Aborts the execution regardless of remaining budget
    Fatal,
}

/// Errors that can occur during generation
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500 || *status == 408,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => true,
            LlmError::JsonError(_) => false,
            LlmError::MissingApiKey { .. } => false,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

/// One scripted reply for [`MockLlmClient`]
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply immediately with text
    Text(String),
    /// Sleep, then reply with text
    Delayed(Duration, String),
    /// Fail with a retryable error (HTTP 503)
    Transient(String),
    /// Fail with a fatal error (HTTP 401)
    Fatal(String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        MockReply::Text(content.into())
    }

    pub fn delayed(delay: Duration, content: impl Into<String>) -> Self {
        MockReply::Delayed(delay, content.into())
    }
}

/// Scripted client for tests and offline demos.
///
/// Replies are consumed in order; once the script runs out the fallback
/// text (if any) is returned for every further call.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    /// Create a mock that answers with each text in turn
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::from_replies(responses.into_iter().map(|r| MockReply::Text(r.into())).collect())
    }

    /// Create a mock from an explicit reply script
    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always answers with the same text
    pub fn always(response: impl Into<String>) -> Self {
        Self::from_replies(Vec::new()).with_fallback(response)
    }

    /// Reply used once the script is exhausted
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Number of completion calls received so far
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// All requests received so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    fn next_reply(&self) -> Option<MockReply> {
        lock(&self.replies)
            .pop_front()
            .or_else(|| self.fallback.clone().map(MockReply::Text))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request);

        match self.next_reply() {
            Some(MockReply::Text(text)) => Ok(CompletionResponse::text(text)),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResponse::text(text))
            }
            Some(MockReply::Transient(message)) => Err(LlmError::ApiError { status: 503, message }),
            Some(MockReply::Fatal(message)) => Err(LlmError::ApiError { status: 401, message }),
            None => Err(LlmError::InvalidResponse("mock script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );

        assert!(
            LlmError::ApiError {
                status: 500,
                message: "Internal error".to_string()
            }
            .is_retryable()
        );

        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );

        assert!(
            !LlmError::MissingApiKey {
                env_var: "ANTHROPIC_API_KEY".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_llm_error_class() {
        let unauthorized = LlmError::ApiError {
            status: 401,
            message: "invalid x-api-key".to_string(),
        };
        assert_eq!(unauthorized.class(), ErrorClass::Fatal);
        assert_eq!(LlmError::Timeout(Duration::from_secs(1)).class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_mock_replies_in_order() {
        let client = MockLlmClient::new(vec!["one", "two"]);
        let history = Conversation::new().appended(Message::user("hi"));

        assert_eq!(client.send("sys", &history).await.unwrap(), "one");
        assert_eq!(client.send("sys", &history).await.unwrap(), "two");
        assert!(client.send("sys", &history).await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_fallback() {
        let client = MockLlmClient::always("same");
        let history = Conversation::new().appended(Message::user("hi"));

        for _ in 0..3 {
            assert_eq!(client.send("sys", &history).await.unwrap(), "same");
        }
        assert_eq!(client.model(), "mock-model");
    }

    #[tokio::test]
    async fn test_mock_scripted_errors() {
        let client = MockLlmClient::from_replies(vec![
            MockReply::Transient("overloaded".to_string()),
            MockReply::Fatal("unauthorized".to_string()),
        ]);
        let history = Conversation::new().appended(Message::user("hi"));

        let first = client.send("sys", &history).await.unwrap_err();
        assert_eq!(first.class(), ErrorClass::Transient);

        let second = client.send("sys", &history).await.unwrap_err();
        assert_eq!(second.class(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let client = MockLlmClient::always("ok");
        let history = Conversation::new().appended(Message::user("render me"));
        client.send("system context", &history).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, "system context");
        assert_eq!(requests[0].messages[0].content, "render me");
    }
}
