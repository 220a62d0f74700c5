//! Generation client layer
//!
//! This module provides:
//! - Message and conversation types
//! - LlmClient trait with transient/fatal error classification
//! - AnthropicClient implementation
//! - MockLlmClient for tests and offline runs

pub mod anthropic;
pub mod client;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{ErrorClass, LlmClient, LlmError, MockLlmClient, MockReply};
pub use types::{CompletionRequest, CompletionResponse, Conversation, Message, Role, StopReason, Usage};
