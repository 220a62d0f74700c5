//! Prompt construction
//!
//! Template rendering with Handlebars plus the fixed system and retry
//! prompts wrapped around every execution.

mod render;

pub use render::{InputData, PromptRenderer, build_retry_prompt, build_system_prompt, parse_input_pairs};
