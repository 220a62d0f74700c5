//! Feedback for validation failures.
//!
//! When validation fails, the model needs actionable feedback it can use to
//! fix the output on the next attempt. This module turns a `ValidationResult`
//! into that text.

use crate::validation::traits::ValidationResult;

/// Formatter for incorporating validation failures into a retry prompt.
#[derive(Debug, Clone)]
pub struct FeedbackFormatter {
    /// Whether warnings are listed after the errors.
    pub include_warnings: bool,

    /// Maximum number of errors to list.
    pub max_errors: usize,

    /// Maximum number of lines kept from a multi-line message.
    pub max_message_lines: usize,
}

impl Default for FeedbackFormatter {
    fn default() -> Self {
        Self {
            include_warnings: false,
            max_errors: 20,
            max_message_lines: 10,
        }
    }
}

impl FeedbackFormatter {
    /// Create a new formatter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warnings(mut self, include: bool) -> Self {
        self.include_warnings = include;
        self
    }

    /// Set the maximum number of errors listed.
    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = max.max(1);
        self
    }

    pub fn with_max_message_lines(mut self, max: usize) -> Self {
        self.max_message_lines = max.max(1);
        self
    }

    /// Format a failed result as bullet lines; empty for a passing result.
    pub fn format(&self, result: &ValidationResult) -> String {
        if result.is_valid && (!self.include_warnings || result.warnings.is_empty()) {
            return String::new();
        }

        let mut lines = Vec::new();

        for error in result.errors.iter().take(self.max_errors) {
            lines.push(self.bullet("ERROR", error));
        }
        if result.errors.len() > self.max_errors {
            lines.push(format!("- ... and {} more errors", result.errors.len() - self.max_errors));
        }

        if self.include_warnings {
            for warning in &result.warnings {
                lines.push(self.bullet("WARNING", warning));
            }
        }

        lines.join("\n")
    }

    fn bullet(&self, label: &str, message: &str) -> String {
        let message = truncate_lines(message, self.max_message_lines);
        let mut parts = message.lines();
        let first = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        if rest.is_empty() {
            format!("- {}: {}", label, first)
        } else {
            format!("- {}: {}\n{}", label, first, indent_text(&rest.join("\n"), "  "))
        }
    }
}

/// Truncate text to a maximum number of lines.
fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().take(max_lines).collect();
    let truncated = lines.len() < text.lines().count();
    let mut result = lines.join("\n");
    if truncated {
        result.push_str("\n... (truncated)");
    }
    result
}

/// Indent all lines of text by a prefix.
fn indent_text(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}
