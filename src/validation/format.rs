//! Format validator - checks that required markdown sections exist in the
//! output and that its length stays within bounds

use async_trait::async_trait;

use crate::validation::traits::{ValidationContext, ValidationResult, Validator, ValidatorError};

/// Configuration for which sections are required
#[derive(Debug, Clone, Default)]
pub struct FormatConfig {
    /// Required section headings (e.g., "## Overview")
    pub required_sections: Vec<String>,
    /// Minimum length in characters
    pub min_length: Option<usize>,
    /// Maximum length in characters
    pub max_length: Option<usize>,
}

impl FormatConfig {
    /// Create a new format configuration
    pub fn new(required_sections: Vec<String>) -> Self {
        Self {
            required_sections,
            ..Self::default()
        }
    }

    pub fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sections of a short written report
    pub fn report() -> Self {
        Self::new(vec![
            "## Summary".to_string(),
            "## Details".to_string(),
            "## Conclusion".to_string(),
        ])
    }
}

/// Validator that checks markdown output has required sections
pub struct FormatValidator {
    name: String,
    config: FormatConfig,
}

impl FormatValidator {
    /// Create a new format validator with the given configuration
    pub fn new(config: FormatConfig) -> Self {
        Self {
            name: "format".to_string(),
            config,
        }
    }

    /// Create a format validator for reports
    pub fn for_report() -> Self {
        Self::new(FormatConfig::report()).with_name("report")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check if content contains a required section
    fn has_section(content: &str, section: &str) -> bool {
        // Check for exact match at start of line
        content.lines().any(|line| line.trim() == section)
    }

    /// Find all missing sections
    fn find_missing_sections(&self, content: &str) -> Vec<String> {
        self.config
            .required_sections
            .iter()
            .filter(|section| !Self::has_section(content, section))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Validator for FormatValidator {
    async fn validate(
        &self,
        content: &str,
        _context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::pass();
        let length = content.chars().count();

        if let Some(min) = self.config.min_length.filter(|min| length < *min) {
            result.add_error(format!("Output is too short: {} characters, minimum is {}", length, min));
        }
        if let Some(max) = self.config.max_length.filter(|max| length > *max) {
            result.add_error(format!("Output is too long: {} characters, maximum is {}", length, max));
        }

        for section in self.find_missing_sections(content) {
            result.add_error(format!("Missing required section: {}", section));
        }

        Ok(result
            .with_metadata("length", length)
            .with_metadata("required_sections", self.config.required_sections.len()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        format!(
            "format:{}:{:?}:{:?}:{:?}",
            self.name, self.config.required_sections, self.config.min_length, self.config.max_length
        )
    }

    fn instructions(&self) -> String {
        let mut lines = vec!["Respond in markdown.".to_string()];
        if !self.config.required_sections.is_empty() {
            lines.push(format!(
                "Include each of these section headings on its own line: {}",
                self.config.required_sections.join(", ")
            ));
        }
        match (self.config.min_length, self.config.max_length) {
            (Some(min), Some(max)) => lines.push(format!("Keep the response between {} and {} characters.", min, max)),
            (Some(min), None) => lines.push(format!("The response must be at least {} characters.", min)),
            (None, Some(max)) => lines.push(format!("The response must be at most {} characters.", max)),
            (None, None) => {}
        }
        lines.join("\n")
    }
}
