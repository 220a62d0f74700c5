//! JSON validator - output must parse as JSON, optionally as an object
//! carrying a set of required keys

use async_trait::async_trait;
use serde_json::Value;

use crate::validation::traits::{ValidationContext, ValidationResult, Validator, ValidatorError};

/// Expected top-level JSON shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Any,
    Object,
    Array,
}

impl JsonShape {
    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonShape::Any => true,
            JsonShape::Object => value.is_object(),
            JsonShape::Array => value.is_array(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            JsonShape::Any => "any",
            JsonShape::Object => "object",
            JsonShape::Array => "array",
        }
    }
}

pub struct JsonValidator {
    shape: JsonShape,
    required_keys: Vec<String>,
}

impl JsonValidator {
    /// Accept any well-formed JSON document
    pub fn new() -> Self {
        Self {
            shape: JsonShape::Any,
            required_keys: Vec::new(),
        }
    }

    /// Require a JSON object
    pub fn object() -> Self {
        Self {
            shape: JsonShape::Object,
            required_keys: Vec::new(),
        }
    }

    /// Require a JSON array
    pub fn array() -> Self {
        Self {
            shape: JsonShape::Array,
            required_keys: Vec::new(),
        }
    }

    /// Require a top-level key; implies an object
    pub fn with_required_key(mut self, key: impl Into<String>) -> Self {
        self.shape = JsonShape::Object;
        self.required_keys.push(key.into());
        self
    }
}

impl Default for JsonValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for JsonValidator {
    async fn validate(
        &self,
        content: &str,
        _context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        let value: Value = match serde_json::from_str(content) {
            Ok(value) => value,
            Err(e) => {
                return Ok(ValidationResult::fail(format!(
                    "must be JSON: {} (line {}, column {})",
                    e,
                    e.line(),
                    e.column()
                )));
            }
        };

        if !self.shape.matches(&value) {
            return Ok(ValidationResult::fail(format!(
                "expected a JSON {}, got {}",
                self.shape.as_str(),
                kind_of(&value)
            )));
        }

        let mut result = ValidationResult::pass();
        if let Value::Object(map) = &value {
            for key in &self.required_keys {
                if !map.contains_key(key) {
                    result.add_error(format!("missing required key '{}'", key));
                }
            }
            if map.is_empty() {
                result = result.with_warning("JSON object is empty");
            }
        }
        Ok(result.with_metadata("json_type", kind_of(&value)))
    }

    fn name(&self) -> &str {
        "json"
    }

    fn fingerprint(&self) -> String {
        format!("json:{}:{}", self.shape.as_str(), self.required_keys.join(","))
    }

    fn instructions(&self) -> String {
        let mut text = match self.shape {
            JsonShape::Any => "Respond with valid JSON only, with no surrounding prose.".to_string(),
            JsonShape::Object => "Respond with a single valid JSON object only, with no surrounding prose.".to_string(),
            JsonShape::Array => "Respond with a single valid JSON array only, with no surrounding prose.".to_string(),
        };
        if !self.required_keys.is_empty() {
            text.push_str(&format!("\nThe object must contain the keys: {}", self.required_keys.join(", ")));
        }
        text
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_json() {
        let validator = JsonValidator::new();
        let result = validator.validate(r#"{"a": 1}"#, None).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.metadata["json_type"], "object");
        assert!(validator.validate("[1, 2]", None).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let result = JsonValidator::new().validate("not json", None).await.unwrap();
        assert!(!result.is_valid);
        assert!(result.errors[0].starts_with("must be JSON"));
    }

    #[tokio::test]
    async fn test_shape_mismatch() {
        let result = JsonValidator::object().validate("[1]", None).await.unwrap();
        assert_eq!(result.errors, vec!["expected a JSON object, got array".to_string()]);

        let result = JsonValidator::array().validate("{}", None).await.unwrap();
        assert!(!result.is_valid);
    }

    #[tokio::test]
    async fn test_required_keys() {
        let validator = JsonValidator::object().with_required_key("name").with_required_key("age");
        let result = validator.validate(r#"{"name": "x"}"#, None).await.unwrap();
        assert_eq!(result.errors, vec!["missing required key 'age'".to_string()]);

        let result = validator.validate(r#"{"name": "x", "age": 3}"#, None).await.unwrap();
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_empty_object_warns() {
        let result = JsonValidator::object().validate("{}", None).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["JSON object is empty".to_string()]);
    }

    #[test]
    fn test_fingerprint_and_instructions() {
        let a = JsonValidator::object().with_required_key("id");
        let b = JsonValidator::object();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.instructions().contains("id"));
    }
}
