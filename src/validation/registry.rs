//! Validator registry - look up validators by name

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, VloopError};
use crate::validation::format::FormatValidator;
use crate::validation::function::FunctionValidator;
use crate::validation::json::JsonValidator;
use crate::validation::traits::Validator;

/// Named validators available to the CLI and other callers
pub struct ValidatorRegistry {
    validators: BTreeMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    /// Create a registry with the built-in validators
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register("json", JsonValidator::new());
        registry.register("json_object", JsonValidator::object());
        registry.register("json_array", JsonValidator::array());
        registry.register("report", FormatValidator::for_report());
        registry.register(
            "non_empty",
            FunctionValidator::predicate("non_empty", "output must not be empty", |content| {
                !content.trim().is_empty()
            }),
        );

        registry
    }

    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            validators: BTreeMap::new(),
        }
    }

    /// Register a validator under a name, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, validator: impl Validator + 'static) {
        self.register_shared(name, Arc::new(validator));
    }

    pub fn register_shared(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        let name = name.into();
        log::debug!("registering validator '{}'", name);
        self.validators.insert(name, validator);
    }

    /// Get a validator by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Validator>> {
        self.validators
            .get(name)
            .cloned()
            .ok_or_else(|| VloopError::ValidatorNotFound {
                name: name.to_string(),
                available: self.names().into_iter().map(String::from).collect(),
            })
    }

    /// Check if a validator exists
    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.validators.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
