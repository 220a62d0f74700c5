//! Cache-wrapped validator

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::key::CacheKey;
use crate::cache::store::ValidationCache;
use crate::validation::{ValidationContext, ValidationResult, Validator, ValidatorError};

/// Routes every call through a shared `ValidationCache`.
///
/// Behaves exactly like the wrapped validator except that repeated
/// (configuration, content, context) triples skip recomputation.
pub struct CachedValidator {
    inner: Arc<dyn Validator>,
    cache: Arc<ValidationCache>,
}

impl CachedValidator {
    pub fn new(inner: Arc<dyn Validator>, cache: Arc<ValidationCache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &Arc<dyn Validator> {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }
}

#[async_trait]
impl Validator for CachedValidator {
    async fn validate(
        &self,
        content: &str,
        context: Option<&ValidationContext>,
    ) -> Result<ValidationResult, ValidatorError> {
        let key = CacheKey::for_validator(self.inner.as_ref(), content, context);
        self.cache
            .get_or_compute(&key, || self.inner.validate(content, context))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fingerprint(&self) -> String {
        self.inner.fingerprint()
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }

    fn instructions(&self) -> String {
        self.inner.instructions()
    }
}
