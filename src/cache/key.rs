//! Cache key derivation

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::validation::{ValidationContext, Validator};

/// Identity of one validation: validator configuration, logic version,
/// content and context, hashed with SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    digest: String,
    content_len: usize,
}

impl CacheKey {
    /// Build a key from raw parts.
    ///
    /// Every field is length-prefixed so distinct inputs cannot produce the
    /// same byte stream. A missing context and an empty one are the same key.
    pub fn new(fingerprint: &str, version: u32, content: &str, context: Option<&ValidationContext>) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, fingerprint.as_bytes());
        hasher.update(version.to_le_bytes());
        update_field(&mut hasher, content.as_bytes());

        // BTreeMap and serde_json::Map both serialize keys in sorted order
        let context_json = match context {
            Some(ctx) if !ctx.is_empty() => serde_json::to_vec(ctx).unwrap_or_default(),
            _ => Vec::new(),
        };
        update_field(&mut hasher, &context_json);

        Self {
            digest: hex::encode(hasher.finalize()),
            content_len: content.len(),
        }
    }

    /// Key for running `validator` over `content`
    pub fn for_validator(validator: &dyn Validator, content: &str, context: Option<&ValidationContext>) -> Self {
        Self::new(&validator.fingerprint(), validator.version(), content, context)
    }

    /// Hex-encoded digest
    pub fn as_str(&self) -> &str {
        &self.digest
    }

    /// Byte length of the content the key was derived from
    pub fn content_len(&self) -> usize {
        self.content_len
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form for logs
        write!(f, "{}", &self.digest[..12.min(self.digest.len())])
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
