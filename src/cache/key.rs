//! Cache key derivation

use crate::cache::types::{CacheKey, Language};
use sha2::{Digest, Sha256};

/// Builds `"<language>:<sha256 hex>"` keys from normalized queries
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the key. `normalized_query` must already be normalized.
    pub fn build(&self, language: Language, normalized_query: &str) -> CacheKey {
        let digest = Sha256::digest(normalized_query.as_bytes());
        format!("{}:{}", language.code(), hex::encode(digest))
    }
}
