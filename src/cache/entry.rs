//! Cached response entry with TTL support

use crate::cache::types::{CacheKey, Language, ResponseCategory};
use crate::clock::to_chrono;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The unit of storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// `"<language>:<sha256 hex>"`
    pub cache_key: CacheKey,

    pub language: Language,

    /// Output of the normalizer, the key is derived from this
    pub normalized_query: String,

    /// Raw caller text, kept for diagnostics only
    pub original_query: String,

    /// Text served on hit
    pub response_text: String,

    /// Model confidence in [0.0, 1.0]
    pub confidence_score: f64,

    pub response_category: ResponseCategory,

    /// Number of times this entry has been served
    pub hit_count: u64,

    pub created_at: DateTime<Utc>,

    /// Last hit (equal to `created_at` until the first hit)
    pub last_accessed_at: DateTime<Utc>,

    /// `None` = never expires
    pub expires_at: Option<DateTime<Utc>>,

    /// Soft-delete flag, cleared by maintenance or lazy expiry
    pub is_active: bool,

    /// Write generation assigned by the store; 0 until stored
    #[serde(default)]
    pub revision: u64,
}

impl CachedResponse {
    /// Create an active entry with no expiry and zero hits
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache_key: CacheKey,
        language: Language,
        normalized_query: String,
        original_query: String,
        response_text: String,
        confidence_score: f64,
        response_category: ResponseCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            cache_key,
            language,
            normalized_query,
            original_query,
            response_text,
            confidence_score,
            response_category,
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
            expires_at: None,
            is_active: true,
            revision: 0,
        }
    }

    /// Stamp the expiry relative to `created_at`
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.expires_at = ttl.map(|ttl| self.created_at + to_chrono(ttl));
        self
    }

    /// Check if the entry has expired at `now` (`expires_at <= now`)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Active and not expired
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Get the age of the entry
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Calculate the size of this entry in bytes
    pub fn calculate_size(&self) -> usize {
        // Approximate size: strings + fixed-size fields
        self.cache_key.len()
            + self.normalized_query.len()
            + self.original_query.len()
            + self.response_text.len()
            + std::mem::size_of::<Self>()
    }
}
