//! Invalidation filters and pruning rules
//!
//! Two ways an entry leaves the cache:
//! - Manual: the caller invalidates by category, language or key
//! - Pruning: maintenance finds it expired, low-value or low-quality

use crate::cache::entry::CachedResponse;
use crate::cache::types::{CacheKey, Language, ResponseCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Selects the entries removed by a bulk invalidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "value")]
pub enum InvalidationFilter {
    Category(ResponseCategory),
    Language(Language),
    Key(CacheKey),
}

impl InvalidationFilter {
    pub fn matches(&self, entry: &CachedResponse) -> bool {
        match self {
            InvalidationFilter::Category(category) => entry.response_category == *category,
            InvalidationFilter::Language(language) => entry.language == *language,
            InvalidationFilter::Key(key) => entry.cache_key == *key,
        }
    }
}

impl std::fmt::Display for InvalidationFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationFilter::Category(c) => write!(f, "category={}", c),
            InvalidationFilter::Language(l) => write!(f, "language={}", l),
            InvalidationFilter::Key(k) => write!(f, "key={}", k),
        }
    }
}

/// Reason for cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// `expires_at <= now`
    Expired,

    /// Rarely served and old
    LowValue,

    /// Confidence below the retention floor
    LowQuality,

    /// Removed through `invalidate`
    Manual,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::LowValue => write!(f, "low value"),
            InvalidationReason::LowQuality => write!(f, "low quality"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
        }
    }
}

/// Lifecycle-end predicates evaluated by maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneRules {
    /// Entries with fewer hits than this are low-value once old enough
    pub low_value_min_hits: u64,

    /// Age after which an under-used entry is low-value
    pub low_value_max_age: Duration,

    /// Entries below this confidence are low-quality
    pub min_quality: f64,
}

impl Default for PruneRules {
    fn default() -> Self {
        Self {
            low_value_min_hits: 2,
            low_value_max_age: Duration::from_secs(30 * 24 * 3600),
            min_quality: 0.5,
        }
    }
}

impl PruneRules {
    /// First matching reason, checked in order: expired, low-value, low-quality
    pub fn evaluate(&self, entry: &CachedResponse, now: DateTime<Utc>) -> Option<InvalidationReason> {
        if entry.is_expired_at(now) {
            return Some(InvalidationReason::Expired);
        }

        if entry.hit_count < self.low_value_min_hits && entry.age_at(now) > self.low_value_max_age {
            return Some(InvalidationReason::LowValue);
        }

        if entry.confidence_score < self.min_quality {
            return Some(InvalidationReason::LowQuality);
        }

        None
    }
}
