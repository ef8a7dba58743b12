//! Category-driven expiration rules

use crate::cache::types::ResponseCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Maps a response category to its time-to-live. `None` means never expires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtlPolicy {
    /// Per-category replacements for the built-in table
    #[serde(default)]
    overrides: HashMap<ResponseCategory, Option<Duration>>,

    /// TTL jitter factor (0.0 - 1.0), spreads expiry of entries stored together
    #[serde(default)]
    jitter: f64,
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in TTL for a category
    pub fn base_ttl(category: ResponseCategory) -> Option<Duration> {
        match category {
            ResponseCategory::Greeting => None,
            ResponseCategory::Pricing => Some(Duration::from_secs(7 * DAY)),
            ResponseCategory::Services => Some(Duration::from_secs(30 * DAY)),
            ResponseCategory::Hours => Some(Duration::from_secs(7 * DAY)),
            ResponseCategory::Location => Some(Duration::from_secs(30 * DAY)),
            ResponseCategory::Availability => Some(Duration::from_secs(HOUR)),
            ResponseCategory::Booking => Some(Duration::from_secs(HOUR)),
            ResponseCategory::General => Some(Duration::from_secs(DAY)),
        }
    }

    /// Replace the TTL for one category
    pub fn with_override(mut self, category: ResponseCategory, ttl: Option<Duration>) -> Self {
        self.overrides.insert(category, ttl);
        self
    }

    /// Set the jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// TTL for a category, before jitter
    pub fn ttl_for(&self, category: ResponseCategory) -> Option<Duration> {
        match self.overrides.get(&category) {
            Some(ttl) => *ttl,
            None => Self::base_ttl(category),
        }
    }

    /// TTL for a category with jitter applied
    pub fn ttl_with_jitter(&self, category: ResponseCategory) -> Option<Duration> {
        let ttl = self.ttl_for(category)?;
        if self.jitter <= 0.0 {
            return Some(ttl);
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Some(Duration::from_secs_f64(final_secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("ttl jitter must be between 0.0 and 1.0".to_string());
        }
        if let Some((category, _)) = self
            .overrides
            .iter()
            .find(|(_, ttl)| matches!(ttl, Some(d) if d.is_zero()))
        {
            return Err(format!("ttl override for {} must be greater than 0", category));
        }
        Ok(())
    }
}
