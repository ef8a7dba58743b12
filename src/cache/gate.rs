//! Confidence-based write admission

use crate::cache::entry::CachedResponse;

/// Default minimum confidence for a response to be cached
pub const DEFAULT_ADMISSION_THRESHOLD: f64 = 0.7;

/// Decides whether a model answer may be written to the cache
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_THRESHOLD)
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True iff `score >= threshold`
    pub fn admit(&self, score: f64) -> bool {
        score >= self.threshold
    }

    /// An existing live entry may only be replaced by an answer at least as
    /// confident as the one it holds.
    pub fn permits_overwrite(existing: &CachedResponse, incoming: &CachedResponse) -> bool {
        incoming.confidence_score >= existing.confidence_score
    }
}
