//! In-flight markers for coalescing duplicate misses
//!
//! The first caller to miss on a key becomes its resolver and holds an
//! [`InflightGuard`]. Later callers for the same key get a receiver that
//! resolves once the guard is dropped, then look the key up again.

use crate::cache::types::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

type Markers = HashMap<CacheKey, watch::Receiver<()>>;

/// Outcome of claiming a key
#[derive(Debug)]
pub enum Claim {
    /// Caller resolves the key; drop the guard once the answer is stored
    Resolver(InflightGuard),
    /// Another caller is resolving it
    Waiter(watch::Receiver<()>),
}

/// Registry of keys currently being resolved
#[derive(Debug, Clone, Default)]
pub struct InflightRegistry {
    markers: Arc<Mutex<Markers>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Markers> {
        // the map stays consistent even if a holder panicked
        self.markers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn claim(&self, key: &str) -> Claim {
        let mut markers = self.lock();
        if let Some(rx) = markers.get(key) {
            return Claim::Waiter(rx.clone());
        }

        let (tx, rx) = watch::channel(());
        markers.insert(key.to_string(), rx);
        Claim::Resolver(InflightGuard {
            markers: self.markers.clone(),
            key: key.to_string(),
            _done: tx,
        })
    }

    /// Wait up to `timeout` for the resolver to finish. True if it did.
    pub async fn wait(mut rx: watch::Receiver<()>, timeout: Duration) -> bool {
        // the sender never sends, so `changed` only returns once it is dropped
        tokio::time::timeout(timeout, rx.changed()).await.is_ok()
    }

    pub fn is_inflight(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Held by the resolver of a key. Dropping it releases every waiter.
#[derive(Debug)]
pub struct InflightGuard {
    markers: Arc<Mutex<Markers>>,
    key: CacheKey,
    _done: watch::Sender<()>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut markers = self.markers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        markers.remove(&self.key);
        // `_done` drops after this, waking the waiters
    }
}
