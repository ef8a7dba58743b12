//! Storage abstraction and the in-memory store
//!
//! [`CacheStore`] is the seam the engine talks to. [`MemoryStore`] keeps each
//! entry in its own slot whose counters are atomics, so a hit only needs a
//! shared read lock and concurrent hits on one key never lose an increment.

use crate::cache::{
    entry::CachedResponse,
    gate::ConfidenceGate,
    invalidation::InvalidationFilter,
    types::CacheKey,
};
use crate::clock::{SharedClock, SystemClock};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No live entry existed under the key
    Inserted,
    /// A live entry was replaced by an equally or more confident one
    Replaced,
    /// A more confident live entry was kept
    KeptExisting,
}

/// One batch of a cursor scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Entries in key order, active or not
    pub entries: Vec<CachedResponse>,
    /// Pass back to continue; `None` once the keyspace is exhausted
    pub next_cursor: Option<CacheKey>,
}

/// Key/value storage with TTL, usage counters and soft deletion
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live entry under `key`. Expired and inactive entries read as absent.
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>>;

    /// Write `entry` expiring `ttl` after its creation (`None` = never).
    /// A live entry is only replaced when [`ConfidenceGate::permits_overwrite`] allows it.
    async fn put(&self, entry: CachedResponse, ttl: Option<Duration>) -> Result<PutOutcome>;

    /// Atomically bump `hit_count` and `last_accessed_at`
    async fn increment_hit(&self, key: &str) -> Result<()>;

    /// Remove every live entry matching `filter`, returning how many
    async fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize>;

    /// Up to `limit` entries with keys strictly after `cursor`
    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage>;

    /// Clear the active flag of a scanned entry, provided the key still
    /// holds the same revision. True if the entry was active.
    async fn deactivate(&self, scanned: &CachedResponse) -> Result<bool>;

    /// Physically delete a scanned entry, returning the bytes reclaimed.
    /// Nothing is removed (0) when the key is gone, was rewritten since the
    /// scan, or served hits since the scan.
    async fn purge(&self, scanned: &CachedResponse) -> Result<usize>;

    /// Cheap round trip used by health checks
    async fn ping(&self) -> Result<()>;

    /// Number of stored entries, including inactive ones
    async fn len(&self) -> Result<usize>;
}

/// Storage slot: immutable payload plus atomic usage state
#[derive(Debug)]
struct Slot {
    entry: CachedResponse,
    hit_count: AtomicU64,
    last_accessed_ms: AtomicI64,
    active: AtomicBool,
    size_bytes: usize,
}

impl Slot {
    fn new(entry: CachedResponse) -> Self {
        let size_bytes = entry.calculate_size();
        Self {
            hit_count: AtomicU64::new(entry.hit_count),
            last_accessed_ms: AtomicI64::new(entry.last_accessed_at.timestamp_millis()),
            active: AtomicBool::new(entry.is_active),
            size_bytes,
            entry,
        }
    }

    fn snapshot(&self) -> CachedResponse {
        let mut entry = self.entry.clone();
        entry.hit_count = self.hit_count.load(Ordering::Acquire);
        entry.last_accessed_at = Utc
            .timestamp_millis_opt(self.last_accessed_ms.load(Ordering::Acquire))
            .single()
            .unwrap_or(entry.last_accessed_at);
        entry.is_active = self.active.load(Ordering::Acquire);
        entry
    }

    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.active.load(Ordering::Acquire) && !self.entry.is_expired_at(now)
    }
}

/// In-memory [`CacheStore`] with lazy expiry
pub struct MemoryStore {
    entries: RwLock<BTreeMap<CacheKey, Arc<Slot>>>,
    revisions: AtomicU64,
    clock: SharedClock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            revisions: AtomicU64::new(0),
            clock,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        let Some(slot) = entries.get(key) else {
            return Ok(None);
        };

        if slot.entry.is_expired_at(now) {
            // lazily tombstoned, maintenance reaps it
            if slot.active.swap(false, Ordering::AcqRel) {
                debug!("Cache entry expired: {}", key);
            }
            return Ok(None);
        }

        if !slot.active.load(Ordering::Acquire) {
            return Ok(None);
        }

        Ok(Some(slot.snapshot()))
    }

    async fn put(&self, entry: CachedResponse, ttl: Option<Duration>) -> Result<PutOutcome> {
        let now = self.clock.now();
        let mut entry = entry.with_ttl(ttl);
        let mut entries = self.entries.write().await;

        let outcome = match entries.get(&entry.cache_key) {
            Some(existing) if existing.is_live_at(now) => {
                let current = existing.snapshot();
                if !ConfidenceGate::permits_overwrite(&current, &entry) {
                    debug!(
                        "Keeping existing entry {} (confidence {:.2} > {:.2})",
                        entry.cache_key, current.confidence_score, entry.confidence_score
                    );
                    return Ok(PutOutcome::KeptExisting);
                }
                entry.hit_count = current.hit_count;
                entry.created_at = current.created_at;
                entry.last_accessed_at = current.last_accessed_at;
                PutOutcome::Replaced
            }
            _ => PutOutcome::Inserted,
        };

        entry.revision = self.revisions.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Cache put ({:?}): {}", outcome, entry.cache_key);
        entries.insert(entry.cache_key.clone(), Arc::new(Slot::new(entry)));
        Ok(outcome)
    }

    async fn increment_hit(&self, key: &str) -> Result<()> {
        let now_ms = self.clock.now().timestamp_millis();
        let entries = self.entries.read().await;

        if let Some(slot) = entries.get(key) {
            slot.hit_count.fetch_add(1, Ordering::AcqRel);
            slot.last_accessed_ms.fetch_max(now_ms, Ordering::AcqRel);
        }
        Ok(())
    }

    async fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;

        entries.retain(|_, slot| {
            if !filter.matches(&slot.entry) {
                return true;
            }
            if slot.is_live_at(now) {
                removed += 1;
            }
            false
        });

        Ok(removed)
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage> {
        let entries = self.entries.read().await;
        let lower = match cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };

        let page: Vec<CachedResponse> = entries
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, slot)| slot.snapshot())
            .collect();

        let next_cursor = if limit > 0 && page.len() == limit {
            page.last().map(|e| e.cache_key.clone())
        } else {
            None
        };

        Ok(ScanPage {
            entries: page,
            next_cursor,
        })
    }

    async fn deactivate(&self, scanned: &CachedResponse) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&scanned.cache_key)
            .filter(|slot| slot.entry.revision == scanned.revision)
            .map(|slot| slot.active.swap(false, Ordering::AcqRel))
            .unwrap_or(false))
    }

    async fn purge(&self, scanned: &CachedResponse) -> Result<usize> {
        let now = self.clock.now();
        // exclusive lock: no hit can land between the check and the removal
        let mut entries = self.entries.write().await;

        let Some(slot) = entries.get(&scanned.cache_key) else {
            return Ok(0);
        };

        if slot.entry.revision != scanned.revision {
            debug!("Not purging {}: rewritten since scan", scanned.cache_key);
            return Ok(0);
        }

        if slot.hit_count.load(Ordering::Acquire) != scanned.hit_count {
            // served since the scan, undo the sweep's deactivation
            if scanned.is_live_at(now) {
                slot.active.store(true, Ordering::Release);
            }
            debug!("Not purging {}: hit since scan", scanned.cache_key);
            return Ok(0);
        }

        let size_bytes = slot.size_bytes;
        entries.remove(&scanned.cache_key);
        Ok(size_bytes)
    }

    async fn ping(&self) -> Result<()> {
        let _entries = self.entries.read().await;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
