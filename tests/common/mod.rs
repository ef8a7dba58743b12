//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ouroboros_cache::analytics::{
    MemoryStatisticsRepository, PeriodType, StatisticsRepository, StatisticsRow,
};
use ouroboros_cache::cache::{
    CacheStore, CachedResponse, InvalidationFilter, MemoryStore, PutOutcome, ScanPage,
};
use ouroboros_cache::{CacheError, ManualClock, Result, SharedClock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Install a test subscriber; `RUST_LOG=ouroboros_cache=debug` shows engine logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_now())
}

/// [`MemoryStore`] that can be switched into failing mode and counts the
/// storage calls it receives
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::StorageUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        self.enter()?;
        self.inner.lookup(key).await
    }

    async fn put(&self, entry: CachedResponse, ttl: Option<Duration>) -> Result<PutOutcome> {
        self.enter()?;
        self.inner.put(entry, ttl).await
    }

    async fn increment_hit(&self, key: &str) -> Result<()> {
        self.enter()?;
        self.inner.increment_hit(key).await
    }

    async fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        self.enter()?;
        self.inner.invalidate(filter).await
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage> {
        self.enter()?;
        self.inner.scan(cursor, limit).await
    }

    async fn deactivate(&self, scanned: &CachedResponse) -> Result<bool> {
        self.enter()?;
        self.inner.deactivate(scanned).await
    }

    async fn purge(&self, scanned: &CachedResponse) -> Result<usize> {
        self.enter()?;
        self.inner.purge(scanned).await
    }

    async fn ping(&self) -> Result<()> {
        self.enter()?;
        self.inner.ping().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}

/// Store whose every call takes longer than the default lookup budget
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(clock: SharedClock, delay: Duration) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            delay,
        }
    }
}

#[async_trait]
impl CacheStore for SlowStore {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        tokio::time::sleep(self.delay).await;
        self.inner.lookup(key).await
    }

    async fn put(&self, entry: CachedResponse, ttl: Option<Duration>) -> Result<PutOutcome> {
        self.inner.put(entry, ttl).await
    }

    async fn increment_hit(&self, key: &str) -> Result<()> {
        self.inner.increment_hit(key).await
    }

    async fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        self.inner.invalidate(filter).await
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage> {
        self.inner.scan(cursor, limit).await
    }

    async fn deactivate(&self, scanned: &CachedResponse) -> Result<bool> {
        self.inner.deactivate(scanned).await
    }

    async fn purge(&self, scanned: &CachedResponse) -> Result<usize> {
        self.inner.purge(scanned).await
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.ping().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}

/// Store whose hit counter updates are slow while everything else is fast
pub struct SlowCounterStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowCounterStore {
    pub fn new(clock: SharedClock, delay: Duration) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            delay,
        }
    }

    /// Hit count as stored, bypassing the delay
    pub async fn hit_count(&self, key: &str) -> Option<u64> {
        self.inner.lookup(key).await.ok().flatten().map(|e| e.hit_count)
    }
}

#[async_trait]
impl CacheStore for SlowCounterStore {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        self.inner.lookup(key).await
    }

    async fn put(&self, entry: CachedResponse, ttl: Option<Duration>) -> Result<PutOutcome> {
        self.inner.put(entry, ttl).await
    }

    async fn increment_hit(&self, key: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.increment_hit(key).await
    }

    async fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        self.inner.invalidate(filter).await
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage> {
        self.inner.scan(cursor, limit).await
    }

    async fn deactivate(&self, scanned: &CachedResponse) -> Result<bool> {
        self.inner.deactivate(scanned).await
    }

    async fn purge(&self, scanned: &CachedResponse) -> Result<usize> {
        self.inner.purge(scanned).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}

/// Statistics repository whose appends fail while switched on
#[derive(Default)]
pub struct FailingRepository {
    inner: MemoryStatisticsRepository,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FailingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl StatisticsRepository for FailingRepository {
    async fn append(&self, row: StatisticsRow) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::StorageUnavailable("statistics table locked".to_string()));
        }
        self.inner.append(row).await
    }

    async fn query(
        &self,
        period_type: PeriodType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatisticsRow>> {
        self.inner.query(period_type, start, end).await
    }
}
