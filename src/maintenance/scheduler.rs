//! Periodic pruning of the cache store

use crate::cache::config::EngineConfig;
use crate::cache::invalidation::{InvalidationReason, PruneRules};
use crate::cache::store::CacheStore;
use crate::clock::SharedClock;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Knobs for one maintenance sweep
#[derive(Debug, Clone)]
pub struct MaintenanceOptions {
    /// Entries examined per batch
    pub batch_size: usize,
    /// Count what would be removed without touching storage
    pub dry_run: bool,
    pub rules: PruneRules,
    /// Pause after each batch so request traffic is not starved
    pub batch_pause: Duration,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl MaintenanceOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.maintenance_batch_size,
            dry_run: false,
            rules: config.prune_rules.clone(),
            batch_pause: config.maintenance_batch_pause,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_rules(mut self, rules: PruneRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub scanned: usize,
    pub removed_expired: usize,
    pub removed_low_value: usize,
    pub removed_low_quality: usize,
    /// Inactive, unexpired entries left behind by an earlier interrupted sweep
    pub tombstones_purged: usize,
    pub bytes_reclaimed: usize,
    pub batches: usize,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl MaintenanceReport {
    pub fn total_removed(&self) -> usize {
        self.removed_expired + self.removed_low_value + self.removed_low_quality + self.tombstones_purged
    }

    fn count(&mut self, reason: InvalidationReason) {
        match reason {
            InvalidationReason::Expired => self.removed_expired += 1,
            InvalidationReason::LowValue => self.removed_low_value += 1,
            InvalidationReason::LowQuality => self.removed_low_quality += 1,
            InvalidationReason::Manual => self.tombstones_purged += 1,
        }
    }
}

impl std::fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned {} in {} batches, removed {} (expired {}, low value {}, low quality {}, tombstones {}), reclaimed {} bytes in {}ms",
            self.scanned,
            self.batches,
            self.total_removed(),
            self.removed_expired,
            self.removed_low_value,
            self.removed_low_quality,
            self.tombstones_purged,
            self.bytes_reclaimed,
            self.duration_ms
        )
    }
}

/// Sweeps the store in cursor-ordered batches
pub struct MaintenanceScheduler {
    store: Arc<dyn CacheStore>,
    clock: SharedClock,
    interval: Duration,
    default_options: MaintenanceOptions,
}

impl MaintenanceScheduler {
    pub fn new(store: Arc<dyn CacheStore>, config: &EngineConfig, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            interval: config.maintenance_interval,
            default_options: MaintenanceOptions::from_config(config),
        }
    }

    pub fn default_options(&self) -> &MaintenanceOptions {
        &self.default_options
    }

    /// Run a single sweep. `shutdown` is checked between batches; once it
    /// reads true the sweep stops and the report is marked cancelled.
    pub async fn run_once(
        &self,
        options: &MaintenanceOptions,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<MaintenanceReport> {
        let started = Instant::now();
        let mut report = MaintenanceReport {
            run_id: Uuid::new_v4(),
            started_at: Some(self.clock.now()),
            dry_run: options.dry_run,
            ..Default::default()
        };
        let batch_size = options.batch_size.max(1);

        info!(
            "Maintenance run {} started (batch size {}, dry run: {})",
            report.run_id, batch_size, options.dry_run
        );

        let mut cursor: Option<String> = None;
        loop {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                warn!("Maintenance run {} cancelled after {} batches", report.run_id, report.batches);
                report.cancelled = true;
                break;
            }

            let page = self.store.scan(cursor.as_deref(), batch_size).await?;
            let now = self.clock.now();
            report.batches += 1;

            for entry in &page.entries {
                report.scanned += 1;

                let reason = if entry.is_active {
                    match options.rules.evaluate(entry, now) {
                        Some(reason) => reason,
                        None => continue,
                    }
                } else if entry.is_expired_at(now) {
                    InvalidationReason::Expired
                } else {
                    InvalidationReason::Manual
                };

                if options.dry_run {
                    report.count(reason);
                    report.bytes_reclaimed += entry.calculate_size();
                    continue;
                }

                // mark first so concurrent lookups stop serving it before the purge
                if entry.is_active {
                    self.store.deactivate(entry).await?;
                }
                let reclaimed = self.store.purge(entry).await?;
                if reclaimed > 0 {
                    debug!("Pruned {} ({})", entry.cache_key, reason);
                    report.count(reason);
                    report.bytes_reclaimed += reclaimed;
                } else {
                    debug!("Kept {}: changed since scan", entry.cache_key);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }

            tokio::task::yield_now().await;
            if !options.batch_pause.is_zero() {
                tokio::time::sleep(options.batch_pause).await;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("Maintenance run {} finished: {}", report.run_id, report);
        Ok(report)
    }

    /// Sweep every `maintenance_interval` until `shutdown` flips to true.
    /// The first sweep runs one interval after start.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting maintenance scheduler (interval: {:?})", self.interval);
            let cancel = shutdown.clone();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await; // skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let options = self.default_options.clone();
                        if let Err(e) = self.run_once(&options, Some(&cancel)).await {
                            warn!("Maintenance run failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Maintenance scheduler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CachedResponse;
    use crate::cache::invalidation::InvalidationFilter;
    use crate::cache::store::{MemoryStore, PutOutcome, ScanPage};
    use crate::cache::types::{Language, ResponseCategory};
    use crate::clock::{Clock, ManualClock};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Something that happens right after the first scan returns
    enum AfterScan {
        Put(CachedResponse),
        Hit(String),
        Shutdown(watch::Sender<bool>),
    }

    /// [`MemoryStore`] that runs an [`AfterScan`] action once, between the
    /// first scan and the sweep acting on it
    struct InterleavingStore {
        inner: Arc<MemoryStore>,
        after_scan: Mutex<Option<AfterScan>>,
        put_outcome: Mutex<Option<PutOutcome>>,
    }

    impl InterleavingStore {
        fn new(inner: Arc<MemoryStore>, action: AfterScan) -> Self {
            Self {
                inner,
                after_scan: Mutex::new(Some(action)),
                put_outcome: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CacheStore for InterleavingStore {
        async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
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
            let page = self.inner.scan(cursor, limit).await?;
            let action = self.after_scan.lock().unwrap().take();
            match action {
                Some(AfterScan::Put(entry)) => {
                    let outcome = self.inner.put(entry, None).await?;
                    *self.put_outcome.lock().unwrap() = Some(outcome);
                }
                Some(AfterScan::Hit(key)) => self.inner.increment_hit(&key).await?,
                Some(AfterScan::Shutdown(tx)) => {
                    tx.send(true).unwrap();
                }
                None => {}
            }
            Ok(page)
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

    const DAY: Duration = Duration::from_secs(86_400);

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, MaintenanceScheduler) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let scheduler = MaintenanceScheduler::new(store.clone(), &EngineConfig::default(), clock.clone());
        (clock, store, scheduler)
    }

    async fn seed(
        store: &MemoryStore,
        clock: &ManualClock,
        key: &str,
        confidence: f64,
        hits: u64,
        ttl: Option<Duration>,
    ) {
        let mut entry = CachedResponse::new(
            key.to_string(),
            Language::En,
            key.to_string(),
            key.to_string(),
            "answer".to_string(),
            confidence,
            ResponseCategory::General,
            clock.now(),
        );
        entry.hit_count = hits;
        store.put(entry, ttl).await.unwrap();
    }

    fn options() -> MaintenanceOptions {
        MaintenanceOptions::default()
            .with_batch_size(2)
            .with_batch_pause(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_prunes_by_reason() {
        let (clock, store, scheduler) = setup();
        seed(&store, &clock, "en:expired", 0.9, 10, Some(DAY)).await;
        seed(&store, &clock, "en:lowvalue", 0.9, 1, None).await;
        seed(&store, &clock, "en:lowquality", 0.4, 10, None).await;
        seed(&store, &clock, "en:keep", 0.9, 10, None).await;

        clock.advance(DAY * 31);
        let report = scheduler.run_once(&options(), None).await.unwrap();

        assert_eq!(report.scanned, 4);
        assert_eq!(report.removed_expired, 1);
        assert_eq!(report.removed_low_value, 1);
        assert_eq!(report.removed_low_quality, 1);
        assert!(report.bytes_reclaimed > 0);
        assert!(!report.cancelled);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.lookup("en:keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let (clock, store, scheduler) = setup();
        seed(&store, &clock, "en:lowquality", 0.3, 10, None).await;

        let report = scheduler.run_once(&options().dry_run(), None).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.removed_low_quality, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let (clock, store, scheduler) = setup();
        seed(&store, &clock, "en:lowquality", 0.3, 10, None).await;

        let (tx, rx) = watch::channel(true);
        let report = scheduler.run_once(&options(), Some(&rx)).await.unwrap();
        drop(tx);

        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purges_leftover_tombstones() {
        let (clock, store, scheduler) = setup();
        seed(&store, &clock, "en:a", 0.9, 10, None).await;
        let page = store.scan(None, 10).await.unwrap();
        store.deactivate(&page.entries[0]).await.unwrap();

        let report = scheduler.run_once(&options(), None).await.unwrap();
        assert_eq!(report.tombstones_purged, 1);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_answer_stored_mid_sweep_survives() {
        let (clock, store, _) = setup();
        seed(&store, &clock, "en:a", 0.9, 10, Some(DAY)).await;
        clock.advance(DAY * 2);

        let fresh = CachedResponse::new(
            "en:a".to_string(),
            Language::En,
            "en:a".to_string(),
            "en:a".to_string(),
            "fresh answer".to_string(),
            0.99,
            ResponseCategory::General,
            clock.now(),
        );
        let interleaving = Arc::new(InterleavingStore::new(store.clone(), AfterScan::Put(fresh)));
        let scheduler = MaintenanceScheduler::new(interleaving.clone(), &EngineConfig::default(), clock.clone());

        let report = scheduler.run_once(&options(), None).await.unwrap();

        assert_eq!(*interleaving.put_outcome.lock().unwrap(), Some(PutOutcome::Inserted));
        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed_expired, 0);
        let found = store.lookup("en:a").await.unwrap().unwrap();
        assert_eq!(found.response_text, "fresh answer");
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_hit_mid_sweep_survives() {
        let (clock, store, _) = setup();
        seed(&store, &clock, "en:a", 0.9, 1, None).await;
        clock.advance(DAY * 31);

        let interleaving = Arc::new(InterleavingStore::new(
            store.clone(),
            AfterScan::Hit("en:a".to_string()),
        ));
        let scheduler = MaintenanceScheduler::new(interleaving, &EngineConfig::default(), clock.clone());

        let report = scheduler.run_once(&options(), None).await.unwrap();
        assert_eq!(report.removed_low_value, 0);

        let found = store.lookup("en:a").await.unwrap().unwrap();
        assert!(found.is_active);
        assert_eq!(found.hit_count, 2);
    }

    #[tokio::test]
    async fn test_cancelled_mid_sweep_leaves_rest_intact() {
        let (clock, store, _) = setup();
        for i in 0..5 {
            seed(&store, &clock, &format!("en:{}", i), 0.3, 10, None).await;
        }

        let (tx, rx) = watch::channel(false);
        let interleaving = Arc::new(InterleavingStore::new(store.clone(), AfterScan::Shutdown(tx)));
        let scheduler = MaintenanceScheduler::new(interleaving, &EngineConfig::default(), clock.clone());

        // shutdown lands during batch 1, the sweep stops before batch 2
        let report = scheduler.run_once(&options(), Some(&rx)).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.batches, 1);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed_low_quality, 2);

        assert_eq!(store.len().await.unwrap(), 3);
        for i in 2..5 {
            let key = format!("en:{}", i);
            let entry = store.lookup(&key).await.unwrap().unwrap();
            assert!(entry.is_active);
            assert_eq!(entry.hit_count, 10);
        }

        let report = scheduler.run_once(&options(), None).await.unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.removed_low_quality, 3);
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
