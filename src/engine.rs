//! Response cache engine and health reporting
//!
//! [`ResponseCacheEngine`] is the entry point request handlers talk to. It
//! composes normalization, keying, the confidence gate, the guarded store,
//! analytics and maintenance behind six operations: `lookup`, `store`,
//! `invalidate`, `get_statistics`, `run_maintenance` and `health`.
//!
//! Storage trouble never reaches a caller. A lookup that cannot reach
//! storage is a miss, a write that cannot reach it is dropped, and both are
//! counted by the degradation guard.

use crate::analytics::{
    AnalyticsRecorder, CacheStatistics, LookupEvent, MemoryStatisticsRepository, PeriodType,
    StatisticsRepository,
};
use crate::cache::{
    config::EngineConfig,
    entry::CachedResponse,
    gate::ConfidenceGate,
    guard::{BreakerSnapshot, BreakerState, DegradationGuard},
    inflight::{Claim, InflightGuard, InflightRegistry},
    invalidation::InvalidationFilter,
    key::CacheKeyBuilder,
    normalizer::QueryNormalizer,
    store::{CacheStore, MemoryStore, PutOutcome},
    types::{CacheKey, Language, ResponseCategory},
};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{CacheError, Result};
use crate::maintenance::{MaintenanceOptions, MaintenanceReport, MaintenanceScheduler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupOutcome {
    pub hit: bool,
    /// Cached text, present on hit
    pub response: Option<String>,
    /// Category of the cached entry on hit, the caller's hint on miss
    pub category: Option<ResponseCategory>,
    pub cache_key: CacheKey,
}

impl LookupOutcome {
    fn hit(entry: CachedResponse) -> Self {
        Self {
            hit: true,
            response: Some(entry.response_text),
            category: Some(entry.response_category),
            cache_key: entry.cache_key,
        }
    }

    pub fn miss(cache_key: CacheKey, hint: Option<ResponseCategory>) -> Self {
        Self {
            hit: false,
            response: None,
            category: hint,
            cache_key,
        }
    }
}

/// A fresh model answer offered to the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub original_query: String,
    pub language: Language,
    pub response_text: String,
    pub confidence_score: f64,
    pub category: ResponseCategory,
}

impl StoreRequest {
    pub fn new(
        original_query: impl Into<String>,
        language: Language,
        response_text: impl Into<String>,
        confidence_score: f64,
        category: ResponseCategory,
    ) -> Self {
        Self {
            original_query: original_query.into(),
            language,
            response_text: response_text.into(),
            confidence_score,
            category,
        }
    }
}

/// What happened to a [`StoreRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    /// New entry written
    Stored,
    /// Live entry replaced by an equally or more confident answer
    Replaced,
    /// A more confident live entry was kept
    KeptExisting,
    /// Confidence below the admission threshold
    QualityRejected,
    /// Storage unavailable or guard open, nothing written
    Dropped,
}

impl StoreOutcome {
    /// True if the answer is now what the cache serves
    pub fn accepted(&self) -> bool {
        matches!(self, StoreOutcome::Stored | StoreOutcome::Replaced)
    }
}

impl From<PutOutcome> for StoreOutcome {
    fn from(outcome: PutOutcome) -> Self {
        match outcome {
            PutOutcome::Inserted => StoreOutcome::Stored,
            PutOutcome::Replaced => StoreOutcome::Replaced,
            PutOutcome::KeptExisting => StoreOutcome::KeptExisting,
        }
    }
}

/// Result of [`ResponseCacheEngine::coalesce`]
#[derive(Debug)]
pub enum Coalesced {
    /// Nobody else is resolving this query. Call the model, `store` the
    /// answer, then drop the guard to release waiters.
    Resolve(InflightGuard),
    /// Another caller resolved it while we waited
    Cached(LookupOutcome),
    /// The resolver did not produce a cached answer in time
    Uncoalesced,
}

/// Engine health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Storage reachable and fast, guard closed
    Healthy,
    /// Guard not closed, or storage slow or failing. Lookups still answer
    /// (as misses) so the service stays up.
    Degraded,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub breaker_state: BreakerState,
    /// Ping round trip, `None` when storage was not pinged
    pub storage_latency_ms: Option<u64>,
    pub breaker: BreakerSnapshot,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Response cache engine
///
/// Cloning is cheap and every clone shares the same guard, analytics and
/// in-flight registry.
#[derive(Clone)]
pub struct ResponseCacheEngine {
    config: Arc<EngineConfig>,
    store: Arc<dyn CacheStore>,
    guard: Arc<DegradationGuard>,
    gate: ConfidenceGate,
    normalizer: QueryNormalizer,
    keys: CacheKeyBuilder,
    analytics: Arc<AnalyticsRecorder>,
    maintenance: Arc<MaintenanceScheduler>,
    inflight: InflightRegistry,
    clock: SharedClock,
}

impl ResponseCacheEngine {
    /// Engine over `store` with the system clock and in-memory statistics
    pub fn new(config: EngineConfig, store: Arc<dyn CacheStore>) -> Result<Self> {
        Self::with_components(
            config,
            store,
            Arc::new(MemoryStatisticsRepository::new()),
            Arc::new(SystemClock),
        )
    }

    /// Engine over a fresh [`MemoryStore`]
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    /// Engine over a fresh [`MemoryStore`] that shares `clock`
    pub fn in_memory_with_clock(config: EngineConfig, clock: SharedClock) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self::with_components(
            config,
            store,
            Arc::new(MemoryStatisticsRepository::new()),
            clock,
        )
    }

    pub fn with_components(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        repository: Arc<dyn StatisticsRepository>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let guard = Arc::new(DegradationGuard::new(config.breaker.clone(), clock.clone()));
        let analytics = Arc::new(AnalyticsRecorder::new(
            repository,
            config.cost_per_call,
            clock.clone(),
        ));
        let maintenance = Arc::new(MaintenanceScheduler::new(store.clone(), &config, clock.clone()));

        info!(
            "Response cache engine ready (admission threshold {}, lookup budget {:?})",
            config.admission_threshold, config.lookup_timeout
        );

        Ok(Self {
            gate: ConfidenceGate::new(config.admission_threshold),
            config: Arc::new(config),
            store,
            guard,
            normalizer: QueryNormalizer::new(),
            keys: CacheKeyBuilder::new(),
            analytics,
            maintenance,
            inflight: InflightRegistry::new(),
            clock,
        })
    }

    /// Replace the degradation guard with one shared by other engines in
    /// this process
    pub fn with_shared_guard(mut self, guard: Arc<DegradationGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn guard(&self) -> &Arc<DegradationGuard> {
        &self.guard
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.guard.snapshot()
    }

    /// Normalize `query` and derive its key
    pub fn key_for(&self, query: &str, language: Language) -> Result<CacheKey> {
        let normalized = self.normalize(query, language)?;
        Ok(self.keys.build(language, &normalized))
    }

    fn normalize(&self, query: &str, language: Language) -> Result<String> {
        let normalized = self.normalizer.normalize(query, language);
        if normalized.is_empty() {
            return Err(CacheError::EmptyQuery);
        }
        Ok(normalized)
    }

    /// Look up a cached response. Only validation errors are returned.
    pub async fn lookup(&self, query: &str, language: Language) -> Result<LookupOutcome> {
        self.lookup_with_hint(query, language, None).await
    }

    /// Like [`lookup`](Self::lookup); `hint` is the category a miss is
    /// attributed to in analytics (`general` when absent).
    pub async fn lookup_with_hint(
        &self,
        query: &str,
        language: Language,
        hint: Option<ResponseCategory>,
    ) -> Result<LookupOutcome> {
        let started = Instant::now();
        let key = self.key_for(query, language)?;

        let found = match self
            .guard
            .execute("lookup", self.config.lookup_timeout, self.store.lookup(&key))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                debug!("Lookup of {} served as miss: {}", key, e);
                None
            }
        };

        let outcome = match found {
            Some(entry) => {
                self.count_hit(&key, started).await;
                debug!("Cache hit: {}", key);
                LookupOutcome::hit(entry)
            }
            None => {
                debug!("Cache miss: {}", key);
                LookupOutcome::miss(key, hint)
            }
        };

        self.analytics.record(LookupEvent {
            hit: outcome.hit,
            language,
            category: outcome.category.unwrap_or_default(),
            timestamp: self.clock.now(),
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        });

        Ok(outcome)
    }

    /// Bump the hit counter without holding the hit past the lookup budget.
    /// The update runs as its own task under the write budget; if it is not
    /// done when the lookup budget runs out it finishes in the background.
    async fn count_hit(&self, key: &CacheKey, started: Instant) {
        let guard = self.guard.clone();
        let store = self.store.clone();
        let write_timeout = self.config.write_timeout;
        let task_key = key.clone();

        let update = tokio::spawn(async move {
            if let Err(e) = guard
                .execute("increment_hit", write_timeout, store.increment_hit(&task_key))
                .await
            {
                debug!("Hit counter update for {} skipped: {}", task_key, e);
            }
        });

        let remaining = self.config.lookup_timeout.saturating_sub(started.elapsed());
        if tokio::time::timeout(remaining, update).await.is_err() {
            debug!("Hit counter update for {} continues in background", key);
        }
    }

    /// Offer a fresh answer to the cache. Only validation errors are
    /// returned; everything else is reported through [`StoreOutcome`].
    pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome> {
        let confidence = request.confidence_score;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CacheError::InvalidConfidence(confidence));
        }

        let normalized = self.normalize(&request.original_query, request.language)?;

        if !self.gate.admit(confidence) {
            debug!(
                "Not caching answer below threshold ({:.2} < {:.2})",
                confidence,
                self.gate.threshold()
            );
            return Ok(StoreOutcome::QualityRejected);
        }

        let key = self.keys.build(request.language, &normalized);
        let ttl = self.config.ttl_policy.ttl_with_jitter(request.category);
        let entry = CachedResponse::new(
            key.clone(),
            request.language,
            normalized,
            request.original_query,
            request.response_text,
            confidence,
            request.category,
            self.clock.now(),
        );

        match self
            .guard
            .execute("store", self.config.write_timeout, self.store.put(entry, ttl))
            .await
        {
            Ok(outcome) => Ok(outcome.into()),
            Err(e) => {
                debug!("Write of {} dropped: {}", key, e);
                Ok(StoreOutcome::Dropped)
            }
        }
    }

    /// Remove every live entry matching `filter`. Returns 0 when storage is
    /// unavailable.
    pub async fn invalidate(&self, filter: InvalidationFilter) -> usize {
        match self
            .guard
            .execute("invalidate", self.config.write_timeout, self.store.invalidate(&filter))
            .await
        {
            Ok(removed) => {
                info!("Invalidated {} entries ({})", removed, filter);
                removed
            }
            Err(e) => {
                warn!("Invalidation ({}) skipped: {}", filter, e);
                0
            }
        }
    }

    /// Invalidate the entry a query maps to
    pub async fn invalidate_query(&self, query: &str, language: Language) -> Result<usize> {
        let key = self.key_for(query, language)?;
        Ok(self.invalidate(InvalidationFilter::Key(key)).await)
    }

    /// Statistics of `period_type` starting in `[start, end)`, including
    /// the still-open period
    pub async fn get_statistics(
        &self,
        period_type: PeriodType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CacheStatistics>> {
        if start >= end {
            return Ok(Vec::new());
        }
        self.analytics.get_statistics(period_type, start, end).await
    }

    /// Force buffered analytics into statistics rows
    pub async fn flush_analytics(&self) -> Result<usize> {
        self.analytics.roll_up().await
    }

    /// Options the scheduled sweep uses
    pub fn maintenance_options(&self) -> MaintenanceOptions {
        self.maintenance.default_options().clone()
    }

    /// Run one maintenance sweep now
    pub async fn run_maintenance(&self, options: MaintenanceOptions) -> Result<MaintenanceReport> {
        self.maintenance.run_once(&options, None).await
    }

    /// Report engine health. Storage is not pinged while the guard is open.
    pub async fn health(&self) -> HealthReport {
        let breaker = self.guard.snapshot();
        let timestamp = self.clock.now();

        if breaker.state != BreakerState::Closed {
            return HealthReport {
                status: HealthStatus::Degraded,
                breaker_state: breaker.state,
                storage_latency_ms: None,
                breaker,
                timestamp,
                error: Some("storage bypassed by degradation guard".to_string()),
            };
        }

        let started = Instant::now();
        let ping = tokio::time::timeout(self.config.lookup_timeout, self.store.ping()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (status, error) = match ping {
            Ok(Ok(())) if latency_ms > self.config.degraded_latency_threshold_ms => (
                HealthStatus::Degraded,
                Some(format!("storage ping took {}ms", latency_ms)),
            ),
            Ok(Ok(())) => (HealthStatus::Healthy, None),
            Ok(Err(e)) => (HealthStatus::Degraded, Some(e.to_string())),
            Err(_) => (
                HealthStatus::Degraded,
                Some(format!(
                    "storage ping timed out after {}ms",
                    self.config.lookup_timeout.as_millis()
                )),
            ),
        };

        if let Some(error) = &error {
            warn!("Response cache degraded: {}", error);
        }

        HealthReport {
            status,
            breaker_state: breaker.state,
            storage_latency_ms: Some(latency_ms),
            breaker,
            timestamp,
            error,
        }
    }

    /// Coalesce concurrent misses on the same query.
    ///
    /// Call after a miss. The first caller gets [`Coalesced::Resolve`]; the
    /// others wait up to `coalesce_wait` for it and then look up again.
    pub async fn coalesce(&self, query: &str, language: Language) -> Result<Coalesced> {
        let key = self.key_for(query, language)?;

        let rx = match self.inflight.claim(&key) {
            Claim::Resolver(guard) => return Ok(Coalesced::Resolve(guard)),
            Claim::Waiter(rx) => rx,
        };

        debug!("Waiting for in-flight resolution of {}", key);
        if !InflightRegistry::wait(rx, self.config.coalesce_wait).await {
            debug!("In-flight wait for {} timed out", key);
            return Ok(Coalesced::Uncoalesced);
        }

        let outcome = self.lookup(query, language).await?;
        if outcome.hit {
            Ok(Coalesced::Cached(outcome))
        } else {
            Ok(Coalesced::Uncoalesced)
        }
    }

    /// Start the analytics aggregator and the maintenance scheduler. Both
    /// stop once `shutdown` reads true.
    pub fn spawn_background(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.analytics
                .clone()
                .spawn(self.config.analytics_rollup_interval, shutdown.clone()),
            self.maintenance.clone().spawn(shutdown),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn engine() -> (Arc<ManualClock>, ResponseCacheEngine) {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = ResponseCacheEngine::in_memory_with_clock(EngineConfig::default(), clock.clone()).unwrap();
        (clock, engine)
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (_, engine) = engine();

        assert!(matches!(engine.lookup("   ?! ", Language::En).await, Err(CacheError::EmptyQuery)));

        let request = StoreRequest::new("hi", Language::En, "Hello", 1.5, ResponseCategory::Greeting);
        assert!(matches!(engine.store(request).await, Err(CacheError::InvalidConfidence(_))));

        let request = StoreRequest::new("hi", Language::En, "Hello", f64::NAN, ResponseCategory::Greeting);
        assert!(engine.store(request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let (_, engine) = engine();
        let request = StoreRequest::new("What are your hours?", Language::En, "9 to 5", 0.9, ResponseCategory::Hours);
        assert_eq!(engine.store(request).await.unwrap(), StoreOutcome::Stored);

        let outcome = engine.lookup("what are your hours", Language::En).await.unwrap();
        assert!(outcome.hit);
        assert_eq!(outcome.response.as_deref(), Some("9 to 5"));
        assert_eq!(outcome.category, Some(ResponseCategory::Hours));
    }

    #[tokio::test]
    async fn test_miss_carries_hint() {
        let (_, engine) = engine();
        let outcome = engine
            .lookup_with_hint("how much", Language::En, Some(ResponseCategory::Pricing))
            .await
            .unwrap();
        assert!(!outcome.hit);
        assert_eq!(outcome.category, Some(ResponseCategory::Pricing));
        assert!(outcome.cache_key.starts_with("en:"));
    }

    #[tokio::test]
    async fn test_invalidate_query() {
        let (_, engine) = engine();
        let request = StoreRequest::new("where are you", Language::Es, "Madrid", 0.8, ResponseCategory::Location);
        engine.store(request).await.unwrap();

        assert_eq!(engine.invalidate_query("Where are you?", Language::Es).await.unwrap(), 1);
        assert!(!engine.lookup("where are you", Language::Es).await.unwrap().hit);
    }

    #[tokio::test]
    async fn test_health_healthy_when_closed() {
        let (_, engine) = engine();
        let report = engine.health().await;
        assert!(report.is_healthy());
        assert_eq!(report.breaker_state, BreakerState::Closed);
        assert!(report.storage_latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_health_degraded_when_open() {
        let (_, engine) = engine();
        for _ in 0..5 {
            let admission = engine.guard().admit();
            engine.guard().record_failure(admission);
        }

        let report = engine.health().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.breaker_state, BreakerState::Open);
        assert_eq!(report.storage_latency_ms, None);
    }

    #[tokio::test]
    async fn test_coalesce_single_resolver() {
        let (_, engine) = engine();
        let Coalesced::Resolve(guard) = engine.coalesce("prices", Language::En).await.unwrap() else {
            panic!("first caller should resolve");
        };

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.coalesce("Prices?", Language::En).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let request = StoreRequest::new("prices", Language::En, "From $10", 0.95, ResponseCategory::Pricing);
        engine.store(request).await.unwrap();
        drop(guard);

        match waiter.await.unwrap().unwrap() {
            Coalesced::Cached(outcome) => assert_eq!(outcome.response.as_deref(), Some("From $10")),
            other => panic!("expected cached outcome, got {:?}", other),
        }
    }
}
