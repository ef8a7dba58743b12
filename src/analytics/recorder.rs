//! Fire-and-forget lookup event recording and periodic roll-up
//!
//! `record` only pushes onto an unbounded channel, so the request path never
//! waits on analytics. `roll_up` drains the channel into per-period buckets
//! and appends every bucket whose period has ended to the repository.

use crate::analytics::repository::StatisticsRepository;
use crate::analytics::types::{
    hit_rate, CacheStatistics, DimensionMetrics, LookupEvent, PeriodType,
};
use crate::cache::types::{Language, ResponseCategory};
use crate::clock::SharedClock;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Running totals for one open period
#[derive(Debug, Clone)]
struct Bucket {
    period_type: PeriodType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total: u64,
    hits: u64,
    latency_sum_ms: f64,
    languages: BTreeMap<Language, DimensionMetrics>,
    categories: BTreeMap<ResponseCategory, DimensionMetrics>,
}

impl Bucket {
    fn new(period_type: PeriodType, ts: DateTime<Utc>) -> Self {
        let (start, end) = period_type.bounds(ts);
        Self {
            period_type,
            start,
            end,
            total: 0,
            hits: 0,
            latency_sum_ms: 0.0,
            languages: BTreeMap::new(),
            categories: BTreeMap::new(),
        }
    }

    fn add(&mut self, event: &LookupEvent) {
        self.total += 1;
        if event.hit {
            self.hits += 1;
        }
        self.latency_sum_ms += event.latency_ms;
        self.languages.entry(event.language).or_default().record(event.hit);
        self.categories.entry(event.category).or_default().record(event.hit);
    }

    fn to_statistics(&self, cost_per_call: f64, is_closed: bool) -> CacheStatistics {
        CacheStatistics {
            period_start: self.start,
            period_end: self.end,
            period_type: self.period_type,
            total_requests: self.total,
            cache_hits: self.hits,
            cache_misses: self.total - self.hits,
            hit_rate: hit_rate(self.hits, self.total),
            estimated_cost_savings: self.hits as f64 * cost_per_call,
            avg_latency_ms: if self.total == 0 {
                0.0
            } else {
                self.latency_sum_ms / self.total as f64
            },
            language_metrics: self.languages.clone(),
            category_metrics: self.categories.clone(),
            is_closed,
        }
    }
}

struct AggregatorState {
    events: mpsc::UnboundedReceiver<LookupEvent>,
    buckets: BTreeMap<(PeriodType, DateTime<Utc>), Bucket>,
}

/// Records lookup outcomes and aggregates them into [`CacheStatistics`]
pub struct AnalyticsRecorder {
    sender: mpsc::UnboundedSender<LookupEvent>,
    state: Mutex<AggregatorState>,
    repository: Arc<dyn StatisticsRepository>,
    cost_per_call: f64,
    clock: SharedClock,
}

impl AnalyticsRecorder {
    pub fn new(repository: Arc<dyn StatisticsRepository>, cost_per_call: f64, clock: SharedClock) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            sender,
            state: Mutex::new(AggregatorState {
                events,
                buckets: BTreeMap::new(),
            }),
            repository,
            cost_per_call,
            clock,
        }
    }

    /// Record one event. Never blocks and never fails the caller.
    pub fn record(&self, event: LookupEvent) {
        if self.sender.send(event).is_err() {
            debug!("Analytics channel closed, dropping lookup event");
        }
    }

    fn drain(&self, state: &mut AggregatorState) -> usize {
        let mut drained = 0;
        while let Ok(event) = state.events.try_recv() {
            for period_type in PeriodType::ALL {
                let (start, _) = period_type.bounds(event.timestamp);
                state
                    .buckets
                    .entry((period_type, start))
                    .or_insert_with(|| Bucket::new(period_type, event.timestamp))
                    .add(&event);
            }
            drained += 1;
        }
        drained
    }

    /// Drain pending events and persist every bucket whose period has ended.
    /// Returns the number of rows appended.
    pub async fn roll_up(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let drained = self.drain(&mut state);

        let closed: Vec<(PeriodType, DateTime<Utc>)> = state
            .buckets
            .iter()
            .filter(|(_, bucket)| bucket.end <= now)
            .map(|(key, _)| *key)
            .collect();

        let mut appended = 0;
        for key in closed {
            let Some(bucket) = state.buckets.get(&key) else {
                continue;
            };
            let row = bucket.to_statistics(self.cost_per_call, true).to_row()?;

            match self.repository.append(row).await {
                Ok(true) => {
                    appended += 1;
                    state.buckets.remove(&key);
                }
                Ok(false) => {
                    warn!(
                        "Statistics for {} period starting {} already recorded, dropping late events",
                        key.0, key.1
                    );
                    state.buckets.remove(&key);
                }
                Err(e) => {
                    // keep the bucket, next roll-up retries
                    warn!("Failed to persist {} statistics: {}", key.0, e);
                }
            }
        }

        if drained > 0 || appended > 0 {
            debug!("Analytics roll-up: {} events drained, {} rows appended", drained, appended);
        }
        Ok(appended)
    }

    /// Closed rows from the repository plus the still-open bucket(s) of
    /// `period_type` whose start lies in `[start, end)`, ordered by start.
    pub async fn get_statistics(
        &self,
        period_type: PeriodType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CacheStatistics>> {
        self.roll_up().await?;

        let mut statistics = self
            .repository
            .query(period_type, start, end)
            .await?
            .iter()
            .map(CacheStatistics::from_row)
            .collect::<Result<Vec<_>>>()?;

        let state = self.state.lock().await;
        statistics.extend(
            state
                .buckets
                .values()
                .filter(|b| b.period_type == period_type && b.start >= start && b.start < end)
                .map(|b| b.to_statistics(self.cost_per_call, false)),
        );
        statistics.sort_by_key(|s| s.period_start);

        Ok(statistics)
    }

    /// Run `roll_up` every `interval` until `shutdown` flips to true, then
    /// roll up one last time.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting analytics aggregator (interval: {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.roll_up().await {
                            warn!("Analytics roll-up failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            if let Err(e) = self.roll_up().await {
                                warn!("Final analytics roll-up failed: {}", e);
                            }
                            info!("Analytics aggregator stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
