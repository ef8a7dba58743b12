//! Configuration for the response cache engine

use crate::cache::gate::DEFAULT_ADMISSION_THRESHOLD;
use crate::cache::guard::BreakerConfig;
use crate::cache::invalidation::PruneRules;
use crate::cache::ttl::TtlPolicy;
use crate::cache::types::ResponseCategory;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every environment variable read by [`EngineConfig::from_env`]
pub const ENV_PREFIX: &str = "RESPONSE_CACHE_";

/// Configuration for the response cache engine
///
/// Defaults:
/// - Lookups give storage 50ms so a hit stays well under 100ms end-to-end
/// - Answers below 0.7 confidence are never cached
/// - 5 consecutive storage failures open the guard for 60s
/// - Maintenance sweeps daily in batches of 500
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum confidence for a response to be cached
    pub admission_threshold: f64,

    /// Time budget for a storage lookup
    pub lookup_timeout: Duration,

    /// Time budget for storage writes and invalidations
    pub write_timeout: Duration,

    /// Degradation guard thresholds
    pub breaker: BreakerConfig,

    /// Category to TTL table
    pub ttl_policy: TtlPolicy,

    /// Cost of one external model call, used for savings estimates
    pub cost_per_call: f64,

    /// How often buffered analytics are rolled into statistics rows
    pub analytics_rollup_interval: Duration,

    /// Interval between maintenance sweeps
    pub maintenance_interval: Duration,

    /// Entries examined per maintenance batch
    pub maintenance_batch_size: usize,

    /// Pause between maintenance batches
    pub maintenance_batch_pause: Duration,

    /// Lifecycle-end predicates for maintenance
    pub prune_rules: PruneRules,

    /// How long a duplicate miss waits for the in-flight resolver
    pub coalesce_wait: Duration,

    /// Storage ping latency above which health reports degraded
    pub degraded_latency_threshold_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission_threshold: DEFAULT_ADMISSION_THRESHOLD,
            lookup_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(250),
            breaker: BreakerConfig::default(),
            ttl_policy: TtlPolicy::default(),
            cost_per_call: 0.002,
            analytics_rollup_interval: Duration::from_secs(60),
            // daily
            maintenance_interval: Duration::from_secs(24 * 3600),
            maintenance_batch_size: 500,
            maintenance_batch_pause: Duration::from_millis(10),
            prune_rules: PruneRules::default(),
            coalesce_wait: Duration::from_secs(2),
            degraded_latency_threshold_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for engine configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.admission_threshold) {
            return Err("admission_threshold must be between 0.0 and 1.0".to_string());
        }

        if self.lookup_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err("storage timeouts must be greater than 0".to_string());
        }

        if self.breaker.failure_threshold == 0 {
            return Err("breaker failure_threshold must be greater than 0".to_string());
        }

        if self.cost_per_call < 0.0 {
            return Err("cost_per_call must not be negative".to_string());
        }

        if self.maintenance_batch_size == 0 {
            return Err("maintenance_batch_size must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.prune_rules.min_quality) {
            return Err("prune min_quality must be between 0.0 and 1.0".to_string());
        }

        self.ttl_policy.validate()
    }

    /// Load configuration from `RESPONSE_CACHE_*` environment variables,
    /// reading a `.env` file first if one exists. Unset variables keep
    /// their defaults.
    ///
    /// Durations are given in milliseconds (`*_MS`) or seconds (`*_SECS`).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();

        if let Some(v) = env_parse::<f64>("ADMISSION_THRESHOLD")? {
            builder = builder.admission_threshold(v);
        }
        if let Some(v) = env_parse::<u64>("LOOKUP_TIMEOUT_MS")? {
            builder = builder.lookup_timeout(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u64>("WRITE_TIMEOUT_MS")? {
            builder = builder.write_timeout(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u32>("BREAKER_FAILURE_THRESHOLD")? {
            builder = builder.breaker_failure_threshold(v);
        }
        if let Some(v) = env_parse::<u64>("BREAKER_COOLDOWN_SECS")? {
            builder = builder.breaker_cooldown(Duration::from_secs(v));
        }
        if let Some(v) = env_parse::<f64>("COST_PER_CALL")? {
            builder = builder.cost_per_call(v);
        }
        if let Some(v) = env_parse::<f64>("TTL_JITTER")? {
            builder = builder.ttl_jitter(v);
        }
        if let Some(v) = env_parse::<u64>("MAINTENANCE_INTERVAL_SECS")? {
            builder = builder.maintenance_interval(Duration::from_secs(v));
        }
        if let Some(v) = env_parse::<usize>("MAINTENANCE_BATCH_SIZE")? {
            builder = builder.maintenance_batch_size(v);
        }

        let config = builder.build();
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    let var = format!("{}{}", ENV_PREFIX, name);
    match std::env::var(&var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CacheError::ConfigError(format!("{} has an invalid value: {}", var, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for engine configuration
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    admission_threshold: Option<f64>,
    lookup_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    breaker_failure_threshold: Option<u32>,
    breaker_cooldown: Option<Duration>,
    ttl_policy: Option<TtlPolicy>,
    ttl_overrides: Vec<(ResponseCategory, Option<Duration>)>,
    ttl_jitter: Option<f64>,
    cost_per_call: Option<f64>,
    analytics_rollup_interval: Option<Duration>,
    maintenance_interval: Option<Duration>,
    maintenance_batch_size: Option<usize>,
    maintenance_batch_pause: Option<Duration>,
    prune_rules: Option<PruneRules>,
    coalesce_wait: Option<Duration>,
    degraded_latency_threshold_ms: Option<u64>,
}

impl EngineConfigBuilder {
    pub fn admission_threshold(mut self, threshold: f64) -> Self {
        self.admission_threshold = Some(threshold);
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = Some(threshold);
        self
    }

    pub fn breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = Some(cooldown);
        self
    }

    /// Replace the whole TTL table
    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = Some(policy);
        self
    }

    /// Override the TTL of a single category
    pub fn ttl_override(mut self, category: ResponseCategory, ttl: Option<Duration>) -> Self {
        self.ttl_overrides.push((category, ttl));
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn cost_per_call(mut self, cost: f64) -> Self {
        self.cost_per_call = Some(cost);
        self
    }

    pub fn analytics_rollup_interval(mut self, interval: Duration) -> Self {
        self.analytics_rollup_interval = Some(interval);
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = Some(interval);
        self
    }

    pub fn maintenance_batch_size(mut self, size: usize) -> Self {
        self.maintenance_batch_size = Some(size);
        self
    }

    pub fn maintenance_batch_pause(mut self, pause: Duration) -> Self {
        self.maintenance_batch_pause = Some(pause);
        self
    }

    pub fn prune_rules(mut self, rules: PruneRules) -> Self {
        self.prune_rules = Some(rules);
        self
    }

    pub fn coalesce_wait(mut self, wait: Duration) -> Self {
        self.coalesce_wait = Some(wait);
        self
    }

    pub fn degraded_latency_threshold_ms(mut self, ms: u64) -> Self {
        self.degraded_latency_threshold_ms = Some(ms);
        self
    }

    /// Build the engine configuration
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();

        let mut ttl_policy = self.ttl_policy.unwrap_or(defaults.ttl_policy);
        for (category, ttl) in self.ttl_overrides {
            ttl_policy = ttl_policy.with_override(category, ttl);
        }
        if let Some(jitter) = self.ttl_jitter {
            ttl_policy = ttl_policy.with_jitter(jitter);
        }

        EngineConfig {
            admission_threshold: self.admission_threshold.unwrap_or(defaults.admission_threshold),
            lookup_timeout: self.lookup_timeout.unwrap_or(defaults.lookup_timeout),
            write_timeout: self.write_timeout.unwrap_or(defaults.write_timeout),
            breaker: BreakerConfig {
                failure_threshold: self
                    .breaker_failure_threshold
                    .unwrap_or(defaults.breaker.failure_threshold),
                cooldown: self.breaker_cooldown.unwrap_or(defaults.breaker.cooldown),
            },
            ttl_policy,
            cost_per_call: self.cost_per_call.unwrap_or(defaults.cost_per_call),
            analytics_rollup_interval: self
                .analytics_rollup_interval
                .unwrap_or(defaults.analytics_rollup_interval),
            maintenance_interval: self.maintenance_interval.unwrap_or(defaults.maintenance_interval),
            maintenance_batch_size: self
                .maintenance_batch_size
                .unwrap_or(defaults.maintenance_batch_size),
            maintenance_batch_pause: self
                .maintenance_batch_pause
                .unwrap_or(defaults.maintenance_batch_pause),
            prune_rules: self.prune_rules.unwrap_or(defaults.prune_rules),
            coalesce_wait: self.coalesce_wait.unwrap_or(defaults.coalesce_wait),
            degraded_latency_threshold_ms: self
                .degraded_latency_threshold_ms
                .unwrap_or(defaults.degraded_latency_threshold_ms),
        }
    }
}

/// Preset configurations for common deployments
impl EngineConfig {
    /// Slow or remote storage: wider time budgets, more patient breaker
    pub fn remote_storage() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(80),
            write_timeout: Duration::from_millis(500),
            breaker: BreakerConfig {
                failure_threshold: 8,
                cooldown: Duration::from_secs(30),
            },
            degraded_latency_threshold_ms: 80,
            ..Default::default()
        }
    }

    /// Only very confident answers are cached
    pub fn strict_quality() -> Self {
        Self {
            admission_threshold: 0.85,
            prune_rules: PruneRules {
                min_quality: 0.7,
                ..PruneRules::default()
            },
            ..Default::default()
        }
    }
}
