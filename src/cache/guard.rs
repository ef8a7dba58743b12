//! Degradation guard (circuit breaker) in front of the cache store
//!
//! Three states:
//! - Closed: storage is called normally
//! - Open: storage is bypassed, lookups miss and writes are dropped
//! - HalfOpen: one probe operation decides between Closed and Open
//!
//! All state lives in atomics so request handlers never queue on a lock.

use crate::clock::SharedClock;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// State of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Permission to call storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, normal call
    Allowed,
    /// The single half-open trial call
    Probe,
    /// Storage bypassed
    Rejected,
}

/// Serializable view of the guard, suitable for publishing to other instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Remaining open time in ms, if currently open
    pub open_remaining_ms: Option<u64>,
    pub total_failures: u64,
    pub rejected_calls: u64,
}

/// Failure-counting circuit breaker
#[derive(Debug)]
pub struct DegradationGuard {
    config: BreakerConfig,
    clock: SharedClock,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicI64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
}

impl DegradationGuard {
    pub fn new(config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            state: AtomicU8::new(BreakerState::Closed.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> BreakerState {
        BreakerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn cooldown_elapsed(&self) -> bool {
        let opened = self.opened_at_ms.load(Ordering::Acquire);
        self.now_ms().saturating_sub(opened) >= self.config.cooldown.as_millis() as i64
    }

    fn transition(&self, from: BreakerState, to: BreakerState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ask whether a storage call may proceed
    pub fn admit(&self) -> Admission {
        match self.state() {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                // exactly one caller wins the Open -> HalfOpen race
                if self.cooldown_elapsed() && self.transition(BreakerState::Open, BreakerState::HalfOpen) {
                    info!("Degradation guard half-open, probing storage");
                    Admission::Probe
                } else {
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                Admission::Rejected
            }
        }
    }

    /// Report a successful storage call
    pub fn record_success(&self, admission: Admission) {
        self.consecutive_failures.store(0, Ordering::Release);
        if admission == Admission::Probe && self.transition(BreakerState::HalfOpen, BreakerState::Closed) {
            info!("Degradation guard closed, storage recovered");
        }
    }

    /// Report a failed storage call
    pub fn record_failure(&self, admission: Admission) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        if admission == Admission::Probe {
            self.opened_at_ms.store(self.now_ms(), Ordering::Release);
            if self.transition(BreakerState::HalfOpen, BreakerState::Open) {
                warn!("Degradation guard probe failed, reopening for {:?}", self.config.cooldown);
            }
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        // late failures from calls admitted while closed leave the open time
        // alone; the stamp lands before Open is published
        if failures >= self.config.failure_threshold && self.state() == BreakerState::Closed {
            self.opened_at_ms.store(self.now_ms(), Ordering::Release);
            if self.transition(BreakerState::Closed, BreakerState::Open) {
                warn!(
                    "Degradation guard opened after {} consecutive storage failures",
                    failures
                );
            }
        }
    }

    /// Run a storage operation under the guard with a time budget.
    ///
    /// Returns `CircuitOpen` without polling `op` when the guard rejects the
    /// call. Storage errors and timeouts are counted as failures.
    pub async fn execute<T, F>(&self, context: &str, timeout: Duration, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let admission = self.admit();
        if admission == Admission::Rejected {
            debug!("Storage bypassed ({}), guard is {}", context, self.state());
            return Err(CacheError::CircuitOpen);
        }

        let result = match tokio::time::timeout(timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::TimeoutError {
                timeout_ms: timeout.as_millis() as u64,
                context: context.to_string(),
            }),
        };

        match &result {
            Ok(_) => self.record_success(admission),
            Err(e) if e.is_storage_failure() => {
                warn!("Storage failure during {}: {}", context, e);
                self.record_failure(admission);
            }
            // non-storage errors say nothing about storage health
            Err(_) => self.record_success(admission),
        }

        result
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state();
        let open_remaining_ms = if state == BreakerState::Open {
            let opened = self.opened_at_ms.load(Ordering::Acquire);
            let until = opened + self.config.cooldown.as_millis() as i64;
            let remaining = until - self.now_ms();
            (remaining > 0).then_some(remaining as u64)
        } else {
            None
        };

        BreakerSnapshot {
            state,
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            failure_threshold: self.config.failure_threshold,
            cooldown_ms: self.config.cooldown.as_millis() as u64,
            open_remaining_ms,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }
}
