//! # Ouroboros Response Cache (ouroboros-cache)
//!
//! A multilingual cache for AI-generated answers. Repeated or equivalent
//! questions are answered from storage instead of calling the model again.
//!
//! ## Features
//!
//! - Normalized, language-scoped cache keys (en, ru, es, tr, ar)
//! - Category-driven TTLs and a confidence gate on writes
//! - Circuit breaker so a failing store degrades to misses, never to errors
//! - Hit/miss analytics rolled up hourly, daily, weekly and monthly
//! - Batched background maintenance with dry-run and cancellation
//!
//! ## Lookup / Store
//!
//! ```no_run
//! use ouroboros_cache::{EngineConfig, Language, ResponseCacheEngine, ResponseCategory, StoreRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ResponseCacheEngine::in_memory(EngineConfig::from_env()?)?;
//!
//!     let outcome = engine.lookup("How much is a haircut?", Language::En).await?;
//!     if !outcome.hit {
//!         let answer = "A haircut is $25.";
//!         let request = StoreRequest::new(
//!             "How much is a haircut?",
//!             Language::En,
//!             answer,
//!             0.92,
//!             ResponseCategory::Pricing,
//!         );
//!         engine.store(request).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Background Tasks
//!
//! ```no_run
//! use ouroboros_cache::{EngineConfig, ResponseCacheEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ResponseCacheEngine::in_memory(EngineConfig::default())?;
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let tasks = engine.spawn_background(shutdown_rx);
//!
//!     // ... serve traffic ...
//!
//!     shutdown_tx.send(true)?;
//!     for task in tasks {
//!         task.await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Health
//!
//! ```no_run
//! use ouroboros_cache::{EngineConfig, ResponseCacheEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ResponseCacheEngine::in_memory(EngineConfig::default())?;
//!     let report = engine.health().await;
//!     println!("Status: {:?}, breaker: {}", report.status, report.breaker_state);
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod cache;
pub mod clock;
pub mod engine;
pub mod error;
pub mod maintenance;

// Re-export main types for convenience
pub use analytics::{CacheStatistics, PeriodType, StatisticsRepository};
pub use cache::{
    BreakerState, CacheKey, CacheStore, CachedResponse, EngineConfig, EngineConfigBuilder,
    InvalidationFilter, Language, MemoryStore, ResponseCategory,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use engine::{
    Coalesced, HealthReport, HealthStatus, LookupOutcome, ResponseCacheEngine, StoreOutcome,
    StoreRequest,
};
pub use error::{CacheError, Result};
pub use maintenance::{MaintenanceOptions, MaintenanceReport};
