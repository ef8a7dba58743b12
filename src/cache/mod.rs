//! # Response Cache Core
//!
//! The building blocks of the response cache: how a query becomes a key,
//! how long an answer lives, which answers are worth keeping and where they
//! are kept.
//!
//! ## Features
//!
//! - **Locale-Aware Normalization**: whitespace, casing and punctuation folded per language
//! - **Deterministic Keys**: `"<language>:<sha256 hex>"`, so languages never collide
//! - **Category TTLs**: greetings never expire, availability lasts an hour
//! - **Confidence Gate**: only answers at or above the threshold are cached
//! - **Degradation Guard**: failing storage is bypassed instead of slowing requests
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{CacheKeyBuilder, Language, QueryNormalizer};
//!
//! let normalizer = QueryNormalizer::new();
//! let keys = CacheKeyBuilder::new();
//!
//! let a = keys.build(Language::En, &normalizer.normalize("What are your  HOURS?", Language::En));
//! let b = keys.build(Language::En, &normalizer.normalize("what are your hours", Language::En));
//! assert_eq!(a, b);
//! ```

pub mod config;
pub mod entry;
pub mod gate;
pub mod guard;
pub mod inflight;
pub mod invalidation;
pub mod key;
pub mod normalizer;
pub mod store;
pub mod ttl;
pub mod types;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use entry::CachedResponse;
pub use gate::{ConfidenceGate, DEFAULT_ADMISSION_THRESHOLD};
pub use guard::{Admission, BreakerConfig, BreakerSnapshot, BreakerState, DegradationGuard};
pub use inflight::{InflightGuard, InflightRegistry};
pub use invalidation::{InvalidationFilter, InvalidationReason, PruneRules};
pub use key::CacheKeyBuilder;
pub use normalizer::QueryNormalizer;
pub use store::{CacheStore, MemoryStore, PutOutcome, ScanPage};
pub use ttl::TtlPolicy;
pub use types::{CacheKey, Language, ResponseCategory};
