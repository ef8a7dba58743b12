//! # Cache Analytics
//!
//! Every lookup produces a [`LookupEvent`]. Events are buffered without
//! blocking the request path and rolled up into hourly, daily, weekly and
//! monthly [`CacheStatistics`]. Closed periods are appended to a
//! [`StatisticsRepository`] and never rewritten.

pub mod recorder;
pub mod repository;
pub mod types;

pub use recorder::AnalyticsRecorder;
pub use repository::{MemoryStatisticsRepository, StatisticsRepository};
pub use types::{hit_rate, CacheStatistics, DimensionMetrics, LookupEvent, PeriodType, StatisticsRow};
