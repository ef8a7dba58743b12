//! Background upkeep of the response cache
//!
//! A sweep walks the store in bounded batches and removes entries that are
//! expired, rarely served and old, or below the quality floor. Each entry is
//! marked inactive before it is purged, so an interrupted sweep leaves only
//! tombstones that the next sweep reaps.

pub mod scheduler;

pub use scheduler::{MaintenanceOptions, MaintenanceReport, MaintenanceScheduler};
