//! Analytics event and statistics types

use crate::cache::types::{Language, ResponseCategory};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One lookup outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEvent {
    pub hit: bool,
    pub language: Language,
    pub category: ResponseCategory,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
}

/// Width of a statistics bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 4] = [
        PeriodType::Hourly,
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hourly" => Some(PeriodType::Hourly),
            "daily" => Some(PeriodType::Daily),
            "weekly" => Some(PeriodType::Weekly),
            "monthly" => Some(PeriodType::Monthly),
            _ => None,
        }
    }

    /// `[start, end)` of the period containing `ts`. Weeks start on Monday,
    /// all boundaries are UTC.
    pub fn bounds(&self, ts: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = ts.date_naive();
        match self {
            PeriodType::Hourly => {
                let hour = NaiveTime::from_hms_opt(ts.hour(), 0, 0).unwrap_or_default();
                let start = Utc.from_utc_datetime(&date.and_time(hour));
                (start, start + chrono::Duration::hours(1))
            }
            PeriodType::Daily => {
                let start = midnight(date);
                (start, start + chrono::Duration::days(1))
            }
            PeriodType::Weekly => {
                let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
                let start = midnight(monday);
                (start, start + chrono::Duration::weeks(1))
            }
            PeriodType::Monthly => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                let next = NaiveDate::from_ymd_opt(year, month, 1)
                    .unwrap_or(first + chrono::Duration::days(31));
                (midnight(first), midnight(next))
            }
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension request breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMetrics {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
}

impl DimensionMetrics {
    pub(crate) fn record(&mut self, hit: bool) {
        self.requests += 1;
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

/// Aggregated statistics for one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: PeriodType,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage, 0-100
    pub hit_rate: f64,
    pub estimated_cost_savings: f64,
    pub avg_latency_ms: f64,
    pub language_metrics: BTreeMap<Language, DimensionMetrics>,
    pub category_metrics: BTreeMap<ResponseCategory, DimensionMetrics>,
    /// False while the period is still accumulating events
    pub is_closed: bool,
}

/// Hit rate as a percentage
pub fn hit_rate(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (hits as f64 * 100.0) / total as f64
    }
}

impl CacheStatistics {
    /// Persisted row form
    pub fn to_row(&self) -> Result<StatisticsRow> {
        Ok(StatisticsRow {
            period_start: self.period_start,
            period_end: self.period_end,
            period_type: self.period_type.as_str().to_string(),
            total_requests: self.total_requests,
            cache_hits: self.cache_hits,
            hit_rate: self.hit_rate,
            cost_savings: self.estimated_cost_savings,
            avg_latency_ms: self.avg_latency_ms,
            language_metrics_json: serde_json::to_string(&self.language_metrics)?,
            category_metrics_json: serde_json::to_string(&self.category_metrics)?,
        })
    }

    pub fn from_row(row: &StatisticsRow) -> Result<Self> {
        let period_type = PeriodType::parse(&row.period_type).ok_or_else(|| {
            CacheError::SerializationError(format!("unknown period type: {}", row.period_type))
        })?;

        Ok(Self {
            period_start: row.period_start,
            period_end: row.period_end,
            period_type,
            total_requests: row.total_requests,
            cache_hits: row.cache_hits,
            cache_misses: row.total_requests.saturating_sub(row.cache_hits),
            hit_rate: row.hit_rate,
            estimated_cost_savings: row.cost_savings,
            avg_latency_ms: row.avg_latency_ms,
            language_metrics: serde_json::from_str(&row.language_metrics_json)?,
            category_metrics: serde_json::from_str(&row.category_metrics_json)?,
            is_closed: true,
        })
    }
}

impl fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStatistics {{ {} {}, requests: {}, hits: {}, hit_rate: {:.2}%, savings: {:.4} }}",
            self.period_type,
            self.period_start.to_rfc3339(),
            self.total_requests,
            self.cache_hits,
            self.hit_rate,
            self.estimated_cost_savings
        )
    }
}

/// Append-only persisted statistics row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: String,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub hit_rate: f64,
    pub cost_savings: f64,
    pub avg_latency_ms: f64,
    pub language_metrics_json: String,
    pub category_metrics_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_hourly_bounds() {
        let (start, end) = PeriodType::Hourly.bounds(ts(2024, 5, 10, 14, 37));
        assert_eq!(start, ts(2024, 5, 10, 14, 0));
        assert_eq!(end, ts(2024, 5, 10, 15, 0));
    }

    #[test]
    fn test_daily_bounds() {
        let (start, end) = PeriodType::Daily.bounds(ts(2024, 5, 10, 23, 59));
        assert_eq!(start, ts(2024, 5, 10, 0, 0));
        assert_eq!(end, ts(2024, 5, 11, 0, 0));
    }

    #[test]
    fn test_weekly_bounds_start_monday() {
        // 2024-05-12 is a Sunday
        let (start, end) = PeriodType::Weekly.bounds(ts(2024, 5, 12, 8, 0));
        assert_eq!(start, ts(2024, 5, 6, 0, 0));
        assert_eq!(end, ts(2024, 5, 13, 0, 0));
    }

    #[test]
    fn test_monthly_bounds_year_rollover() {
        let (start, end) = PeriodType::Monthly.bounds(ts(2024, 12, 31, 23, 0));
        assert_eq!(start, ts(2024, 12, 1, 0, 0));
        assert_eq!(end, ts(2025, 1, 1, 0, 0));
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(9, 10), 90.0);
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(1, 3), 100.0 / 3.0);
    }

    #[test]
    fn test_row_conversion() {
        let mut language_metrics = BTreeMap::new();
        language_metrics.insert(Language::En, DimensionMetrics { requests: 4, hits: 3, misses: 1 });

        let stats = CacheStatistics {
            period_start: ts(2024, 1, 1, 0, 0),
            period_end: ts(2024, 1, 2, 0, 0),
            period_type: PeriodType::Daily,
            total_requests: 4,
            cache_hits: 3,
            cache_misses: 1,
            hit_rate: 75.0,
            estimated_cost_savings: 0.006,
            avg_latency_ms: 2.5,
            language_metrics,
            category_metrics: BTreeMap::new(),
            is_closed: true,
        };

        let row = stats.to_row().unwrap();
        assert_eq!(row.period_type, "daily");
        assert_eq!(row.language_metrics_json, r#"{"en":{"requests":4,"hits":3,"misses":1}}"#);

        let back = CacheStatistics::from_row(&row).unwrap();
        assert_eq!(back.cache_misses, 1);
        assert_eq!(back.language_metrics[&Language::En].hits, 3);
    }
}
