//! Append-only storage for closed statistics periods

use crate::analytics::types::{PeriodType, StatisticsRow};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Storage for statistics rows. Rows are never updated once appended.
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// Append a row; `false` if a row for the same period already exists
    async fn append(&self, row: StatisticsRow) -> Result<bool>;

    /// Rows of `period_type` whose `period_start` lies in `[start, end)`
    async fn query(
        &self,
        period_type: PeriodType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatisticsRow>>;
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryStatisticsRepository {
    rows: RwLock<Vec<StatisticsRow>>,
}

impl MemoryStatisticsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl StatisticsRepository for MemoryStatisticsRepository {
    async fn append(&self, row: StatisticsRow) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let duplicate = rows
            .iter()
            .any(|r| r.period_type == row.period_type && r.period_start == row.period_start);
        if duplicate {
            return Ok(false);
        }
        rows.push(row);
        Ok(true)
    }

    async fn query(
        &self,
        period_type: PeriodType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatisticsRow>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<StatisticsRow> = rows
            .iter()
            .filter(|r| r.period_type == period_type.as_str())
            .filter(|r| r.period_start >= start && r.period_start < end)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.period_start);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(period_type: PeriodType, hour: u32) -> StatisticsRow {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
        StatisticsRow {
            period_start: start,
            period_end: start + chrono::Duration::hours(1),
            period_type: period_type.as_str().to_string(),
            total_requests: 1,
            cache_hits: 1,
            hit_rate: 100.0,
            cost_savings: 0.002,
            avg_latency_ms: 1.0,
            language_metrics_json: "{}".to_string(),
            category_metrics_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_only() {
        let repo = MemoryStatisticsRepository::new();
        assert!(repo.append(row(PeriodType::Hourly, 1)).await.unwrap());
        assert!(!repo.append(row(PeriodType::Hourly, 1)).await.unwrap());
        // same start, different period type is a different row
        assert!(repo.append(row(PeriodType::Daily, 1)).await.unwrap());
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_query_range() {
        let repo = MemoryStatisticsRepository::new();
        for hour in [3, 1, 2, 5] {
            repo.append(row(PeriodType::Hourly, hour)).await.unwrap();
        }

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
        let rows = repo.query(PeriodType::Hourly, start, end).await.unwrap();

        let hours: Vec<_> = rows.iter().map(|r| r.period_start).collect();
        assert_eq!(hours.len(), 3);
        assert!(hours.windows(2).all(|w| w[0] < w[1]));
        assert!(repo.query(PeriodType::Daily, start, end).await.unwrap().is_empty());
    }
}
