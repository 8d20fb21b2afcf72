//! Time-bucketed series for charts.

use std::time::Duration;

use tracing::warn;

use crate::models::{Bucket, MetricLabels};
use crate::tracker::Tracker;

pub const AGGREGATE_BY_HOUR: Duration = Duration::from_secs(3600);
pub const AGGREGATE_BY_DAY: Duration = Duration::from_secs(3600 * 24);
pub const AGGREGATE_BY_WEEK: Duration = Duration::from_secs(3600 * 24 * 7);
pub const AGGREGATE_BY_MONTH: Duration = Duration::from_secs(3600 * 24 * 31);

/// Bucket width for a histogram over `[start, end)`:
///
///   - up to 3 days: 1 hour
///   - up to 31 days: 1 day
///   - up to 93 days: 1 week
///   - longer: 31 days
pub fn select_bucket_width(start: i64, end: i64) -> Duration {
    let hours = start.abs_diff(end) as f64 / 3600.0;

    if hours <= 24.0 * 3.0 {
        AGGREGATE_BY_HOUR
    } else if hours <= 24.0 * 31.0 {
        AGGREGATE_BY_DAY
    } else if hours <= 24.0 * 31.0 * 3.0 {
        AGGREGATE_BY_WEEK
    } else {
        AGGREGATE_BY_MONTH
    }
}

/// Consecutive `(bucket_start, bucket_start + width)` pairs starting at
/// `start`. The last bucket may reach past `end`.
pub fn split(width: Duration, start: i64, end: i64) -> Vec<(i64, i64)> {
    let step = width.as_secs().max(1) as i64;
    let mut splits = Vec::new();

    let mut from = start;
    while from < end {
        splits.push((from, from + step));
        from += step;
    }

    splits
}

impl Tracker {
    /// Occurrences of `metric` per bucket. A bucket whose count fails is
    /// reported as zero.
    pub fn count_histogram(&self, metric: &str, start: i64, end: i64) -> Vec<Bucket> {
        split(select_bucket_width(start, end), start, end)
            .into_iter()
            .map(|(from, to)| {
                let count = self.count(metric, from, to).unwrap_or_else(|e| {
                    warn!("Failed to count {} in [{}, {}): {}", metric, from, to, e);
                    0
                });
                (from, count as i64)
            })
            .collect()
    }

    /// Distinct visitors per bucket, each bucket counted on its own so a
    /// visitor active in several buckets is counted in each of them.
    pub fn visitors_histogram(
        &self,
        metric: &str,
        filters: &MetricLabels,
        start: i64,
        end: i64,
    ) -> Vec<Bucket> {
        split(select_bucket_width(start, end), start, end)
            .into_iter()
            .map(|(from, to)| {
                let count = self
                    .count_visitors(metric, filters, from, to)
                    .unwrap_or_else(|e| {
                        warn!("Failed to count visitors in [{}, {}): {}", from, to, e);
                        0
                    });
                (from, count as i64)
            })
            .collect()
    }
}
