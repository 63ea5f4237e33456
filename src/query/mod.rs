// Read-only facade over the store for the web layer and the status CLI.
// Requests reaching past retention are truncated to the retained range, never rejected.

pub mod chart;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use crate::clock;
use crate::config::QueryConfig;
use crate::models::{AggregatedPoint, Sample, Series};
use crate::store::{SeriesReader, StoreStats, TimeRange};

pub use chart::{Chart, ChartParseError, Line, Metric, Point, View};

/// Bucket widths `history` picks from, smallest first.
pub const NICE_BUCKETS: [Duration; 9] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(3600),
    Duration::from_secs(3 * 3600),
    Duration::from_secs(6 * 3600),
    Duration::from_secs(12 * 3600),
    Duration::from_secs(24 * 3600),
];

/// Smallest nice bucket that covers `span_ms` in at most `max_points` aligned buckets
/// wherever the span starts. Falls back to the widest bucket.
pub fn choose_bucket(span_ms: u64, max_points: usize) -> Duration {
    let max_points = max_points.max(1) as u64;
    NICE_BUCKETS
        .iter()
        .copied()
        // A span starting late in a bucket touches ceil(span / b) + 1 buckets.
        .find(|b| span_ms.div_ceil(b.as_millis() as u64) < max_points)
        .unwrap_or(NICE_BUCKETS[NICE_BUCKETS.len() - 1])
}

#[derive(Clone)]
pub struct QueryService {
    reader: SeriesReader,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(reader: SeriesReader, config: QueryConfig) -> Self {
        Self { reader, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Window used by the hourly view and by `/api/recent` without `hours`.
    /// Current store retention; follows reloads.
    pub fn retention(&self) -> Duration {
        self.reader.retention()
    }

    pub fn default_recent_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.recent_hours) * 3600)
    }

    fn clamp_window(&self, window: Duration) -> Duration {
        window.min(self.reader.retention())
    }

    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.reader.latest()
    }

    pub fn recent(&self, window: Duration) -> Series {
        self.recent_at(window, clock::now_ms())
    }

    pub fn recent_at(&self, window: Duration, now_ms: u64) -> Series {
        self.reader
            .query_recent_at(self.clamp_window(window), now_ms)
    }

    /// The newest `limit` samples of `window`, in time order.
    pub fn recent_limited(&self, window: Duration, limit: usize) -> Series {
        let mut series = self.recent(window);
        if series.len() > limit {
            series.drain(..series.len() - limit);
        }
        series
    }

    /// Buckets of `bucket_width` over the last `window` (clamped to retention).
    pub fn aggregated(&self, window: Duration, bucket_width: Duration) -> Vec<AggregatedPoint> {
        let now_ms = clock::now_ms();
        self.aggregated_between(TimeRange::last(window, now_ms), bucket_width, now_ms)
    }

    /// Buckets of `bucket_width` over `range`; the start is clamped to `now_ms - retention`.
    pub fn aggregated_between(
        &self,
        range: TimeRange,
        bucket_width: Duration,
        now_ms: u64,
    ) -> Vec<AggregatedPoint> {
        let floor = now_ms.saturating_sub(self.reader.retention().as_millis() as u64);
        let range = TimeRange::new(range.from_ms.max(floor), range.to_ms);
        if range.is_empty() {
            return Vec::new();
        }
        self.reader.query_aggregated(range, bucket_width)
    }

    /// The whole retained span in at most `max_points` buckets of a nice width.
    pub fn history(&self, max_points: usize) -> Vec<AggregatedPoint> {
        self.history_at(max_points, clock::now_ms())
    }

    pub fn history_at(&self, max_points: usize, now_ms: u64) -> Vec<AggregatedPoint> {
        let Some(oldest) = self.reader.oldest() else {
            return Vec::new();
        };
        let retention = self.reader.retention();
        let from = oldest
            .timestamp
            .max(now_ms.saturating_sub(retention.as_millis() as u64));
        let bucket = choose_bucket(now_ms.saturating_sub(from), max_points);
        self.aggregated_between(TimeRange::new(from, now_ms.saturating_add(1)), bucket, now_ms)
    }

    pub fn chart(&self, metric: Metric, view: View) -> Chart {
        self.chart_at(metric, view, clock::now_ms())
    }

    pub fn chart_at(&self, metric: Metric, view: View, now_ms: u64) -> Chart {
        let lines = match view {
            View::Hour => {
                chart::sample_lines(metric, &self.recent_at(self.default_recent_window(), now_ms))
            }
            View::All => {
                chart::bucket_lines(metric, &self.history_at(self.config.max_points, now_ms))
            }
        };
        Chart::new(metric, view, lines)
    }

    pub fn stats(&self) -> StoreStats {
        self.reader.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_bucket_fits_seven_days_in_two_hundred_points() {
        let week_ms = 7 * 24 * 3600 * 1000;
        assert_eq!(choose_bucket(week_ms, 200), Duration::from_secs(3600));
        assert_eq!(choose_bucket(3600 * 1000, 200), Duration::from_secs(60));
        assert_eq!(choose_bucket(week_ms, 1), Duration::from_secs(24 * 3600));
        assert_eq!(choose_bucket(0, 0), Duration::from_secs(60));
    }

    #[test]
    fn choose_bucket_never_exceeds_max_points_for_any_start() {
        let minute = 60_000u64;
        for (span_ms, max_points) in [
            (200 * minute, 200usize),
            (199 * minute, 200),
            (199 * minute + 1, 200),
            (7 * 24 * 60 * minute, 50),
            (90 * minute, 3),
        ] {
            let b = choose_bucket(span_ms, max_points).as_millis() as u64;
            for from in [0, 1, b / 2, b - 1] {
                let touched = (from + span_ms) / b - from / b + 1;
                assert!(
                    touched <= max_points as u64,
                    "span {} from {} in {} ms buckets touches {}",
                    span_ms,
                    from,
                    b,
                    touched
                );
            }
        }
        // One minute short of the limit still fits in minute buckets.
        assert_eq!(choose_bucket(199 * minute, 200), Duration::from_secs(60));
        assert_eq!(choose_bucket(200 * minute, 200), Duration::from_secs(5 * 60));
    }
}
