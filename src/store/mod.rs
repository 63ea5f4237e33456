// In-memory rolling series with a fixed retention window.
//
// One SeriesWriter (the sampler) appends; any number of SeriesReader clones query.
// Samples are immutable and shared as Arc, so a query copies pointers under the
// read lock and everything after that (filtering, aggregation, serialization)
// runs without holding it. Eviction drops the store's reference only; a result
// already handed to a reader keeps its samples alive.

pub mod aggregation;

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;

use crate::clock;
use crate::models::{AggregatedPoint, Sample, Series};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("sample at {got} ms is not newer than the latest stored sample at {latest} ms")]
    OutOfOrder { latest: u64, got: u64 },
}

/// Half-open time range `[from_ms, to_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ms: u64,
    pub to_ms: u64,
}

impl TimeRange {
    pub fn new(from_ms: u64, to_ms: u64) -> Self {
        Self { from_ms, to_ms }
    }

    /// The `window` ending at `now_ms` (inclusive of now).
    pub fn last(window: Duration, now_ms: u64) -> Self {
        Self {
            from_ms: now_ms.saturating_sub(window.as_millis() as u64),
            to_ms: now_ms.saturating_add(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from_ms >= self.to_ms
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub len: usize,
    pub oldest: Option<u64>,
    pub newest: Option<u64>,
    pub retention_secs: u64,
    pub appended_total: u64,
    pub evicted_total: u64,
    pub rejected_total: u64,
}

pub struct TimeSeriesStore {
    samples: RwLock<VecDeque<Arc<Sample>>>,
    retention_ms: AtomicU64,
    appended_total: AtomicU64,
    evicted_total: AtomicU64,
    rejected_total: AtomicU64,
}

impl TimeSeriesStore {
    /// Creates an empty store and returns its only writer. Readers come from `SeriesWriter::reader`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(retention: Duration) -> SeriesWriter {
        let store = Self {
            samples: RwLock::new(VecDeque::new()),
            retention_ms: AtomicU64::new(retention.as_millis() as u64),
            appended_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
        };
        SeriesWriter {
            store: Arc::new(store),
        }
    }

    // A panic in another holder must not stop sampling or queries; the deque is
    // never left half-modified (push/pop are single operations).
    fn read_guard(&self) -> RwLockReadGuard<'_, VecDeque<Arc<Sample>>> {
        self.samples.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, VecDeque<Arc<Sample>>> {
        self.samples.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `sample` and evicts from the oldest end every sample older than
    /// `sample.timestamp - retention`. Returns the number of evicted samples.
    fn append(&self, sample: Sample) -> Result<usize, StoreError> {
        let sample = Arc::new(sample);
        let cutoff = sample
            .timestamp
            .saturating_sub(self.retention_ms.load(Ordering::Relaxed));
        let mut evicted = Vec::new();
        {
            let mut guard = self.write_guard();
            if let Some(latest) = guard.back()
                && sample.timestamp <= latest.timestamp
            {
                self.rejected_total.fetch_add(1, Ordering::Relaxed);
                return Err(StoreError::OutOfOrder {
                    latest: latest.timestamp,
                    got: sample.timestamp,
                });
            }
            guard.push_back(sample);
            while guard.front().is_some_and(|s| s.timestamp < cutoff) {
                if let Some(old) = guard.pop_front() {
                    evicted.push(old);
                }
            }
        }
        // Evicted samples are freed here, outside the lock.
        let n = evicted.len();
        self.appended_total.fetch_add(1, Ordering::Relaxed);
        self.evicted_total.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn set_retention(&self, retention: Duration) {
        self.retention_ms
            .store(retention.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.read_guard().back().cloned()
    }

    pub fn oldest(&self) -> Option<Arc<Sample>> {
        self.read_guard().front().cloned()
    }

    /// All samples with `timestamp >= from_ms`, in time order.
    pub fn query_since(&self, from_ms: u64) -> Series {
        let guard = self.read_guard();
        let start = guard.partition_point(|s| s.timestamp < from_ms);
        guard.range(start..).cloned().collect()
    }

    /// All samples in `range`, in time order.
    pub fn query_range(&self, range: TimeRange) -> Series {
        if range.is_empty() {
            return Vec::new();
        }
        let guard = self.read_guard();
        let start = guard.partition_point(|s| s.timestamp < range.from_ms);
        let end = guard.partition_point(|s| s.timestamp < range.to_ms);
        guard.range(start..end).cloned().collect()
    }

    /// Samples taken within `window` of the wall clock.
    pub fn query_recent(&self, window: Duration) -> Series {
        self.query_recent_at(window, clock::now_ms())
    }

    /// Samples with `timestamp >= now_ms - window`.
    pub fn query_recent_at(&self, window: Duration, now_ms: u64) -> Series {
        self.query_since(now_ms.saturating_sub(window.as_millis() as u64))
    }

    /// Samples strictly newer than `watermark_ms` (checkpoint delta).
    pub fn samples_after(&self, watermark_ms: u64) -> Series {
        self.query_since(watermark_ms.saturating_add(1))
    }

    /// One point per non-empty bucket of `bucket_width`. Buckets are aligned to the
    /// epoch and `range.from_ms` is widened down to its bucket start, so repeated
    /// queries over a sliding window report identical buckets. Buckets without
    /// samples produce no point.
    pub fn query_aggregated(&self, range: TimeRange, bucket_width: Duration) -> Vec<AggregatedPoint> {
        let width_ms = aggregation::clamp_width_ms(bucket_width);
        let aligned = TimeRange::new(
            aggregation::bucket_start(range.from_ms, width_ms),
            range.to_ms,
        );
        let series = self.query_range(aligned);
        aggregation::aggregate_buckets(&series, width_ms)
    }

    pub fn stats(&self) -> StoreStats {
        let (len, oldest, newest) = {
            let guard = self.read_guard();
            (
                guard.len(),
                guard.front().map(|s| s.timestamp),
                guard.back().map(|s| s.timestamp),
            )
        };
        StoreStats {
            len,
            oldest,
            newest,
            retention_secs: self.retention().as_secs(),
            appended_total: self.appended_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
        }
    }
}

/// The single append handle. Not Clone: the sampler owns it.
pub struct SeriesWriter {
    store: Arc<TimeSeriesStore>,
}

impl SeriesWriter {
    pub fn append(&self, sample: Sample) -> Result<usize, StoreError> {
        self.store.append(sample)
    }

    /// Applies from the next append on; never truncates eagerly.
    pub fn set_retention(&self, retention: Duration) {
        self.store.set_retention(retention);
    }

    /// Reloads persisted samples (ascending by time). Samples already past retention
    /// relative to `now_ms`, or stamped in the future, are discarded. Returns the number kept.
    pub fn restore<I: IntoIterator<Item = Sample>>(&self, samples: I, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.store.retention_ms.load(Ordering::Relaxed));
        let mut kept = 0usize;
        let mut skipped = 0usize;
        for sample in samples {
            if sample.timestamp < cutoff || sample.timestamp > now_ms {
                skipped += 1;
                continue;
            }
            match self.store.append(sample) {
                Ok(_) => kept += 1,
                Err(e) => {
                    tracing::debug!(error = %e, operation = "restore", "skipping persisted sample");
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::info!(restored = kept, skipped, "restore discarded samples");
        }
        kept
    }

    pub fn reader(&self) -> SeriesReader {
        SeriesReader {
            store: self.store.clone(),
        }
    }
}

impl Deref for SeriesWriter {
    type Target = TimeSeriesStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Read-only handle; cheap to clone.
#[derive(Clone)]
pub struct SeriesReader {
    store: Arc<TimeSeriesStore>,
}

impl Deref for SeriesReader {
    type Target = TimeSeriesStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
