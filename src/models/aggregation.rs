// Aggregated point: one per time bucket, built on demand from raw samples.
// Scalars carry mean/min/max over the samples that had the field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Stat {
    /// None when no value is present.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskAggregate {
    pub path: String,
    pub used: Option<Stat>,
    /// Last known filesystem size in the bucket.
    pub total: Option<u64>,
    pub usage_percent: Option<Stat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceAggregate {
    pub name: String,
    pub rx_bytes_per_sec: Option<Stat>,
    pub tx_bytes_per_sec: Option<Stat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAggregate {
    pub name: String,
    pub read_bytes_per_sec: Option<Stat>,
    pub write_bytes_per_sec: Option<Stat>,
}

/// One aggregated bucket: start time (aligned to the epoch), width, and per-field stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPoint {
    pub bucket_start: u64,
    pub bucket_secs: u64,
    pub sample_count: u32,
    pub cpu_usage: Option<Stat>,
    pub cpu_temp: Option<Stat>,
    pub memory_used: Option<Stat>,
    pub memory_total: Option<u64>,
    pub memory_usage_percent: Option<Stat>,
    pub disks: Vec<DiskAggregate>,
    pub network: Vec<InterfaceAggregate>,
    pub disk_io: Vec<DeviceAggregate>,
}
