// Bucket aggregation: pure functions over time-ordered samples.
// Scalars get mean/min/max of the values present; named series (mounts, interfaces,
// devices) are grouped by name and aggregated the same way.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::{
    AggregatedPoint, DeviceAggregate, DiskAggregate, InterfaceAggregate, Sample, Stat,
};

/// Smallest accepted bucket width.
pub const MIN_BUCKET_MS: u64 = 1_000;

pub fn clamp_width_ms(width: Duration) -> u64 {
    (width.as_millis() as u64).max(MIN_BUCKET_MS)
}

fn as_sample<S: Borrow<Sample>>(s: &S) -> &Sample {
    s.borrow()
}

/// Start of the epoch-aligned bucket containing `ts_ms`.
pub fn bucket_start(ts_ms: u64, width_ms: u64) -> u64 {
    if width_ms == 0 {
        return ts_ms;
    }
    ts_ms - ts_ms % width_ms
}

/// Groups consecutive samples by bucket and aggregates each group. Input must be time-ordered.
pub fn aggregate_buckets<S: Borrow<Sample>>(samples: &[S], width_ms: u64) -> Vec<AggregatedPoint> {
    let width_ms = width_ms.max(MIN_BUCKET_MS);
    let mut out = Vec::new();
    let mut start_idx = 0;
    while start_idx < samples.len() {
        let bucket = bucket_start(as_sample(&samples[start_idx]).timestamp, width_ms);
        let len = samples[start_idx..]
            .iter()
            .take_while(|s| bucket_start(as_sample(*s).timestamp, width_ms) == bucket)
            .count();
        let end_idx = start_idx + len;
        if let Some(point) = aggregate_samples(&samples[start_idx..end_idx], bucket, width_ms / 1000)
        {
            out.push(point);
        }
        start_idx = end_idx;
    }
    out
}

/// Aggregates one bucket of samples. None for an empty bucket.
pub fn aggregate_samples<S: Borrow<Sample>>(
    samples: &[S],
    bucket_start_ts: u64,
    bucket_secs: u64,
) -> Option<AggregatedPoint> {
    if samples.is_empty() {
        return None;
    }
    let iter = || samples.iter().map(as_sample);

    let cpu_usage = Stat::from_values(iter().filter_map(|s| s.cpu_usage));
    let cpu_temp = Stat::from_values(iter().filter_map(|s| s.cpu_temp));
    let memory_used = Stat::from_values(iter().filter_map(|s| s.memory_used.map(|v| v as f64)));
    let memory_total = iter().filter_map(|s| s.memory_total).next_back();
    let memory_usage_percent = Stat::from_values(iter().filter_map(Sample::memory_usage_percent));

    Some(AggregatedPoint {
        bucket_start: bucket_start_ts,
        bucket_secs,
        sample_count: samples.len().min(u32::MAX as usize) as u32,
        cpu_usage,
        cpu_temp,
        memory_used,
        memory_total,
        memory_usage_percent,
        disks: aggregate_disks(iter()),
        network: aggregate_interfaces(iter()),
        disk_io: aggregate_devices(iter()),
    })
}

fn aggregate_disks<'a>(samples: impl Iterator<Item = &'a Sample>) -> Vec<DiskAggregate> {
    #[derive(Default)]
    struct Acc {
        used: Vec<f64>,
        percent: Vec<f64>,
        total: Option<u64>,
    }
    let mut by_path: BTreeMap<&str, Acc> = BTreeMap::new();
    for s in samples {
        for d in &s.disks {
            let acc = by_path.entry(d.path.as_str()).or_default();
            if let Some(used) = d.used {
                acc.used.push(used as f64);
            }
            if let Some(p) = d.percent() {
                acc.percent.push(p);
            }
            if d.total.is_some() {
                acc.total = d.total;
            }
        }
    }
    by_path
        .into_iter()
        .map(|(path, acc)| DiskAggregate {
            path: path.to_string(),
            used: Stat::from_values(acc.used),
            total: acc.total,
            usage_percent: Stat::from_values(acc.percent),
        })
        .collect()
}

fn aggregate_interfaces<'a>(samples: impl Iterator<Item = &'a Sample>) -> Vec<InterfaceAggregate> {
    let mut by_name: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for s in samples {
        for i in &s.network {
            let (rx, tx) = by_name.entry(i.name.as_str()).or_default();
            rx.extend(i.rx_bytes_per_sec);
            tx.extend(i.tx_bytes_per_sec);
        }
    }
    by_name
        .into_iter()
        .map(|(name, (rx, tx))| InterfaceAggregate {
            name: name.to_string(),
            rx_bytes_per_sec: Stat::from_values(rx),
            tx_bytes_per_sec: Stat::from_values(tx),
        })
        .collect()
}

fn aggregate_devices<'a>(samples: impl Iterator<Item = &'a Sample>) -> Vec<DeviceAggregate> {
    let mut by_name: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for s in samples {
        for d in &s.disk_io {
            let (read, write) = by_name.entry(d.name.as_str()).or_default();
            read.extend(d.read_bytes_per_sec);
            write.extend(d.write_bytes_per_sec);
        }
    }
    by_name
        .into_iter()
        .map(|(name, (read, write))| DeviceAggregate {
            name: name.to_string(),
            read_bytes_per_sec: Stat::from_values(read),
            write_bytes_per_sec: Stat::from_values(write),
        })
        .collect()
}
