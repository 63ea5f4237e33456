// Shared test helpers

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use pimonitor::models::*;
use pimonitor::reader::Reader;

pub const MINUTE_MS: u64 = 60_000;
pub const HOUR_MS: u64 = 3_600_000;
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// A sample with every field present.
pub fn sample(timestamp: u64) -> Sample {
    Sample {
        timestamp,
        cpu_usage: Some(10.0),
        cpu_temp: Some(45.0),
        memory_used: Some(512),
        memory_total: Some(1024),
        disks: vec![DiskUsage {
            path: "/".into(),
            used: Some(250),
            total: Some(1000),
        }],
        network: vec![InterfaceSample {
            name: "eth0".into(),
            rx_bytes_total: Some(1_000),
            tx_bytes_total: Some(2_000),
            rx_bytes_per_sec: Some(1_048_576.0),
            tx_bytes_per_sec: Some(2_097_152.0),
        }],
        disk_io: vec![DeviceSample {
            name: "sda".into(),
            read_bytes_total: Some(4_096),
            written_bytes_total: Some(8_192),
            read_bytes_per_sec: Some(512.0),
            write_bytes_per_sec: None,
        }],
    }
}

pub fn sample_with_cpu(timestamp: u64, cpu: f64) -> Sample {
    Sample {
        cpu_usage: Some(cpu),
        ..sample(timestamp)
    }
}

/// A sample with every source absent.
pub fn empty_sample(timestamp: u64) -> Sample {
    Sample::from_raw(&RawSnapshot::empty(timestamp), None)
}

pub fn raw(timestamp: u64, rx_bytes: u64, read_bytes: u64) -> RawSnapshot {
    RawSnapshot {
        timestamp,
        cpu_usage: Some(5.0),
        cpu_temp: Some(40.0),
        memory: Some(SpaceUsage {
            used: 256,
            total: 1024,
        }),
        mounts: vec![MountReading {
            path: "/".into(),
            usage: Some(SpaceUsage {
                used: 100,
                total: 400,
            }),
        }],
        interfaces: vec![InterfaceReading {
            name: "eth0".into(),
            counters: Some(NetCounters {
                rx_bytes,
                tx_bytes: rx_bytes / 2,
            }),
        }],
        devices: vec![DeviceReading {
            name: "sda".into(),
            counters: Some(IoCounters {
                read_bytes,
                written_bytes: 0,
            }),
        }],
    }
}

/// Hands out queued snapshots in order, then snapshots stamped with the wall clock
/// whose counters grow by 1000 bytes per capture. Optional per-capture delays run
/// after the timestamp is taken, like a slow source would.
pub struct ScriptedReader {
    queue: Mutex<VecDeque<RawSnapshot>>,
    delays: Mutex<VecDeque<Duration>>,
    captures: Arc<AtomicU64>,
}

impl ScriptedReader {
    pub fn new(snapshots: Vec<RawSnapshot>) -> Self {
        Self {
            queue: Mutex::new(snapshots.into()),
            delays: Mutex::new(VecDeque::new()),
            captures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The n-th capture takes `delays[n]`; later captures return at once.
    pub fn with_capture_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    /// Shared capture count; stays readable after the reader moves into the sampler.
    pub fn capture_counter(&self) -> Arc<AtomicU64> {
        self.captures.clone()
    }
}

impl Reader for ScriptedReader {
    async fn capture(&self) -> RawSnapshot {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        let queued = self.queue.lock().unwrap().pop_front();
        let snapshot = queued.unwrap_or_else(|| {
            raw(
                pimonitor::clock::now_ms(),
                (n + 1) * 1_000,
                (n + 1) * 1_000,
            )
        });
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        snapshot
    }
}
