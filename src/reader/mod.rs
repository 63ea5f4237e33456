// OS metric acquisition via sysinfo (+ /proc and /sys on Linux).
// Every source is read independently on the blocking pool under a timeout; a
// failing or slow source becomes an absent field, never a failed capture. A source
// whose previous read has not returned is skipped, so at most one blocking thread
// per source can be stuck.

mod linux;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sysinfo::{Disks, Networks, System};
use tracing::instrument;

use crate::clock;
use crate::config::SourcesConfig;
use crate::models::{
    DeviceReading, InterfaceReading, MountReading, NetCounters, RawSnapshot, SpaceUsage,
};

const LOOPBACK: &str = "lo";

/// Produces one raw snapshot per call. Implementations must not fail as a whole.
pub trait Reader: Send + Sync + 'static {
    fn capture(&self) -> impl Future<Output = RawSnapshot> + Send;
}

/// Space figures of one mounted filesystem.
#[derive(Debug, Clone)]
pub struct MountSpace {
    pub mount_point: PathBuf,
    pub total: u64,
    pub available: u64,
}

/// Usage of the filesystem holding `path`: the mount with the longest matching prefix.
pub fn resolve_mount(path: &Path, mounts: &[MountSpace]) -> Option<SpaceUsage> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.components().count())
        .filter(|m| m.total > 0)
        .map(|m| SpaceUsage {
            used: m.total.saturating_sub(m.available),
            total: m.total,
        })
}

struct CpuSample {
    refreshed_at: Instant,
    usage: Option<f64>,
}

/// Sources with a blocking read still running.
#[derive(Default)]
struct InFlight(Mutex<HashSet<&'static str>>);

impl InFlight {
    fn set(&self) -> MutexGuard<'_, HashSet<&'static str>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `source` busy; false when it already was.
    fn try_begin(&self, source: &'static str) -> bool {
        self.set().insert(source)
    }

    fn finish(&self, source: &'static str) {
        self.set().remove(source);
    }

    #[cfg(test)]
    fn is_busy(&self, source: &'static str) -> bool {
        self.set().contains(source)
    }
}

/// Clears the in-flight mark when the blocking read returns or panics.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    source: &'static str,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.finish(self.source);
    }
}

pub struct SysinfoReader {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    last_cpu: Arc<Mutex<CpuSample>>,
    sources: Arc<SourcesConfig>,
    source_timeout: Duration,
    in_flight: Arc<InFlight>,
}

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> anyhow::Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|e| anyhow::anyhow!("sysinfo {} lock poisoned: {}", what, e))
}

impl SysinfoReader {
    pub fn new(sources: SourcesConfig, source_timeout: Duration) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
            // refresh_all above is the usage baseline
            last_cpu: Arc::new(Mutex::new(CpuSample {
                refreshed_at: Instant::now(),
                usage: None,
            })),
            sources: Arc::new(sources),
            source_timeout,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn sources(&self) -> &SourcesConfig {
        &self.sources
    }

    /// Runs `f` on the blocking pool, bounded by the source timeout. A timed-out read
    /// keeps its thread until it returns; until then the source reads as absent.
    async fn read_source<T, F>(&self, source: &'static str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if !self.in_flight.try_begin(source) {
            tracing::debug!(source, "previous read still running; source skipped");
            return None;
        }
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            source,
        };
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            f()
        });
        match tokio::time::timeout(self.source_timeout, task).await {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(e))) => {
                tracing::debug!(error = %e, source, "metric source unavailable");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, source, "metric source task failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    source,
                    timeout_ms = self.source_timeout.as_millis() as u64,
                    "metric source timed out"
                );
                None
            }
        }
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_cpu_usage"))]
    async fn read_cpu_usage(&self) -> Option<f64> {
        let sys = self.sys.clone();
        let last_cpu = self.last_cpu.clone();
        self.read_source("cpu_usage", move || {
            let mut sys = lock(&sys, "system")?;
            let mut last = lock(&last_cpu, "cpu")?;
            let now = Instant::now();
            if now.duration_since(last.refreshed_at) < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
                // Too soon for a meaningful delta; reuse the previous reading if any.
                return last
                    .usage
                    .ok_or_else(|| anyhow::anyhow!("cpu usage baseline not ready"));
            }
            sys.refresh_cpu_all();
            let usage = (sys.global_cpu_usage() as f64).clamp(0.0, 100.0);
            *last = CpuSample {
                refreshed_at: now,
                usage: Some(usage),
            };
            Ok(usage)
        })
        .await
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_cpu_temp"))]
    async fn read_cpu_temp(&self) -> Option<f64> {
        let path = self.sources.thermal_zone.clone();
        self.read_source("cpu_temp", move || linux::read_thermal_celsius(&path))
            .await
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_memory"))]
    async fn read_memory(&self) -> Option<SpaceUsage> {
        let sys = self.sys.clone();
        self.read_source("memory", move || {
            let mut sys = lock(&sys, "system")?;
            sys.refresh_memory();
            let total = sys.total_memory();
            anyhow::ensure!(total > 0, "total memory reported as 0");
            Ok(SpaceUsage {
                used: total.saturating_sub(sys.available_memory()),
                total,
            })
        })
        .await
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_mounts"))]
    async fn read_mounts(&self) -> Vec<MountReading> {
        let disks = self.disks.clone();
        let paths = self.sources.mounts.clone();
        let read = {
            let paths = paths.clone();
            self.read_source("disk_usage", move || {
                let mut disks = lock(&disks, "disks")?;
                disks.refresh(true);
                let mounts: Vec<MountSpace> = disks
                    .list()
                    .iter()
                    .map(|d| MountSpace {
                        mount_point: d.mount_point().to_path_buf(),
                        total: d.total_space(),
                        available: d.available_space(),
                    })
                    .collect();
                Ok(paths
                    .into_iter()
                    .map(|path| {
                        let p = Path::new(&path);
                        let usage = if p.exists() {
                            resolve_mount(p, &mounts)
                        } else {
                            None
                        };
                        MountReading { path, usage }
                    })
                    .collect::<Vec<_>>())
            })
            .await
        };
        read.unwrap_or_else(|| {
            paths
                .into_iter()
                .map(|path| MountReading { path, usage: None })
                .collect()
        })
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_interfaces"))]
    async fn read_interfaces(&self) -> Vec<InterfaceReading> {
        let networks = self.networks.clone();
        let wanted = self.sources.interfaces.clone();
        let read = {
            let wanted = wanted.clone();
            self.read_source("network", move || {
                let mut networks = lock(&networks, "networks")?;
                networks.refresh(true);
                let counters: HashMap<String, NetCounters> = networks
                    .list()
                    .iter()
                    .map(|(name, data)| {
                        (
                            name.clone(),
                            NetCounters {
                                rx_bytes: data.total_received(),
                                tx_bytes: data.total_transmitted(),
                            },
                        )
                    })
                    .collect();
                Ok(select_interfaces(&wanted, &counters))
            })
            .await
        };
        read.unwrap_or_else(|| {
            wanted
                .into_iter()
                .map(|name| InterfaceReading {
                    name,
                    counters: None,
                })
                .collect()
        })
    }

    #[instrument(skip(self), fields(reader = "sysinfo", operation = "read_devices"))]
    async fn read_devices(&self) -> Vec<DeviceReading> {
        let devices = self.sources.disk_devices.clone();
        let stats = self.read_source("disk_io", linux::read_diskstats).await;
        devices
            .into_iter()
            .map(|name| {
                let counters = stats.as_ref().and_then(|s| s.get(&name).copied());
                DeviceReading { name, counters }
            })
            .collect()
    }
}

/// Configured interfaces in order (absent when missing); with no configuration,
/// every non-loopback interface sorted by name.
fn select_interfaces(
    wanted: &[String],
    counters: &HashMap<String, NetCounters>,
) -> Vec<InterfaceReading> {
    if wanted.is_empty() {
        let mut all: Vec<InterfaceReading> = counters
            .iter()
            .filter(|(name, _)| name.as_str() != LOOPBACK)
            .map(|(name, c)| InterfaceReading {
                name: name.clone(),
                counters: Some(*c),
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        return all;
    }
    wanted
        .iter()
        .map(|name| InterfaceReading {
            name: name.clone(),
            counters: counters.get(name).copied(),
        })
        .collect()
}

impl Reader for SysinfoReader {
    async fn capture(&self) -> RawSnapshot {
        let timestamp = clock::now_ms();
        let (cpu_usage, cpu_temp, memory, mounts, interfaces, devices) = tokio::join!(
            self.read_cpu_usage(),
            self.read_cpu_temp(),
            self.read_memory(),
            self.read_mounts(),
            self.read_interfaces(),
            self.read_devices(),
        );
        RawSnapshot {
            timestamp,
            cpu_usage,
            cpu_temp,
            memory,
            mounts,
            interfaces,
            devices,
        }
    }
}
