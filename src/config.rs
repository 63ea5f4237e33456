use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sampling: SamplingConfig,
    pub sources: SourcesConfig,
    pub persistence: PersistenceConfig,
    pub publishing: PublishingConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            host: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub sample_interval_ms: u64,
    pub retention_days: u32,
    /// Upper bound for a single metric source read; a slower source is recorded as absent.
    pub source_timeout_ms: u64,
    /// How often to log app stats (samples appended/evicted, live clients) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 60_000,
            retention_days: 7,
            source_timeout_ms: 2_000,
            stats_log_interval_secs: 300,
        }
    }
}

impl SamplingConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Paths whose filesystem usage is sampled (any path; resolved to its mount).
    pub mounts: Vec<String>,
    /// Interfaces to sample; empty means every interface except loopback.
    pub interfaces: Vec<String>,
    /// Block devices as named in /proc/diskstats (e.g. "sda", "mmcblk0").
    pub disk_devices: Vec<String>,
    pub thermal_zone: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            mounts: vec!["/".into()],
            interfaces: vec![],
            disk_devices: vec!["sda".into(), "mmcblk0".into()],
            thermal_zone: "/sys/class/thermal/thermal_zone0/temp".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub path: String,
    pub checkpoint_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "data/pimonitor.db".into(),
            checkpoint_interval_secs: 3600,
            vacuum_schedule: None,
            vacuum_interval_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Max number of samples kept in the broadcast channel for /ws/live (slow clients may lag).
    pub broadcast_capacity: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on buckets returned by the long-range history view.
    pub max_points: usize,
    /// Window of the "recent" (hourly) view.
    pub recent_hours: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_points: 200,
            recent_hours: 1,
        }
    }
}

impl AppConfig {
    /// Reads `$CONFIG_FILE` (default `config.toml`). A missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "config file not found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("read {}: {}", path, e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.sampling.sample_interval_ms > 0,
            "sampling.sample_interval_ms must be > 0, got {}",
            self.sampling.sample_interval_ms
        );
        anyhow::ensure!(
            self.sampling.retention_days > 0,
            "sampling.retention_days must be > 0, got {}",
            self.sampling.retention_days
        );
        anyhow::ensure!(
            self.sampling.source_timeout_ms > 0,
            "sampling.source_timeout_ms must be > 0, got {}",
            self.sampling.source_timeout_ms
        );
        anyhow::ensure!(
            self.sampling.stats_log_interval_secs > 0,
            "sampling.stats_log_interval_secs must be > 0, got {}",
            self.sampling.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.persistence.path.is_empty(),
            "persistence.path must be non-empty"
        );
        anyhow::ensure!(
            self.persistence.checkpoint_interval_secs > 0,
            "persistence.checkpoint_interval_secs must be > 0, got {}",
            self.persistence.checkpoint_interval_secs
        );
        anyhow::ensure!(
            self.persistence.vacuum_interval_secs > 0,
            "persistence.vacuum_interval_secs must be > 0, got {}",
            self.persistence.vacuum_interval_secs
        );
        if let Some(ref schedule) = self.persistence.vacuum_schedule {
            cron::Schedule::from_str(schedule).map_err(|e| {
                anyhow::anyhow!("persistence.vacuum_schedule is not a valid cron expression: {}", e)
            })?;
        }
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        anyhow::ensure!(
            self.query.max_points > 0,
            "query.max_points must be > 0, got {}",
            self.query.max_points
        );
        anyhow::ensure!(
            self.query.recent_hours > 0,
            "query.recent_hours must be > 0, got {}",
            self.query.recent_hours
        );
        Ok(())
    }
}
