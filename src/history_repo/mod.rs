// SQLite checkpoint storage for the sample series.
// Scalars are columns (NULL = absent); per-mount, per-interface and per-device
// vectors are versioned wincode BLOBs. created_at is the primary key, so
// re-saving an already persisted sample is a no-op replace.

mod blob;

use std::borrow::Borrow;
use std::path::Path;
use std::str::FromStr;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use crate::models::{DeviceSample, DiskUsage, InterfaceSample, Sample};

pub struct HistoryRepo {
    pool: SqlitePool,
}

/// Outcome of opening persisted history at startup.
pub struct Recovered {
    /// None when no database could be opened; the process then runs in memory only.
    pub repo: Option<HistoryRepo>,
    /// Persisted samples newer than the cutoff, ascending by time.
    pub samples: Vec<Sample>,
}

impl HistoryRepo {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Opens an existing database without creating files or touching its journal mode.
    pub async fn connect_read_only(path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS samples (
                created_at INTEGER PRIMARY KEY,
                cpu_usage REAL,
                cpu_temp REAL,
                memory_used INTEGER,
                memory_total INTEGER,
                disk_data BLOB NOT NULL,
                network_data BLOB NOT NULL,
                disk_io_data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Opens `path`, loads samples newer than `cutoff_ms`, and falls back to a fresh
    /// database (the unreadable file is kept aside as `*.corrupt-<time>`) or to no
    /// persistence at all. Never fails.
    pub async fn open_or_recover(path: &str, cutoff_ms: u64) -> Recovered {
        match Self::open_and_load(path, cutoff_ms).await {
            Ok((repo, samples)) => {
                tracing::info!(path, loaded = samples.len(), "history loaded");
                return Recovered {
                    repo: Some(repo),
                    samples,
                };
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path,
                    operation = "open_history",
                    "history unreadable; starting with an empty series"
                );
            }
        }
        if let Err(e) = quarantine(path) {
            tracing::warn!(error = %e, path, "could not move unreadable history aside");
        }
        let fresh = async {
            let repo = Self::connect(path).await?;
            repo.init().await?;
            anyhow::Ok(repo)
        }
        .await;
        match fresh {
            Ok(repo) => Recovered {
                repo: Some(repo),
                samples: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path,
                    operation = "open_history",
                    "persistence disabled; running in memory only"
                );
                Recovered {
                    repo: None,
                    samples: Vec::new(),
                }
            }
        }
    }

    async fn open_and_load(path: &str, cutoff_ms: u64) -> anyhow::Result<(Self, Vec<Sample>)> {
        let repo = Self::connect(path).await?;
        let loaded = async {
            repo.init().await?;
            repo.load_since(cutoff_ms).await
        }
        .await;
        match loaded {
            Ok(samples) => Ok((repo, samples)),
            Err(e) => {
                repo.close().await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, samples), fields(repo = "history", operation = "save_samples", samples_count = samples.len()))]
    pub async fn save_samples<S: Borrow<Sample>>(&self, samples: &[S]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            let s: &Sample = s.borrow();
            let disk_data = blob::with_version_prefix(
                blob::BLOB_VERSION,
                wincode::serialize(&s.disks).map_err(|e| anyhow::anyhow!("wincode: {}", e))?,
            );
            let network_data = blob::with_version_prefix(
                blob::BLOB_VERSION,
                wincode::serialize(&s.network).map_err(|e| anyhow::anyhow!("wincode: {}", e))?,
            );
            let disk_io_data = blob::with_version_prefix(
                blob::BLOB_VERSION,
                wincode::serialize(&s.disk_io).map_err(|e| anyhow::anyhow!("wincode: {}", e))?,
            );
            sqlx::query(
                "INSERT OR REPLACE INTO samples (created_at, cpu_usage, cpu_temp, memory_used, memory_total, disk_data, network_data, disk_io_data) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(s.timestamp as i64)
            .bind(s.cpu_usage)
            .bind(s.cpu_temp)
            .bind(s.memory_used.map(|v| v as i64))
            .bind(s.memory_total.map(|v| v as i64))
            .bind(&disk_data)
            .bind(&network_data)
            .bind(&disk_io_data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Samples with created_at >= cutoff_ms, ascending. Rows that fail to decode are skipped.
    #[instrument(skip(self), fields(repo = "history", operation = "load_since"))]
    pub async fn load_since(&self, cutoff_ms: u64) -> anyhow::Result<Vec<Sample>> {
        let rows = sqlx::query(
            "SELECT created_at, cpu_usage, cpu_temp, memory_used, memory_total, disk_data, network_data, disk_io_data
             FROM samples WHERE created_at >= $1 ORDER BY created_at ASC",
        )
        .bind(cutoff_ms as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in rows {
            match Self::parse_sample_row(&row) {
                Ok(sample) => out.push(sample),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(error = %e, "undecodable sample row, skipping");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "skipped undecodable persisted samples");
        }
        Ok(out)
    }

    /// Newest persisted sample, if any.
    #[instrument(skip(self), fields(repo = "history", operation = "load_latest"))]
    pub async fn load_latest(&self) -> anyhow::Result<Option<Sample>> {
        let row = sqlx::query(
            "SELECT created_at, cpu_usage, cpu_temp, memory_used, memory_total, disk_data, network_data, disk_io_data
             FROM samples ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_sample_row).transpose()
    }

    /// Newest persisted timestamp, if any.
    pub async fn latest_timestamp(&self) -> anyhow::Result<Option<u64>> {
        let row = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(created_at) FROM samples")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.map(|ts| ts.max(0) as u64))
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "prune_before"))]
    pub async fn prune_before(&self, cutoff_ms: u64) -> anyhow::Result<u64> {
        let r = sqlx::query("DELETE FROM samples WHERE created_at < $1")
            .bind(cutoff_ms as i64)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn parse_sample_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Sample> {
        let created_at: i64 = row.try_get("created_at")?;
        let cpu_usage: Option<f64> = row.try_get("cpu_usage")?;
        let cpu_temp: Option<f64> = row.try_get("cpu_temp")?;
        let memory_used: Option<i64> = row.try_get("memory_used")?;
        let memory_total: Option<i64> = row.try_get("memory_total")?;
        let disk_data: Vec<u8> = row.try_get("disk_data")?;
        let network_data: Vec<u8> = row.try_get("network_data")?;
        let disk_io_data: Vec<u8> = row.try_get("disk_io_data")?;

        Ok(Sample {
            timestamp: created_at.max(0) as u64,
            cpu_usage,
            cpu_temp,
            memory_used: memory_used.map(|v| v.max(0) as u64),
            memory_total: memory_total.map(|v| v.max(0) as u64),
            disks: deserialize_disk_data(&disk_data)?,
            network: deserialize_network_data(&network_data)?,
            disk_io: deserialize_disk_io_data(&disk_io_data)?,
        })
    }
}

fn deserialize_disk_data(bytes: &[u8]) -> anyhow::Result<Vec<DiskUsage>> {
    wincode::deserialize(blob::blob_payload(bytes, blob::BLOB_VERSION)?)
        .map_err(|e| anyhow::anyhow!("wincode deserialize disks: {}", e))
}

fn deserialize_network_data(bytes: &[u8]) -> anyhow::Result<Vec<InterfaceSample>> {
    wincode::deserialize(blob::blob_payload(bytes, blob::BLOB_VERSION)?)
        .map_err(|e| anyhow::anyhow!("wincode deserialize network: {}", e))
}

fn deserialize_disk_io_data(bytes: &[u8]) -> anyhow::Result<Vec<DeviceSample>> {
    wincode::deserialize(blob::blob_payload(bytes, blob::BLOB_VERSION)?)
        .map_err(|e| anyhow::anyhow!("wincode deserialize disk io: {}", e))
}

/// Renames the database and its WAL/SHM siblings to `<name>.corrupt-<local time>`.
fn quarantine(path: &str) -> std::io::Result<()> {
    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    for suffix in ["", "-wal", "-shm"] {
        let src = format!("{}{}", path, suffix);
        if Path::new(&src).exists() {
            std::fs::rename(&src, format!("{}.corrupt-{}", src, stamp))?;
        }
    }
    Ok(())
}
