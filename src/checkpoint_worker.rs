// Background worker: persists new samples when the sampler asks, prunes rows past
// retention, and runs VACUUM on a schedule (cron expression or fixed interval).
// When the sampler drops its request sender the worker does a final flush and exits.
// Operators can force a flush (SIGUSR1) through `forward_flush_requests`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::clock;
use crate::history_repo::HistoryRepo;
use crate::store::SeriesReader;

/// Config for the checkpoint writer.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// Result of one checkpoint pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub saved: usize,
    pub pruned: u64,
}

/// Spawns the checkpoint writer. `watermark_ms` is the newest timestamp already on disk.
pub fn spawn(
    reader: SeriesReader,
    repo: Arc<HistoryRepo>,
    request_rx: mpsc::Receiver<()>,
    watermark_ms: u64,
    config: CheckpointConfig,
) -> tokio::task::JoinHandle<()> {
    let span = tracing::span!(tracing::Level::DEBUG, "checkpoint_writer");
    tokio::spawn(run(reader, repo, request_rx, watermark_ms, config).instrument(span))
}

async fn run(
    reader: SeriesReader,
    repo: Arc<HistoryRepo>,
    mut request_rx: mpsc::Receiver<()>,
    mut watermark_ms: u64,
    config: CheckpointConfig,
) {
    let (vacuum_tx, mut vacuum_rx) = mpsc::channel::<()>(1);
    let vacuum_task = tokio::spawn(vacuum_scheduler(config, vacuum_tx));

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                let closing = request.is_none();
                match checkpoint_once(&reader, &repo, &mut watermark_ms).await {
                    Ok(outcome) => {
                        if outcome.saved > 0 || outcome.pruned > 0 {
                            info!(
                                saved = outcome.saved,
                                pruned = outcome.pruned,
                                watermark_ms,
                                final_flush = closing,
                                "checkpoint complete"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, final_flush = closing, "checkpoint failed"),
                }
                if closing {
                    break;
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
        }
    }
    vacuum_task.abort();
    repo.close().await;
}

/// Turns every item of `signals` into a checkpoint request. A request already pending
/// absorbs the new one. Returns when the stream ends or the writer has stopped.
pub async fn forward_flush_requests<S>(mut signals: S, request_tx: mpsc::Sender<()>)
where
    S: Stream<Item = ()> + Unpin,
{
    while signals.next().await.is_some() {
        match request_tx.try_send(()) {
            Ok(()) => info!(operation = "flush_request", "flush requested"),
            Err(TrySendError::Full(())) => {
                debug!(operation = "flush_request", "checkpoint already pending")
            }
            Err(TrySendError::Closed(())) => {
                debug!(operation = "flush_request", "checkpoint writer not running");
                break;
            }
        }
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: CheckpointConfig, tx: mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Saves every sample newer than `watermark_ms`, advances the watermark on success, then
/// deletes rows older than the store's retention. On a failed save the watermark stays
/// put so the next pass retries the same samples.
#[instrument(skip(reader, repo), fields(operation = "checkpoint"))]
pub async fn checkpoint_once(
    reader: &SeriesReader,
    repo: &HistoryRepo,
    watermark_ms: &mut u64,
) -> anyhow::Result<CheckpointOutcome> {
    let pending = reader.samples_after(*watermark_ms);
    if let Some(newest) = pending.last().map(|s| s.timestamp) {
        repo.save_samples(&pending).await?;
        *watermark_ms = newest;
    }
    let retention_ms = reader.retention().as_millis() as u64;
    let cutoff = clock::now_ms().saturating_sub(retention_ms);
    let pruned = repo.prune_before(cutoff).await?;
    Ok(CheckpointOutcome {
        saved: pending.len(),
        pruned,
    })
}
