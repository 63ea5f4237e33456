// Background sampler: capture -> derive rates -> append -> broadcast -> signal checkpoint.
// The sampler is the store's only writer and the only owner of the previous raw snapshot.
//
// Overrun policy: ticks use MissedTickBehavior::Delay. A tick that takes longer than
// the interval pushes the next one a full interval after it completes; missed ticks
// are coalesced, never replayed as a burst. Each overrun is counted and logged.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::Instrument;

use crate::clock;
use crate::models::{RawSnapshot, Sample};
use crate::rate;
use crate::reader::Reader;
use crate::store::SeriesWriter;

/// Rate limit for the "no receivers" message (avoid logging every tick when no one is on /ws/live)
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Reader, store handle, channels, and shutdown for the sampler.
pub struct SamplerDeps<R: Reader> {
    pub reader: R,
    pub writer: SeriesWriter,
    pub live_tx: broadcast::Sender<Sample>,
    /// Capacity-1 "checkpoint due" signal to the checkpoint writer.
    pub checkpoint_tx: mpsc::Sender<()>,
    /// Retention updates (e.g. config reload); applied on the next append.
    pub retention_rx: watch::Receiver<Duration>,
    pub ws_live_connections: Arc<AtomicUsize>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Sampler timing and logging config.
pub struct SamplerConfig {
    pub sample_interval_ms: u64,
    pub checkpoint_interval_secs: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Tick totals, returned when the sampler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerReport {
    pub ticks: u64,
    /// Ticks that took longer than the interval and pushed the next one back.
    pub ticks_delayed: u64,
}

/// Takes one snapshot and turns it into a sample against `previous`, which is
/// replaced by the new snapshot.
pub async fn sample_once<R: Reader>(reader: &R, previous: &mut Option<RawSnapshot>) -> Sample {
    let current = reader.capture().await;
    let rates = previous
        .as_ref()
        .map(|prev| rate::derive(prev, &current));
    let sample = Sample::from_raw(&current, rates.as_ref());
    *previous = Some(current);
    sample
}

/// Asks the checkpoint writer to persist; a request already pending absorbs this one.
fn request_checkpoint(checkpoint_tx: &mpsc::Sender<()>) {
    match checkpoint_tx.try_send(()) {
        Ok(()) => tracing::debug!(operation = "request_checkpoint", "checkpoint requested"),
        Err(mpsc::error::TrySendError::Full(())) => {
            tracing::debug!(
                operation = "request_checkpoint",
                "checkpoint already pending"
            );
        }
        Err(mpsc::error::TrySendError::Closed(())) => {
            tracing::debug!(
                operation = "request_checkpoint",
                "checkpoint writer not running"
            );
        }
    }
}

pub fn spawn<R: Reader>(
    deps: SamplerDeps<R>,
    config: SamplerConfig,
) -> tokio::task::JoinHandle<SamplerReport> {
    let span = tracing::span!(
        tracing::Level::DEBUG,
        "sampler",
        sample_interval_ms = config.sample_interval_ms
    );
    tokio::spawn(run(deps, config).instrument(span))
}

async fn run<R: Reader>(deps: SamplerDeps<R>, config: SamplerConfig) -> SamplerReport {
    let SamplerDeps {
        reader,
        writer,
        live_tx,
        checkpoint_tx,
        mut retention_rx,
        ws_live_connections,
        mut shutdown_rx,
    } = deps;
    let SamplerConfig {
        sample_interval_ms,
        checkpoint_interval_secs,
        stats_log_interval_secs,
    } = config;

    let period = Duration::from_millis(sample_interval_ms);
    let checkpoint_interval = Duration::from_secs(checkpoint_interval_secs);
    let stats_log_interval = Duration::from_secs(stats_log_interval_secs);

    let first_tick = Instant::now()
        + Duration::from_millis(clock::delay_to_boundary(clock::now_ms(), sample_interval_ms));
    let mut tick = interval_at(first_tick, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats_log_tick = interval(stats_log_interval);
    stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut previous: Option<RawSnapshot> = None;
    let mut last_checkpoint = Instant::now();
    let mut ticks: u64 = 0;
    let mut ticks_delayed: u64 = 0;
    let mut retention_open = true;
    let mut last_no_receivers_log: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let started = Instant::now();
                ticks += 1;
                let sample = sample_once(&reader, &mut previous).await;
                let timestamp = sample.timestamp;

                match writer.append(sample.clone()) {
                    Ok(evicted) => {
                        if evicted > 0 {
                            tracing::debug!(operation = "append", evicted, "retention eviction");
                        }
                        if live_tx.send(sample).is_err() {
                            let should_log = last_no_receivers_log
                                .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                            if should_log {
                                tracing::debug!(
                                    operation = "broadcast_sample",
                                    "No live WebSocket clients; broadcast channel has no receivers"
                                );
                                last_no_receivers_log = Some(Instant::now());
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            operation = "append",
                            timestamp,
                            "sample rejected (clock moved backwards?)"
                        );
                    }
                }

                if last_checkpoint.elapsed() >= checkpoint_interval {
                    request_checkpoint(&checkpoint_tx);
                    last_checkpoint = Instant::now();
                }

                let took = started.elapsed();
                if took > period {
                    ticks_delayed += 1;
                    tracing::warn!(
                        took_ms = took.as_millis() as u64,
                        interval_ms = sample_interval_ms,
                        ticks_delayed,
                        "sampling tick overran its interval; next tick delayed"
                    );
                }
            }
            changed = retention_rx.changed(), if retention_open => {
                match changed {
                    Ok(()) => {
                        let retention = *retention_rx.borrow_and_update();
                        writer.set_retention(retention);
                        tracing::info!(
                            retention_secs = retention.as_secs(),
                            "retention updated; applies from next append"
                        );
                    }
                    Err(_) => retention_open = false,
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Sampler shutting down");
                break;
            }
            _ = stats_log_tick.tick() => {
                let stats = writer.stats();
                tracing::info!(
                    ws_live_clients =
                        ws_live_connections.load(std::sync::atomic::Ordering::Relaxed),
                    samples_stored = stats.len,
                    samples_appended_total = stats.appended_total,
                    samples_evicted_total = stats.evicted_total,
                    samples_rejected_total = stats.rejected_total,
                    ticks_delayed,
                    "app stats"
                );
            }
        }
    }
    // Dropping checkpoint_tx lets the checkpoint writer do its final flush.
    drop(checkpoint_tx);
    SamplerReport {
        ticks,
        ticks_delayed,
    }
}
