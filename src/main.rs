use anyhow::Result;
use pimonitor::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(version = %version::banner(), "starting");

    let retention = app_config.sampling.retention();
    let now_ms = clock::now_ms();
    let cutoff_ms = now_ms.saturating_sub(retention.as_millis() as u64);
    let recovered =
        history_repo::HistoryRepo::open_or_recover(&app_config.persistence.path, cutoff_ms).await;

    let writer = store::TimeSeriesStore::new(retention);
    let restored = writer.restore(recovered.samples, now_ms);
    tracing::info!(restored, "series restored from history");
    let reader = writer.reader();
    let watermark_ms = writer.latest().map(|s| s.timestamp).unwrap_or(0);

    let (live_tx, _) = broadcast::channel::<models::Sample>(app_config.publishing.broadcast_capacity);
    let (checkpoint_tx, checkpoint_rx) = mpsc::channel::<()>(1);
    let (retention_tx, retention_rx) = watch::channel(retention);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let ws_live_connections = Arc::new(AtomicUsize::new(0));

    let checkpoint_handle = match recovered.repo {
        Some(repo) => Some(checkpoint_worker::spawn(
            reader.clone(),
            Arc::new(repo),
            checkpoint_rx,
            watermark_ms,
            checkpoint_worker::CheckpointConfig {
                vacuum_schedule: app_config.persistence.vacuum_schedule.clone(),
                vacuum_interval_secs: app_config.persistence.vacuum_interval_secs,
            },
        )),
        None => None,
    };

    let sysinfo_reader = reader::SysinfoReader::new(
        app_config.sources.clone(),
        Duration::from_millis(app_config.sampling.source_timeout_ms),
    );
    #[cfg(unix)]
    let flush_handle = tokio::spawn(flush_on_sigusr1(checkpoint_tx.clone()));

    let sampler_handle = sampler::spawn(
        sampler::SamplerDeps {
            reader: sysinfo_reader,
            writer,
            live_tx: live_tx.clone(),
            checkpoint_tx,
            retention_rx,
            ws_live_connections: ws_live_connections.clone(),
            shutdown_rx,
        },
        sampler::SamplerConfig {
            sample_interval_ms: app_config.sampling.sample_interval_ms,
            checkpoint_interval_secs: app_config.persistence.checkpoint_interval_secs,
            stats_log_interval_secs: app_config.sampling.stats_log_interval_secs,
        },
    );

    #[cfg(unix)]
    tokio::spawn(reload_on_sighup(retention_tx));
    #[cfg(not(unix))]
    drop(retention_tx);

    let query = Arc::new(query::QueryService::new(reader, app_config.query.clone()));
    let app = routes::app(query, live_tx, ws_live_connections, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(());
    match sampler_handle.await {
        Ok(report) => tracing::info!(
            ticks = report.ticks,
            ticks_delayed = report.ticks_delayed,
            "sampler stopped"
        ),
        Err(e) => tracing::warn!(error = %e, "sampler task failed"),
    }
    // The flush forwarder holds a request sender too; it must be gone before the
    // writer can see the channel close.
    #[cfg(unix)]
    {
        flush_handle.abort();
        let _ = flush_handle.await;
    }
    if let Some(handle) = checkpoint_handle {
        // The sampler dropped its request sender; the writer flushes once more and exits.
        let _ = handle.await;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Forwards SIGUSR1 to the checkpoint writer as a flush request.
#[cfg(unix)]
async fn flush_on_sigusr1(checkpoint_tx: mpsc::Sender<()>) {
    let signal =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGUSR1 handler unavailable; manual flush disabled");
                return;
            }
        };
    let requests = futures_util::stream::unfold(signal, |mut signal| async move {
        signal.recv().await.map(|()| ((), signal))
    });
    checkpoint_worker::forward_flush_requests(Box::pin(requests), checkpoint_tx).await;
}

/// Re-reads the config file on SIGHUP and forwards a changed retention to the sampler.
#[cfg(unix)]
async fn reload_on_sighup(retention_tx: watch::Sender<Duration>) {
    let mut hangup =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGHUP handler unavailable; config reload disabled");
                return;
            }
        };
    while hangup.recv().await.is_some() {
        match config::AppConfig::load() {
            Ok(cfg) => {
                let retention = cfg.sampling.retention();
                let changed = retention_tx.send_if_modified(|current| {
                    if *current == retention {
                        return false;
                    }
                    *current = retention;
                    true
                });
                tracing::info!(
                    retention_secs = retention.as_secs(),
                    changed,
                    "config reloaded"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "config reload failed; keeping current settings");
            }
        }
    }
}
