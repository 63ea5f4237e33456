// Checkpoint writer tests: watermark deltas, pruning, operator flush, final flush on shutdown

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{HOUR_MS, sample};
use pimonitor::checkpoint_worker::{
    CheckpointConfig, checkpoint_once, forward_flush_requests, spawn,
};
use pimonitor::clock;
use pimonitor::history_repo::HistoryRepo;
use pimonitor::store::TimeSeriesStore;
use tempfile::TempDir;

async fn temp_repo(dir: &TempDir) -> (HistoryRepo, String) {
    let path = dir.path().join("history.db");
    let path_str = path.to_str().unwrap().to_string();
    let repo = HistoryRepo::connect(&path_str).await.unwrap();
    repo.init().await.unwrap();
    (repo, path_str)
}

#[tokio::test]
async fn checkpoint_once_saves_only_samples_after_watermark() {
    let dir = TempDir::new().unwrap();
    let (repo, _) = temp_repo(&dir).await;
    let now = clock::now_ms();
    let writer = TimeSeriesStore::new(Duration::from_secs(3600));
    for i in (1..=3).rev() {
        writer.append(sample(now - i * 1_000)).unwrap();
    }
    let reader = writer.reader();
    let mut watermark = 0;

    let first = checkpoint_once(&reader, &repo, &mut watermark).await.unwrap();
    assert_eq!(first.saved, 3);
    assert_eq!(watermark, now - 1_000);

    let second = checkpoint_once(&reader, &repo, &mut watermark).await.unwrap();
    assert_eq!(second.saved, 0);

    writer.append(sample(now)).unwrap();
    let third = checkpoint_once(&reader, &repo, &mut watermark).await.unwrap();
    assert_eq!(third.saved, 1);
    assert_eq!(watermark, now);
    assert_eq!(repo.count().await.unwrap(), 4);
}

#[tokio::test]
async fn checkpoint_once_prunes_rows_past_retention() {
    let dir = TempDir::new().unwrap();
    let (repo, _) = temp_repo(&dir).await;
    let now = clock::now_ms();
    repo.save_samples(&[sample(now - 3 * HOUR_MS), sample(now - 2 * HOUR_MS)])
        .await
        .unwrap();

    let writer = TimeSeriesStore::new(Duration::from_secs(3600));
    writer.append(sample(now - 1_000)).unwrap();
    let mut watermark = 0;

    let outcome = checkpoint_once(&writer.reader(), &repo, &mut watermark)
        .await
        .unwrap();
    assert_eq!(outcome.saved, 1);
    assert_eq!(outcome.pruned, 2);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn writer_flushes_on_request_and_again_on_close() {
    let dir = TempDir::new().unwrap();
    let (repo, path) = temp_repo(&dir).await;
    let now = clock::now_ms();
    let writer = TimeSeriesStore::new(Duration::from_secs(3600));
    writer.append(sample(now - 2_000)).unwrap();

    let (request_tx, request_rx) = tokio::sync::mpsc::channel(1);
    let handle = spawn(
        writer.reader(),
        Arc::new(repo),
        request_rx,
        0,
        CheckpointConfig {
            vacuum_schedule: None,
            vacuum_interval_secs: 3600,
        },
    );

    request_tx.send(()).await.unwrap();
    writer.append(sample(now - 1_000)).unwrap();
    // Closing the channel triggers the final flush.
    drop(request_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("writer exits after channel close")
        .unwrap();

    let check = HistoryRepo::connect(&path).await.unwrap();
    let persisted: Vec<u64> = check
        .load_since(0)
        .await
        .unwrap()
        .iter()
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(persisted, vec![now - 2_000, now - 1_000]);
}

#[tokio::test]
async fn flush_request_persists_buffered_samples_before_the_interval() {
    let dir = TempDir::new().unwrap();
    let (repo, _) = temp_repo(&dir).await;
    let repo = Arc::new(repo);
    let now = clock::now_ms();
    let writer = TimeSeriesStore::new(Duration::from_secs(3600));
    writer.append(sample(now - 2_000)).unwrap();
    writer.append(sample(now - 1_000)).unwrap();

    let (request_tx, request_rx) = tokio::sync::mpsc::channel(1);
    let handle = spawn(
        writer.reader(),
        repo.clone(),
        request_rx,
        0,
        CheckpointConfig {
            vacuum_schedule: None,
            vacuum_interval_secs: 3600,
        },
    );

    // Stands in for the SIGUSR1 stream.
    let (signal_tx, signal_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let signals = Box::pin(futures_util::stream::unfold(signal_rx, |mut rx| async move {
        rx.recv().await.map(|()| ((), rx))
    }));
    let forwarder = tokio::spawn(forward_flush_requests(signals, request_tx.clone()));

    assert_eq!(repo.count().await.unwrap(), 0);
    signal_tx.send(()).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while repo.count().await.unwrap() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "flush never happened");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The forwarder ends with its signal stream and releases its sender.
    drop(signal_tx);
    tokio::time::timeout(Duration::from_secs(2), forwarder)
        .await
        .expect("forwarder stops when signals end")
        .unwrap();
    drop(request_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("writer exits after every sender is gone")
        .unwrap();
}
