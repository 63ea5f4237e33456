// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum_test::TestServer;
use pimonitor::config::AppConfig;
use pimonitor::models::Sample;
use pimonitor::query::QueryService;
use pimonitor::routes;
use pimonitor::store::{SeriesWriter, TimeSeriesStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

use common::{DAY_MS, MINUTE_MS, sample};

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[sampling]
sample_interval_ms = 1000
retention_days = 7

[persistence]
path = "data/test.db"

[publishing]
broadcast_capacity = 10

[query]
max_points = 50
recent_hours = 1
"#;

struct TestApp {
    app: axum::Router,
    writer: SeriesWriter,
    live_tx: broadcast::Sender<Sample>,
    ws_live_connections: Arc<AtomicUsize>,
}

fn test_app() -> TestApp {
    let config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let writer = TimeSeriesStore::new(config.sampling.retention());
    let query = Arc::new(QueryService::new(writer.reader(), config.query.clone()));
    let (live_tx, _) = broadcast::channel(config.publishing.broadcast_capacity);
    let ws_live_connections = Arc::new(AtomicUsize::new(0));
    let app = routes::app(
        query,
        live_tx.clone(),
        ws_live_connections.clone(),
        config,
    );
    TestApp {
        app,
        writer,
        live_tx,
        ws_live_connections,
    }
}

/// Five samples, one minute apart, ending now.
fn fill_recent(writer: &SeriesWriter) -> u64 {
    let now = pimonitor::clock::now_ms();
    for i in (0..5).rev() {
        writer.append(sample(now - i * MINUTE_MS)).unwrap();
    }
    now
}

#[tokio::test]
async fn test_root_endpoint() {
    let t = test_app();
    let server = TestServer::try_new(t.app).unwrap();
    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().starts_with("pimonitor "));
}

#[tokio::test]
async fn test_version_endpoint() {
    let t = test_app();
    let server = TestServer::try_new(t.app).unwrap();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("pimonitor")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_latest_is_404_when_empty_then_returns_newest() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();

    server.get("/api/latest").await.assert_status_not_found();

    let now = fill_recent(&writer);
    let response = server.get("/api/latest").await;
    response.assert_status_ok();
    let latest: Sample = response.json();
    assert_eq!(latest.timestamp, now);
}

#[tokio::test]
async fn test_recent_returns_window_and_honours_limit() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();
    let now = fill_recent(&writer);

    let all: Vec<Sample> = server.get("/api/recent").await.json();
    assert_eq!(all.len(), 5);

    let limited: Vec<Sample> = server
        .get("/api/recent")
        .add_query_param("hours", 1)
        .add_query_param("limit", 2)
        .await
        .json();
    let ts: Vec<u64> = limited.iter().map(|s| s.timestamp).collect();
    assert_eq!(ts, vec![now - MINUTE_MS, now]);
}

#[tokio::test]
async fn test_history_returns_buckets() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();
    fill_recent(&writer);

    let response = server.get("/api/history").await;
    response.assert_status_ok();
    let points: Vec<serde_json::Value> = response.json();
    assert!(!points.is_empty());
    assert!(points.len() <= 50);
    let count: u64 = points
        .iter()
        .map(|p| p["sampleCount"].as_u64().unwrap())
        .sum();
    assert_eq!(count, 5);

    let hourly: Vec<serde_json::Value> = server
        .get("/api/history")
        .add_query_param("days", 1)
        .add_query_param("bucket_secs", 3600)
        .await
        .json();
    assert!(hourly.iter().all(|p| p["bucketSecs"] == 3600));
    let count: u64 = hourly
        .iter()
        .map(|p| p["sampleCount"].as_u64().unwrap())
        .sum();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_history_default_window_follows_retention_reload() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();

    // Started with 7 days; a reload widened it to 14.
    writer.set_retention(std::time::Duration::from_secs(14 * 24 * 3600));
    let now = pimonitor::clock::now_ms();
    writer.append(sample(now - 10 * DAY_MS)).unwrap();
    writer.append(sample(now)).unwrap();

    let daily: Vec<serde_json::Value> = server
        .get("/api/history")
        .add_query_param("bucket_secs", 86400)
        .await
        .json();
    let count: u64 = daily
        .iter()
        .map(|p| p["sampleCount"].as_u64().unwrap())
        .sum();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();
    fill_recent(&writer);
    let json: serde_json::Value = server.get("/api/stats").await.json();
    assert_eq!(json["len"], 5);
    assert_eq!(json["appendedTotal"], 5);
    assert_eq!(json["retentionSecs"], 7 * 24 * 3600);
}

#[tokio::test]
async fn test_chart_endpoint_and_unknown_metric() {
    let t = test_app();
    let writer = t.writer;
    let server = TestServer::try_new(t.app).unwrap();
    fill_recent(&writer);

    let response = server.get("/api/chart/hour/network").await;
    response.assert_status_ok();
    let chart: serde_json::Value = response.json();
    assert_eq!(chart["metric"], "network");
    assert_eq!(chart["unit"], "MB/s");
    assert_eq!(chart["lines"][0]["label"], "eth0_rx");
    assert_eq!(chart["lines"][0]["points"].as_array().unwrap().len(), 5);

    let all: serde_json::Value = server.get("/api/chart/all/cpu").await.json();
    assert_eq!(all["lines"][0]["label"], "CPU Usage %");

    server.get("/api/chart/hour/gpu").await.assert_status_not_found();
    server.get("/api/chart/week/cpu").await.assert_status_not_found();
}

// --- WebSocket tests (require http_transport + ws feature) ---
// Receive until we get valid JSON (server may send Ping first).

async fn receive_first_json_text<T: serde::de::DeserializeOwned>(
    ws: &mut axum_test::TestWebSocket,
) -> T {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<T>(&text) {
            return v;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for JSON"
        );
    }
}

#[tokio::test]
async fn test_ws_live_sends_latest_then_broadcast_samples() {
    let t = test_app();
    let writer = t.writer;
    let live_tx = t.live_tx;
    let connections = t.ws_live_connections;
    let server = TestServer::builder().http_transport().try_build(t.app).unwrap();

    writer.append(sample(1_000)).unwrap();
    let mut ws = server.get_websocket("/ws/live").await.into_websocket().await;

    let first: Sample = receive_first_json_text(&mut ws).await;
    assert_eq!(first.timestamp, 1_000);
    assert_eq!(connections.load(Ordering::Relaxed), 1);

    let tx_clone = live_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        let _ = tx_clone.send(sample(42_000));
    });
    let received: Sample = receive_first_json_text(&mut ws).await;
    assert_eq!(received.timestamp, 42_000);
    assert_eq!(received.network[0].name, "eth0");
}

#[tokio::test]
async fn test_ws_live_does_not_resend_the_sample_it_started_with() {
    let t = test_app();
    let writer = t.writer;
    let live_tx = t.live_tx;
    let server = TestServer::builder().http_transport().try_build(t.app).unwrap();

    writer.append(sample(1_000)).unwrap();
    let mut ws = server.get_websocket("/ws/live").await.into_websocket().await;
    let first: Sample = receive_first_json_text(&mut ws).await;
    assert_eq!(first.timestamp, 1_000);

    // The connection subscribed before reading the newest sample, so the broadcast of
    // that same sample can still arrive; it is skipped.
    let tx_clone = live_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        let _ = tx_clone.send(sample(1_000));
        let _ = tx_clone.send(sample(2_000));
    });
    let next: Sample = receive_first_json_text(&mut ws).await;
    assert_eq!(next.timestamp, 2_000);
}
