// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::models::Sample;
use crate::query::QueryService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) query: Arc<QueryService>,
    pub(crate) live_tx: broadcast::Sender<Sample>,
    pub(crate) ws_live_connections: Arc<AtomicUsize>,
    pub(crate) config: AppConfig,
}

pub fn app(
    query: Arc<QueryService>,
    live_tx: broadcast::Sender<Sample>,
    ws_live_connections: Arc<AtomicUsize>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        query,
        live_tx,
        ws_live_connections,
        config,
    };
    Router::new()
        .route("/", get(http::banner_handler)) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/latest", get(http::latest_handler)) // GET /api/latest
        .route("/api/recent", get(http::recent_handler)) // GET /api/recent?hours=&limit=
        .route("/api/history", get(http::history_handler)) // GET /api/history?days=&bucket_secs=&max_points=
        .route("/api/stats", get(http::stats_handler)) // GET /api/stats
        .route("/api/chart/{view}/{metric}", get(http::chart_handler)) // GET /api/chart/hour/cpu
        .route("/ws/live", get(ws::ws_live)) // WS /ws/live
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
