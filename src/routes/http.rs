// GET handlers: banner, version, latest, recent, history, stats, chart

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::query::{Metric, View, choose_bucket};
use crate::version::{NAME, VERSION};

const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// GET /: plain-text banner.
pub(super) async fn banner_handler() -> impl IntoResponse {
    format!("{}: host monitor", crate::version::banner())
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/latest: newest sample, 404 before the first one.
pub(super) async fn latest_handler(State(state): State<AppState>) -> Response {
    match state.query.latest() {
        Some(sample) => axum::Json(sample).into_response(),
        None => not_found("no data available".to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RecentParams {
    hours: Option<u32>,
    limit: Option<usize>,
}

/// GET /api/recent: raw samples of the last `hours` (default: the configured recent window).
pub(super) async fn recent_handler(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let window = params
        .hours
        .map(|h| Duration::from_secs(u64::from(h) * SECS_PER_HOUR))
        .unwrap_or_else(|| state.query.default_recent_window());
    let series = match params.limit {
        Some(limit) => state.query.recent_limited(window, limit),
        None => state.query.recent(window),
    };
    axum::Json(series)
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    days: Option<u32>,
    bucket_secs: Option<u64>,
    max_points: Option<usize>,
}

/// GET /api/history: aggregated buckets. Without `days`/`bucket_secs` the whole retained
/// span is returned in at most `max_points` buckets.
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let max_points = params
        .max_points
        .unwrap_or(state.config.query.max_points)
        .max(1);
    let points = if params.days.is_none() && params.bucket_secs.is_none() {
        state.query.history(max_points)
    } else {
        let window = params
            .days
            .map(|d| Duration::from_secs(u64::from(d) * SECS_PER_DAY))
            .unwrap_or_else(|| state.query.retention());
        let bucket = params
            .bucket_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| choose_bucket(window.as_millis() as u64, max_points));
        state.query.aggregated(window, bucket)
    };
    axum::Json(points)
}

/// GET /api/stats: store counters (size, time span, appended/evicted/rejected).
pub(super) async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.query.stats())
}

/// GET /api/chart/{view}/{metric}: labelled lines for the dashboard graphs.
pub(super) async fn chart_handler(
    State(state): State<AppState>,
    Path((view, metric)): Path<(String, String)>,
) -> Response {
    let view: View = match view.parse() {
        Ok(v) => v,
        Err(e) => return not_found(format!("{}", e)),
    };
    let metric: Metric = match metric.parse() {
        Ok(m) => m,
        Err(e) => return not_found(format!("{}", e)),
    };
    axum::Json(state.query.chart(metric, view)).into_response()
}
