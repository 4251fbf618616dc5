// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only display layer. All endpoints live under `/api/v1/`:
//
//   GET /api/v1/health           watchdog marker + server time
//   GET /api/v1/scores           published table + publish age + freshness warning
//   GET /api/v1/scores/:symbol   one published row
//
// CORS is permissive; the API exposes no mutation and no credentials.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app_state::AppState;
use crate::error::StoreError;
use crate::publisher::{PublishedRow, PublishedTable, WatchdogMarker};
use crate::types::DataQuality;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST router with tracing, CORS and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/scores", get(scores))
        .route("/api/v1/scores/:symbol", get(score_for_symbol))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

fn store_unavailable(err: StoreError) -> Response {
    warn!(error = %err, "store read failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "store_unavailable",
            "message": err.to_string(),
        })),
    )
        .into_response()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: DateTime<FixedOffset>,
    watchdog: WatchdogMarker,
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.watchdog().await {
        Ok(watchdog) => Json(HealthResponse {
            status: "ok",
            server_time: state.clock.now(),
            watchdog,
        })
        .into_response(),
        Err(e) => store_unavailable(e),
    }
}

// =============================================================================
// Scores
// =============================================================================

#[derive(Debug, Serialize)]
struct ScoresResponse {
    server_time: DateTime<FixedOffset>,
    publish_age_secs: Option<i64>,
    data_quality: DataQuality,
    warning: Option<String>,
    table: Option<PublishedTable>,
}

async fn scores(State(state): State<Arc<AppState>>) -> Response {
    let view = match state.table_view().await {
        Ok(v) => v,
        Err(e) => return store_unavailable(e),
    };

    Json(ScoresResponse {
        server_time: view.now,
        publish_age_secs: view.publish_age_secs,
        data_quality: view.data_quality,
        warning: view.warning(),
        table: view.table,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct RowResponse {
    server_time: DateTime<FixedOffset>,
    table_quality: DataQuality,
    warning: Option<String>,
    row: PublishedRow,
}

async fn score_for_symbol(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let view = match state.table_view().await {
        Ok(v) => v,
        Err(e) => return store_unavailable(e),
    };
    let symbol = symbol.trim().to_uppercase();
    let warning = view.warning();

    match view.table.as_ref().and_then(|t| t.row(&symbol)) {
        Some(row) => Json(RowResponse {
            server_time: view.now,
            table_quality: view.data_quality,
            warning,
            row: row.clone(),
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_published",
                "symbol": symbol,
            })),
        )
            .into_response(),
    }
}
