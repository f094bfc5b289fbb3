//! Health and metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use ctxrelay_core::metrics::MetricsSnapshot;
use ctxrelay_core::status::IngestState;

use crate::error::ApiError;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub network_id: u64,
    pub source_address: String,
    pub latest_height: Option<u64>,
    /// Next block the ingest engine will scan.
    pub frontier: Option<u64>,
    pub state: IngestState,
    /// Blocks between the last scanned block and the head.
    pub lag: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Blocks not yet scanned: `head - (frontier - 1)`, floored at zero.
fn lag(head: u64, frontier: u64) -> u64 {
    head.saturating_add(1).saturating_sub(frontier)
}

/// `GET /health`
///
/// Reads the upstream head. If the node is unreachable, responds 503 with the
/// locally known position; history endpoints keep serving regardless.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = state.status.get();
    let mut body = HealthResponse {
        ok: false,
        network_id: state.network_id,
        source_address: state.source_address.to_string(),
        latest_height: None,
        frontier: status.frontier,
        state: status.state,
        lag: None,
        error: None,
    };

    match state.source.current_height().await {
        Ok(head) => {
            body.ok = true;
            body.latest_height = Some(head);
            body.lag = status.frontier.map(|f| lag(head, f));
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::warn!(error = %e, "health check: upstream unreachable");
            body.error = Some(e.to_string());
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}

/// Metrics response: ingestion counters plus live gauges.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub stored_events: u64,
    pub subscribers: usize,
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ApiError> {
    Ok(Json(MetricsResponse {
        counters: state.metrics.snapshot(),
        stored_events: state.store.count().await?,
        subscribers: state.hub.len(),
    }))
}
