//! API route definitions.

mod events;
mod health;
mod stream;

use std::path::Path;

use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
/// - `GET /events?topic=&author=&limit=` - Context events, newest first
/// - `GET /topics?limit=` - Topics by event count
/// - `GET /health` - Upstream reachability and ingest position
/// - `GET /metrics` - Ingestion counters
/// - `GET /stream` - Live context events (Server-Sent Events)
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events::list_events))
        .route("/topics", get(events::list_topics))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/stream", get(stream::stream))
        .with_state(state)
}

/// Serve static files from `dir` for any path the API does not claim.
pub fn with_dashboard(router: Router, dir: impl AsRef<Path>) -> Router {
    router.fallback_service(ServeDir::new(dir))
}
