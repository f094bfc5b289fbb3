//! ctxrelay-serve: HTTP API over the relay's event store and broadcast hub.
//!
//! # Architecture
//!
//! - **AppState**: shared handles (store, hub, source, engine status, metrics)
//! - **Routes**: read-only endpoint handlers plus the live SSE stream
//! - **Dashboard**: optional static monitor page served as the fallback
//!
//! Handlers never write to the store; the ingest engine is the only writer.

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::{router, with_dashboard};
pub use self::state::AppState;
