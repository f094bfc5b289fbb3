//! Shared application state.

use std::sync::Arc;

use ctxrelay_core::hub::BroadcastHub;
use ctxrelay_core::metrics::RelayMetrics;
use ctxrelay_core::source::SourceClient;
use ctxrelay_core::status::StatusHandle;
use ctxrelay_core::store::EventStore;
use ctxrelay_core::types::SourceAddress;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event history, read-only from here.
    pub store: Arc<dyn EventStore>,

    /// Live fan-out for `/stream`.
    pub hub: BroadcastHub,

    /// Upstream node, used by `/health` to read the head.
    pub source: Arc<dyn SourceClient>,

    /// Ingest engine position and state.
    pub status: StatusHandle,

    pub metrics: Arc<RelayMetrics>,

    pub network_id: u64,

    pub source_address: SourceAddress,
}
