//! Observable engine state, shared with the query boundary.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lifecycle of the ingest engine. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestState {
    /// Resolving the starting frontier.
    Starting,
    /// More than one chunk behind the observed head.
    CatchingUp,
    /// Within one chunk of the observed head.
    Steady,
    /// Upstream failing repeatedly; still retrying.
    Degraded,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Steady => write!(f, "steady"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Snapshot of where the engine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: IngestState,
    /// Next block to scan, once resolved.
    pub frontier: Option<u64>,
    /// Most recent head height observed by the scan loop.
    pub observed_head: Option<u64>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: IngestState::Starting,
            frontier: None,
            observed_head: None,
        }
    }
}

/// Cloneable handle to the engine status. Written by the engine only.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<RwLock<EngineStatus>>);

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> EngineStatus {
        *self.0.read()
    }

    pub fn set_state(&self, state: IngestState) {
        let mut status = self.0.write();
        if status.state != state {
            tracing::info!(from = %status.state, to = %state, "ingest state changed");
            status.state = state;
        }
    }

    pub fn set_frontier(&self, frontier: u64) {
        self.0.write().frontier = Some(frontier);
    }

    pub fn set_head(&self, head: u64) {
        self.0.write().observed_head = Some(head);
    }
}

/// Classify the scan position: steady once `frontier` is within one chunk of `head`.
pub fn state_for(frontier: u64, head: u64, chunk_size: u64) -> IngestState {
    if head.saturating_add(1).saturating_sub(frontier) <= chunk_size {
        IngestState::Steady
    } else {
        IngestState::CatchingUp
    }
}
