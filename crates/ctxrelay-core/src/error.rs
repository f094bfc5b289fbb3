//! Error types for the relay pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting, storing or serving context events.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream node unreachable, timed out or returned an error.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or malformed configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Subscriber limit reached ({limit})")]
    SubscriberLimit { limit: usize },

    /// Checkpoint write failed; local state would diverge from what was processed.
    #[error("Checkpoint write failed at block {block}: {reason}")]
    CheckpointWrite { block: u64, reason: String },

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Returns `true` for errors the ingest loop retries after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }

    /// Returns `true` for errors that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::CheckpointWrite { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(RelayError::Rpc("timeout".into()).is_transient());
        assert!(!RelayError::Rpc("timeout".into()).is_fatal());
        let cp = RelayError::CheckpointWrite {
            block: 7,
            reason: "disk full".into(),
        };
        assert!(cp.is_fatal());
        assert!(!cp.is_transient());
        assert!(RelayError::Config("missing".into()).is_fatal());
    }
}
