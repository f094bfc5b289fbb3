//! Durable event store contract.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::types::{ContextEvent, EventQuery, TopicCount};

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row did not exist and was written.
    Inserted,
    /// A row with the same `(tx_hash, log_index)` already existed; nothing changed.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Append-only store of decoded context events.
///
/// `insert` must be atomic with respect to the `(tx_hash, log_index)`
/// uniqueness constraint: of two concurrent inserts of the same key, exactly
/// one reports [`InsertOutcome::Inserted`].
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &ContextEvent) -> Result<InsertOutcome, RelayError>;

    /// Events matching `query`, ordered by `(block_number desc, log_index desc)`.
    async fn query(&self, query: &EventQuery) -> Result<Vec<ContextEvent>, RelayError>;

    /// Per-topic event counts, largest first.
    async fn topic_counts(&self, limit: u32) -> Result<Vec<TopicCount>, RelayError>;

    /// Total number of stored events.
    async fn count(&self) -> Result<u64, RelayError>;
}
