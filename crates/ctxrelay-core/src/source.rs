//! Upstream source abstractions: the ledger node as seen by the relay.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RelayError;
use crate::types::{LogFilter, RawLog};

/// Pull-side contract of the upstream node.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Current chain head height.
    async fn current_height(&self) -> Result<u64, RelayError>;

    /// All logs in `[from, to]` (inclusive) matching `filter`.
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, RelayError>;

    /// Unix timestamp (seconds) of block `number`.
    async fn block_timestamp(&self, number: u64) -> Result<i64, RelayError>;
}

/// A stream of logs pushed by the upstream as they arrive.
pub type LogStream = Pin<Box<dyn Stream<Item = RawLog> + Send>>;

/// Push-side contract of the upstream node (optional).
///
/// Implementations own their reconnect policy; the returned stream ends only
/// when the subscription is shut down.
#[async_trait]
pub trait LogSubscription: Send + Sync {
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogStream, RelayError>;
}
