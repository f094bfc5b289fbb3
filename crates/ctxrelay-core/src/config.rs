//! Ingest engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::RetryMode;
use crate::hub::HubConfig;
use crate::types::SourceAddress;

/// Configuration for one ingest engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Network id recorded on every event and used in the checkpoint key.
    pub network_id: u64,
    /// Contract whose `ContextWritten` logs are relayed.
    pub source_address: SourceAddress,
    /// Blocks per `eth_getLogs` call.
    pub chunk_size: u64,
    /// Sleep between scan iterations and before retries (milliseconds).
    pub poll_interval_ms: u64,
    /// Blocks behind head to start from when no checkpoint or start block exists.
    pub backfill_depth: u64,
    /// Explicit start block; ignored once a checkpoint exists.
    pub start_block: Option<u64>,
    /// Only scan up to `head - confirmation_depth`.
    pub confirmation_depth: u64,
    pub retry: RetryMode,
    pub hub: HubConfig,
}

impl IngestConfig {
    /// Defaults for a given source address (Base mainnet, 2000-block chunks).
    pub fn new(source_address: SourceAddress) -> Self {
        Self {
            network_id: 8453,
            source_address,
            chunk_size: 2000,
            poll_interval_ms: 2000,
            backfill_depth: 5000,
            start_block: None,
            confirmation_depth: 0,
            retry: RetryMode::Fixed,
            hub: HubConfig::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
