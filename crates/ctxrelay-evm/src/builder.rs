//! Fluent builder for [`IngestConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use ctxrelay_core::types::SourceAddress;
//! use ctxrelay_evm::RelayBuilder;
//!
//! let source = SourceAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
//! let config = RelayBuilder::new(source)
//!     .network_id(8453)
//!     .start_block(12_000_000)
//!     .chunk_size(1000)
//!     .confirmation_depth(2)
//!     .build_config();
//! ```

use ctxrelay_core::backoff::RetryMode;
use ctxrelay_core::config::IngestConfig;
use ctxrelay_core::types::SourceAddress;

/// Fluent builder for `IngestConfig`.
pub struct RelayBuilder {
    config: IngestConfig,
}

impl RelayBuilder {
    pub fn new(source_address: SourceAddress) -> Self {
        Self {
            config: IngestConfig::new(source_address),
        }
    }

    pub fn network_id(mut self, id: u64) -> Self {
        self.config.network_id = id;
        self
    }

    /// Blocks per `eth_getLogs` call. Zero is treated as one.
    pub fn chunk_size(mut self, size: u64) -> Self {
        self.config.chunk_size = size.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Blocks behind head to start from when there is no checkpoint or start block.
    pub fn backfill_depth(mut self, depth: u64) -> Self {
        self.config.backfill_depth = depth;
        self
    }

    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    pub fn retry(mut self, mode: RetryMode) -> Self {
        self.config.retry = mode;
        self
    }

    pub fn max_subscribers(mut self, n: usize) -> Self {
        self.config.hub.max_subscribers = n;
        self
    }

    pub fn subscriber_buffer(mut self, n: usize) -> Self {
        self.config.hub.subscriber_buffer = n;
        self
    }

    pub fn build_config(self) -> IngestConfig {
        self.config
    }
}
