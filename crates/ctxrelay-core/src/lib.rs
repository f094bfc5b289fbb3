//! ctxrelay-core: foundation for the context-event relay.
//!
//! # Architecture
//!
//! ```text
//! IngestEngine (ctxrelay-evm)
//!     ├── SourceClient / LogSubscription  (upstream node)
//!     ├── CheckpointManager               (resumable frontier)
//!     ├── EventStore                      (idempotent, append-only)
//!     └── BroadcastHub                    (live fan-out)
//! ```

pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod source;
pub mod status;
pub mod store;
pub mod types;

pub use backoff::{Backoff, RetryMode};
pub use checkpoint::{CheckpointKey, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use config::IngestConfig;
pub use error::RelayError;
pub use hub::{BroadcastHub, HubConfig, Subscription, SubscriberId};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use source::{LogStream, LogSubscription, SourceClient};
pub use status::{EngineStatus, IngestState, StatusHandle};
pub use store::{EventStore, InsertOutcome};
pub use types::{ContextEvent, EventKey, EventQuery, LogFilter, RawLog, SourceAddress, TopicCount};
