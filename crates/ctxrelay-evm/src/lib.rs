//! ctxrelay-evm: `ContextWritten` decoding, JSON-RPC source, push
//! subscription and the ingest engine.

pub mod builder;
pub mod decoder;
pub mod ingest;
pub mod push;
pub mod source;

pub use builder::RelayBuilder;
pub use decoder::{context_filter, context_written_topic, ContextDecoder, ContextWritten, SkipReason};
pub use ingest::{spawn_push, IngestEngine, LogSink, ScanOutcome, SinkReport};
pub use push::WsLogSubscription;
pub use source::RpcSourceClient;
