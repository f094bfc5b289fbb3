//! ctxrelay-rpc: JSON-RPC transports for the relay.
//!
//! - [`RpcTransport`]: the async trait every transport implements
//! - [`HttpTransport`]: request/response over HTTP POST
//! - [`WsTransport`]: multiplexed requests over one reconnecting WebSocket
//! - [`TransportError`]: structured transport error

pub mod error;
pub mod http;
pub mod request;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use http::{HttpTransport, HttpTransportConfig};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::{RpcTransport, RpcTransportExt};
pub use ws::{WsTransport, WsTransportConfig};
