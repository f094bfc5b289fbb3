//! JSON-RPC implementation of [`SourceClient`].
//!
//! Uses `eth_blockNumber`, `eth_getLogs` and `eth_getBlockByNumber` over any
//! [`RpcTransport`] (HTTP or WebSocket).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use ctxrelay_core::error::RelayError;
use ctxrelay_core::source::SourceClient;
use ctxrelay_core::types::{parse_hex_u64, to_hex_quantity, LogFilter, RawLog};
use ctxrelay_rpc::{RpcTransport, RpcTransportExt, TransportError};

/// Upstream node reached through a JSON-RPC transport.
#[derive(Clone)]
pub struct RpcSourceClient {
    transport: Arc<dyn RpcTransport>,
}

impl RpcSourceClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }
}

fn rpc_err(method: &str) -> impl Fn(TransportError) -> RelayError + '_ {
    move |e| RelayError::Rpc(format!("{method}: {e}"))
}

#[async_trait]
impl SourceClient for RpcSourceClient {
    async fn current_height(&self) -> Result<u64, RelayError> {
        let raw: String = self
            .transport
            .call("eth_blockNumber", json!([]))
            .await
            .map_err(rpc_err("eth_blockNumber"))?;
        parse_hex_u64(&raw)
            .ok_or_else(|| RelayError::Rpc(format!("eth_blockNumber: malformed height {raw:?}")))
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, RelayError> {
        let mut params = filter.to_json();
        params["fromBlock"] = Value::String(to_hex_quantity(from));
        params["toBlock"] = Value::String(to_hex_quantity(to));

        let logs: Vec<RawLog> = self
            .transport
            .call("eth_getLogs", json!([params]))
            .await
            .map_err(rpc_err("eth_getLogs"))?;
        tracing::debug!(from, to, count = logs.len(), "eth_getLogs");
        Ok(logs)
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, RelayError> {
        let block: Option<Value> = self
            .transport
            .call(
                "eth_getBlockByNumber",
                json!([to_hex_quantity(number), false]),
            )
            .await
            .map_err(rpc_err("eth_getBlockByNumber"))?;
        let block =
            block.ok_or_else(|| RelayError::Rpc(format!("block {number} not found")))?;
        block["timestamp"]
            .as_str()
            .and_then(parse_hex_u64)
            .map(|ts| ts as i64)
            .ok_or_else(|| RelayError::Rpc(format!("block {number} has no timestamp")))
    }
}
