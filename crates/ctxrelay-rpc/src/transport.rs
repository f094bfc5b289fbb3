//! The `RpcTransport` trait: one JSON-RPC call at a time over any wire.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;

/// An object-safe JSON-RPC transport.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Call `method` with `params` and return the raw `result` value.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Endpoint identifier for logs (URL).
    fn url(&self) -> &str;
}

/// Typed convenience on top of any [`RpcTransport`].
#[async_trait]
pub trait RpcTransportExt: RpcTransport {
    async fn call<T: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, TransportError> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(TransportError::Deserialization)
    }
}

impl<T: RpcTransport + ?Sized> RpcTransportExt for T {}
