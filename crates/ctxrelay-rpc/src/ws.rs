//! WebSocket JSON-RPC transport with auto-reconnect.
//!
//! A background task owns the socket. Callers hand it requests over a channel
//! and wait on a oneshot for the matching response. When the connection drops,
//! in-flight requests fail with [`TransportError::WebSocket`] and the task
//! reconnects with exponential backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

type Reply = oneshot::Sender<Result<Value, TransportError>>;

/// Configuration for [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum Command {
    Send { req: JsonRpcRequest, reply: Reply },
    Close,
}

/// JSON-RPC over a single multiplexed WebSocket connection.
pub struct WsTransport {
    url: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl WsTransport {
    /// Start the background connection task. Connecting happens lazily in
    /// that task; requests issued while disconnected wait for the socket.
    pub fn connect(url: impl Into<String>, config: WsTransportConfig) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let request_timeout = config.request_timeout;

        tokio::spawn(connection_task(url.clone(), cmd_rx, config));

        Self {
            url,
            cmd_tx,
            next_id: AtomicU64::new(1),
            request_timeout,
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                req: JsonRpcRequest::new(id, method, params),
                reply,
            })
            .map_err(|_| TransportError::WebSocket("connection task stopped".into()))?;

        match time::timeout(self.request_timeout, rx).await {
            Err(_) => Err(TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }),
            Ok(Err(_)) => Err(TransportError::WebSocket("response dropped".into())),
            Ok(Ok(result)) => result,
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

async fn connection_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    config: WsTransportConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "connecting WebSocket transport");
        let (mut sink, mut stream) = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => ws.split(),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, delay = ?backoff, "WebSocket connect failed");
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
        };
        backoff = config.reconnect_initial;
        let mut pending: HashMap<u64, Reply> = HashMap::new();

        loop {
            prune_abandoned(&mut pending);
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => return,
                    Some(Command::Send { req, reply }) => {
                        // Caller already timed out or was cancelled.
                        if reply.is_closed() {
                            continue;
                        }
                        let Some(id) = req.id.as_number() else { continue };
                        let text = match serde_json::to_string(&req) {
                            Ok(t) => t,
                            Err(e) => {
                                let _ = reply.send(Err(e.into()));
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = reply.send(Err(TransportError::WebSocket(e.to_string())));
                            break;
                        }
                        pending.insert(id, reply);
                    }
                },
                msg = stream.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "WebSocket receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => resolve(&text, &mut pending),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(TransportError::WebSocket("connection lost".into())));
        }
        tracing::warn!(url = %url, delay = ?backoff, "WebSocket disconnected, reconnecting");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

/// Drop entries whose caller stopped waiting. Returns how many were removed.
fn prune_abandoned(pending: &mut HashMap<u64, Reply>) -> usize {
    let before = pending.len();
    pending.retain(|_, reply| !reply.is_closed());
    before - pending.len()
}

/// Route a response frame to its waiting caller. Anything else is ignored.
fn resolve(text: &str, pending: &mut HashMap<u64, Reply>) {
    let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(text) else {
        tracing::debug!("ignoring non-response WebSocket frame");
        return;
    };
    let Some(id) = resp.id.as_ref().and_then(|id| id.as_number()) else {
        return;
    };
    if let Some(reply) = pending.remove(&id) {
        let _ = reply.send(resp.into_result().map_err(TransportError::Rpc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_matches_by_id() {
        let mut pending = HashMap::new();
        let (tx, rx) = oneshot::channel();
        pending.insert(3, tx);

        resolve(r#"{"jsonrpc":"2.0","id":9,"result":"0x1"}"#, &mut pending);
        assert_eq!(pending.len(), 1);

        resolve(r#"{"jsonrpc":"2.0","id":3,"result":"0x10"}"#, &mut pending);
        assert!(pending.is_empty());
        assert_eq!(rx.await.unwrap().unwrap(), Value::String("0x10".into()));
    }

    #[tokio::test]
    async fn resolve_forwards_rpc_errors() {
        let mut pending = HashMap::new();
        let (tx, rx) = oneshot::channel();
        pending.insert(1, tx);

        resolve(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
            &mut pending,
        );
        assert!(matches!(rx.await.unwrap(), Err(TransportError::Rpc(e)) if e.code == -32000));
    }

    #[test]
    fn resolve_ignores_notifications() {
        let mut pending: HashMap<u64, Reply> = HashMap::new();
        resolve(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0x1","result":{}}}"#,
            &mut pending,
        );
        resolve("not json", &mut pending);
    }

    #[tokio::test]
    async fn abandoned_requests_are_pruned() {
        let mut pending = HashMap::new();
        let (kept_tx, kept_rx) = oneshot::channel();
        let (gone_tx, gone_rx) = oneshot::channel();
        pending.insert(1, kept_tx);
        pending.insert(2, gone_tx);

        drop(gone_rx);
        assert_eq!(prune_abandoned(&mut pending), 1);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&1));
        assert_eq!(prune_abandoned(&mut pending), 0);

        // A late response for the pruned id finds no one and changes nothing.
        resolve(r#"{"jsonrpc":"2.0","id":2,"result":"0x2"}"#, &mut pending);
        assert_eq!(pending.len(), 1);

        resolve(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#, &mut pending);
        assert_eq!(kept_rx.await.unwrap().unwrap(), Value::String("0x1".into()));
    }

    #[tokio::test]
    async fn timed_out_caller_closes_its_reply() {
        let (reply, rx) = oneshot::channel::<Result<Value, TransportError>>();
        let waited = time::timeout(Duration::from_millis(5), rx).await;
        assert!(waited.is_err());
        assert!(reply.is_closed());

        let mut pending = HashMap::new();
        pending.insert(7, reply);
        assert_eq!(prune_abandoned(&mut pending), 1);
    }
}
