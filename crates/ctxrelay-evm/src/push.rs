//! `WsLogSubscription`: push source over `eth_subscribe("logs", filter)`.
//!
//! One background task owns the socket. Logs are forwarded into a bounded
//! channel whose receiver is the returned [`LogStream`]. When the socket drops
//! the task reconnects with exponential backoff and re-subscribes; the stream
//! ends only when its receiver is dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use ctxrelay_core::error::RelayError;
use ctxrelay_core::source::{LogStream, LogSubscription};
use ctxrelay_core::types::{LogFilter, RawLog};

const CHANNEL_CAPACITY: usize = 512;

/// WebSocket log subscription with auto-reconnect.
pub struct WsLogSubscription {
    url: String,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

impl WsLogSubscription {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }

    /// Override the reconnect backoff bounds.
    pub fn with_reconnect(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial = initial;
        self.reconnect_max = max.max(initial);
        self
    }
}

#[async_trait]
impl LogSubscription for WsLogSubscription {
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogStream, RelayError> {
        let (tx, rx) = mpsc::channel::<RawLog>(CHANNEL_CAPACITY);
        let task = SubscriptionTask {
            url: self.url.clone(),
            filter: filter.to_json(),
            reconnect_initial: self.reconnect_initial,
            reconnect_max: self.reconnect_max,
        };
        tokio::spawn(task.run(tx));
        Ok(Box::pin(rx))
    }
}

struct SubscriptionTask {
    url: String,
    filter: Value,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

enum SessionEnd {
    /// The consumer dropped the stream.
    ReceiverGone,
    /// Socket failed or closed; reconnect.
    Disconnected { established: bool },
}

impl SubscriptionTask {
    async fn run(self, mut tx: mpsc::Sender<RawLog>) {
        let mut delay = self.reconnect_initial;
        loop {
            match self.session(&mut tx).await {
                SessionEnd::ReceiverGone => {
                    info!(url = %self.url, "log subscription closed by consumer");
                    return;
                }
                SessionEnd::Disconnected { established } => {
                    if tx.is_closed() {
                        return;
                    }
                    if established {
                        delay = self.reconnect_initial;
                    }
                    warn!(url = %self.url, delay = ?delay, "log subscription lost, reconnecting");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.reconnect_max);
                }
            }
        }
    }

    /// One connect-subscribe-read cycle.
    async fn session(&self, tx: &mut mpsc::Sender<RawLog>) -> SessionEnd {
        let ws = match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(url = %self.url, error = %e, "WebSocket connect failed");
                return SessionEnd::Disconnected { established: false };
            }
        };
        let (mut write, mut read) = ws.split();

        let sub_msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", self.filter],
        });
        if let Err(e) = write.send(Message::Text(sub_msg.to_string())).await {
            warn!(error = %e, "failed to send eth_subscribe");
            return SessionEnd::Disconnected { established: false };
        }
        info!(url = %self.url, "log subscription requested");
        let mut established = false;

        while let Some(msg) = read.next().await {
            match msg {
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Disconnected { established };
                }
                Ok(Message::Text(text)) => match parse_frame(&text) {
                    Frame::Log(log) => {
                        if tx.send(log).await.is_err() {
                            return SessionEnd::ReceiverGone;
                        }
                    }
                    Frame::Subscribed(id) => {
                        established = true;
                        info!(subscription = %id, "log subscription established");
                    }
                    Frame::Rejected(reason) => {
                        warn!(reason = %reason, "eth_subscribe rejected");
                        return SessionEnd::Disconnected { established: false };
                    }
                    Frame::Other => {}
                },
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    info!(url = %self.url, "WebSocket closed by server");
                    return SessionEnd::Disconnected { established };
                }
                Ok(_) => {}
            }
        }
        SessionEnd::Disconnected { established }
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Log(RawLog),
    Subscribed(String),
    Rejected(String),
    Other,
}

/// Classify one text frame from the node.
fn parse_frame(text: &str) -> Frame {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        return Frame::Other;
    };

    if v.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let Some(result) = v.get("params").and_then(|p| p.get("result")) else {
            return Frame::Other;
        };
        return match serde_json::from_value::<RawLog>(result.clone()) {
            Ok(log) => Frame::Log(log),
            Err(e) => {
                debug!(error = %e, "unparseable eth_subscription payload");
                Frame::Other
            }
        };
    }

    if let Some(err) = v.get("error") {
        return Frame::Rejected(err.to_string());
    }
    match v.get("result").and_then(Value::as_str) {
        Some(id) => Frame::Subscribed(id.to_string()),
        None => Frame::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_notification() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0x9ce59a13059e417087c02d3236a0b1cc",
                "result": {
                    "address": "0x1111111111111111111111111111111111111111",
                    "topics": ["0xfb0e"],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "transactionHash": "0xabc",
                    "logIndex": "0x1",
                    "removed": false
                }
            }
        }"#;
        let Frame::Log(log) = parse_frame(text) else {
            panic!("expected a log frame");
        };
        assert_eq!(log.block_number(), Some(16));
        assert_eq!(log.log_index(), Some(1));
        assert!(!log.removed);
    }

    #[test]
    fn removed_logs_are_forwarded_for_the_decoder() {
        let text = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0x1","result":{"address":"0x1","topics":[],"data":"0x","removed":true}}}"#;
        assert!(matches!(parse_frame(text), Frame::Log(log) if log.removed));
    }

    #[test]
    fn classifies_control_frames() {
        assert_eq!(
            parse_frame(r#"{"jsonrpc":"2.0","id":1,"result":"0xcd0c3e8af590364c09d0fa6a1210faf5"}"#),
            Frame::Subscribed("0xcd0c3e8af590364c09d0fa6a1210faf5".into())
        );
        assert!(matches!(
            parse_frame(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"not supported"}}"#),
            Frame::Rejected(_)
        ));
        assert_eq!(parse_frame("garbage"), Frame::Other);
    }
}
