//! Shared types for the relay pipeline.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Default number of rows returned by an event query.
pub const DEFAULT_QUERY_LIMIT: u32 = 200;
/// Upper bound on the number of rows a single query may return.
pub const MAX_QUERY_LIMIT: u32 = 1000;

// ─── ContextEvent ─────────────────────────────────────────────────────────────

/// A decoded `ContextWritten` log, as stored and broadcast.
///
/// Immutable once stored. `(tx_hash, log_index)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEvent {
    /// Network the event was observed on (e.g. `8453` for Base).
    pub network_id: u64,
    /// Block that included the emitting transaction.
    pub block_number: u64,
    /// Transaction hash (`0x…`, lowercase).
    pub tx_hash: String,
    /// Log index within the block.
    pub log_index: u32,
    /// Unix timestamp of the block (seconds).
    pub block_timestamp: i64,
    /// Topic the context was written under (`bytes32`).
    pub topic_hash: String,
    /// Per-topic sequence number assigned by the source contract.
    pub sequence_number: u64,
    /// Writer address (EIP-55 checksummed).
    pub author: String,
    pub payload_hash: String,
    pub uri_hash: String,
    pub meta_hash: String,
    pub context_id: String,
}

impl ContextEvent {
    /// The natural key of this event.
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash.to_ascii_lowercase(),
            log_index: self.log_index,
        }
    }
}

/// Uniqueness key for stored events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub tx_hash: String,
    pub log_index: u32,
}

// ─── SourceAddress ────────────────────────────────────────────────────────────

/// Address of the contract whose logs are relayed.
///
/// Always 42 characters (`0x` + 40 hex digits); stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceAddress(String);

impl SourceAddress {
    /// Validate and normalize an address string.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.trim();
        let valid = raw.len() == 42
            && raw.starts_with("0x")
            && raw[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(RelayError::Config(format!(
                "source address must be 0x followed by 40 hex digits, got {raw:?}"
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `other` names the same address, ignoring case.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl std::fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SourceAddress {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourceAddress> for String {
    fn from(addr: SourceAddress) -> Self {
        addr.0
    }
}

// ─── Queries ──────────────────────────────────────────────────────────────────

/// Filtered history query. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    /// Exact topic hash match.
    pub topic: Option<String>,
    /// Author match, case-insensitive.
    pub author: Option<String>,
    /// Maximum number of rows.
    pub limit: u32,
}

impl EventQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            topic: None,
            author: None,
            limit,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Returns `true` if `event` passes the topic and author filters.
    pub fn matches(&self, event: &ContextEvent) -> bool {
        let topic_ok = self
            .topic
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(&event.topic_hash));
        let author_ok = self
            .author
            .as_deref()
            .map_or(true, |a| a.eq_ignore_ascii_case(&event.author));
        topic_ok && author_ok
    }
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_LIMIT)
    }
}

/// Clamp a requested limit into `[1, MAX_QUERY_LIMIT]`, using `default` when absent.
pub fn clamp_limit(requested: Option<i64>, default: u32) -> u32 {
    match requested {
        None => default,
        Some(n) => n.clamp(1, MAX_QUERY_LIMIT as i64) as u32,
    }
}

/// Number of stored events for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: u64,
}

// ─── Raw logs ─────────────────────────────────────────────────────────────────

/// A raw EVM log as returned by `eth_getLogs` or pushed by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: Option<String>,
    #[serde(rename = "logIndex")]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    /// Block number, if present and well-formed.
    pub fn block_number(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }

    /// Log index, if present and well-formed.
    pub fn log_index(&self) -> Option<u32> {
        self.log_index
            .as_deref()
            .and_then(parse_hex_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Sort key for in-order processing. Malformed positions sort last.
    pub fn position(&self) -> (u64, u32) {
        (
            self.block_number().unwrap_or(u64::MAX),
            self.log_index().unwrap_or(u32::MAX),
        )
    }
}

/// Address + event-signature filter handed to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: SourceAddress,
    /// keccak256 of the event signature (`0x…`).
    pub topic0: String,
}

impl LogFilter {
    pub fn new(address: SourceAddress, topic0: impl Into<String>) -> Self {
        Self {
            address,
            topic0: topic0.into(),
        }
    }

    /// JSON filter object as used by `eth_getLogs` / `eth_subscribe("logs")`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "address": self.address.as_str(),
            "topics": [self.topic0],
        })
    }
}

/// Parse a `0x`-prefixed (or bare) hex quantity.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Encode a block number as a JSON-RPC hex quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
