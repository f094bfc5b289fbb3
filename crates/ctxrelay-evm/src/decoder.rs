//! `ContextWritten` log decoding.
//!
//! ```text
//! event ContextWritten(
//!     bytes32 indexed topic,
//!     uint64  indexed seq,
//!     address indexed author,
//!     bytes32 payloadHash,
//!     bytes32 uriHash,
//!     bytes32 metaHash,
//!     bytes32 contextId
//! );
//! ```
//!
//! topics = `[keccak(signature), topic, seq, author]`; data = four 32-byte words.
//! Anything that does not fit this shape is rejected with a [`SkipReason`].

use std::sync::OnceLock;

use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use ctxrelay_core::types::{ContextEvent, LogFilter, RawLog, SourceAddress};

/// Canonical ABI signature of the relayed event.
pub const CONTEXT_WRITTEN_SIGNATURE: &str =
    "ContextWritten(bytes32,uint64,address,bytes32,bytes32,bytes32,bytes32)";

const WORD: usize = 32;
const DATA_WORDS: usize = 4;

/// keccak256 of `bytes`.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

/// topic0 for an event signature string, `0x`-prefixed lowercase hex.
pub fn signature_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// topic0 of `ContextWritten`.
pub fn context_written_topic() -> &'static str {
    static TOPIC: OnceLock<String> = OnceLock::new();
    TOPIC.get_or_init(|| signature_topic(CONTEXT_WRITTEN_SIGNATURE))
}

/// The `eth_getLogs` / `eth_subscribe` filter for one source contract.
pub fn context_filter(source_address: SourceAddress) -> LogFilter {
    LogFilter::new(source_address, context_written_topic())
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Why a log was not turned into a [`ContextEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("log was removed by the node")]
    Removed,

    #[error("emitted by {0}, not the source address")]
    WrongAddress(String),

    #[error("topic0 {0} is not ContextWritten")]
    WrongSignature(String),

    #[error("expected 4 topics, got {0}")]
    TopicCount(usize),

    #[error("topic {0} is not a 32-byte hex word")]
    MalformedTopic(usize),

    #[error("sequence number does not fit in 64 bits")]
    SequenceOverflow,

    #[error("author topic is not a left-padded address")]
    MalformedAuthor,

    #[error("data must be exactly {} bytes, got {0}", DATA_WORDS * WORD)]
    DataLength(usize),

    #[error("data is not valid hex")]
    MalformedData,

    #[error("log is missing block number, transaction hash or log index")]
    MissingPosition,
}

/// A successfully decoded `ContextWritten` log, before timestamp resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWritten {
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub topic_hash: String,
    pub sequence_number: u64,
    pub author: String,
    pub payload_hash: String,
    pub uri_hash: String,
    pub meta_hash: String,
    pub context_id: String,
}

impl ContextWritten {
    pub fn into_event(self, network_id: u64, block_timestamp: i64) -> ContextEvent {
        ContextEvent {
            network_id,
            block_number: self.block_number,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
            block_timestamp,
            topic_hash: self.topic_hash,
            sequence_number: self.sequence_number,
            author: self.author,
            payload_hash: self.payload_hash,
            uri_hash: self.uri_hash,
            meta_hash: self.meta_hash,
            context_id: self.context_id,
        }
    }
}

/// Decodes raw logs emitted by one source contract.
#[derive(Debug, Clone)]
pub struct ContextDecoder {
    source_address: SourceAddress,
}

impl ContextDecoder {
    pub fn new(source_address: SourceAddress) -> Self {
        Self { source_address }
    }

    pub fn source_address(&self) -> &SourceAddress {
        &self.source_address
    }

    pub fn decode(&self, log: &RawLog) -> Result<ContextWritten, SkipReason> {
        if log.removed {
            return Err(SkipReason::Removed);
        }
        if !self.source_address.matches(&log.address) {
            return Err(SkipReason::WrongAddress(log.address.clone()));
        }
        let Some(topic0) = log.topics.first() else {
            return Err(SkipReason::TopicCount(0));
        };
        if !topic0.eq_ignore_ascii_case(context_written_topic()) {
            return Err(SkipReason::WrongSignature(topic0.clone()));
        }
        if log.topics.len() != 4 {
            return Err(SkipReason::TopicCount(log.topics.len()));
        }

        let topic = word(&log.topics[1]).ok_or(SkipReason::MalformedTopic(1))?;
        let seq = word(&log.topics[2]).ok_or(SkipReason::MalformedTopic(2))?;
        let author = word(&log.topics[3]).ok_or(SkipReason::MalformedTopic(3))?;

        if seq[..WORD - 8].iter().any(|b| *b != 0) {
            return Err(SkipReason::SequenceOverflow);
        }
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&seq[WORD - 8..]);

        if author[..12].iter().any(|b| *b != 0) {
            return Err(SkipReason::MalformedAuthor);
        }
        let mut author_bytes = [0u8; 20];
        author_bytes.copy_from_slice(&author[12..]);

        let data = hex::decode(strip_0x(&log.data)).map_err(|_| SkipReason::MalformedData)?;
        if data.len() != DATA_WORDS * WORD {
            return Err(SkipReason::DataLength(data.len()));
        }
        let hash_at = |i: usize| format!("0x{}", hex::encode(&data[i * WORD..(i + 1) * WORD]));

        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (log.block_number(), log.tx_hash.as_deref(), log.log_index())
        else {
            return Err(SkipReason::MissingPosition);
        };

        Ok(ContextWritten {
            block_number,
            tx_hash: tx_hash.to_ascii_lowercase(),
            log_index,
            topic_hash: format!("0x{}", hex::encode(topic)),
            sequence_number: u64::from_be_bytes(seq_bytes),
            author: to_checksum_address(&author_bytes),
            payload_hash: hash_at(0),
            uri_hash: hash_at(1),
            meta_hash: hash_at(2),
            context_id: hash_at(3),
        })
    }
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse one 32-byte hex word.
fn word(s: &str) -> Option<[u8; WORD]> {
    let bytes = hex::decode(strip_0x(s)).ok()?;
    bytes.try_into().ok()
}
