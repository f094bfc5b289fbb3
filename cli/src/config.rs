//! Environment configuration for the `ctxrelay` binary.

use std::str::FromStr;
use std::time::Duration;

use ctxrelay_core::backoff::RetryMode;
use ctxrelay_core::config::IngestConfig;
use ctxrelay_core::error::RelayError;
use ctxrelay_core::types::SourceAddress;
use ctxrelay_evm::RelayBuilder;

pub const DEFAULT_DB_PATH: &str = "./ctxrelay.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";
const DEFAULT_RETRY_MAX_MS: u64 = 60_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Where the scan loop sends its pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEndpoint {
    Http(String),
    Ws(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ingest: IngestConfig,
    pub poll: PollEndpoint,
    /// Push subscription endpoint, if any.
    pub ws_url: Option<String>,
    pub request_timeout: Duration,
    pub db_path: String,
    pub bind_addr: String,
    /// Directory served as the monitor dashboard, if any.
    pub public_dir: Option<String>,
    pub log_json: bool,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let address = var("RELAY_SOURCE_ADDRESS")
            .ok_or_else(|| RelayError::Config("RELAY_SOURCE_ADDRESS is required".into()))?;
        let source_address = SourceAddress::parse(&address)?;

        let rpc_url = var("RELAY_RPC_URL");
        let ws_url = var("RELAY_WS_URL");
        let poll = match (&rpc_url, &ws_url) {
            (Some(url), _) => PollEndpoint::Http(url.clone()),
            (None, Some(url)) => PollEndpoint::Ws(url.clone()),
            (None, None) => {
                return Err(RelayError::Config(
                    "one of RELAY_RPC_URL or RELAY_WS_URL is required".into(),
                ))
            }
        };

        let defaults = IngestConfig::new(source_address.clone());
        let mut builder = RelayBuilder::new(source_address)
            .network_id(parse_or(&var, "RELAY_NETWORK_ID", defaults.network_id)?)
            .chunk_size(parse_or(&var, "RELAY_CHUNK_SIZE", defaults.chunk_size)?)
            .poll_interval_ms(parse_or(&var, "RELAY_POLL_INTERVAL_MS", defaults.poll_interval_ms)?)
            .backfill_depth(parse_or(&var, "RELAY_BACKFILL_BLOCKS", defaults.backfill_depth)?)
            .confirmation_depth(parse_or(
                &var,
                "RELAY_CONFIRMATION_DEPTH",
                defaults.confirmation_depth,
            )?)
            .max_subscribers(parse_or(
                &var,
                "RELAY_MAX_SUBSCRIBERS",
                defaults.hub.max_subscribers,
            )?)
            .subscriber_buffer(parse_or(
                &var,
                "RELAY_SUBSCRIBER_BUFFER",
                defaults.hub.subscriber_buffer,
            )?)
            .retry(retry_mode(&var)?);
        if let Some(block) = parse_opt(&var, "RELAY_START_BLOCK")? {
            builder = builder.start_block(block);
        }

        let timeout_ms = parse_or(&var, "RELAY_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;

        Ok(Self {
            ingest: builder.build_config(),
            poll,
            ws_url,
            request_timeout: Duration::from_millis(timeout_ms),
            db_path: var("RELAY_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            bind_addr: var("RELAY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            public_dir: var("RELAY_PUBLIC_DIR"),
            log_json: parse_flag(&var, "RELAY_LOG_JSON")?,
        })
    }
}

fn parse_opt<T, F>(var: &F, key: &str) -> Result<Option<T>, RelayError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| RelayError::Config(format!("{key}: cannot parse {raw:?}"))),
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, RelayError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(var, key)?.unwrap_or(default))
}

fn parse_flag<F>(var: &F, key: &str) -> Result<bool, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(RelayError::Config(format!(
            "{key}: expected true or false, got {other:?}"
        ))),
    }
}

fn retry_mode<F>(var: &F) -> Result<RetryMode, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    match var("RELAY_RETRY_MODE").map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("fixed") => Ok(RetryMode::Fixed),
        Some("exponential") => Ok(RetryMode::Exponential {
            max_ms: parse_or(var, "RELAY_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS)?,
        }),
        Some(other) => Err(RelayError::Config(format!(
            "RELAY_RETRY_MODE: expected fixed or exponential, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SOURCE: &str = "0x1111111111111111111111111111111111111111";

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, RelayError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[
            ("RELAY_SOURCE_ADDRESS", SOURCE),
            ("RELAY_RPC_URL", "https://mainnet.base.org"),
        ])
        .unwrap();

        assert_eq!(config.poll, PollEndpoint::Http("https://mainnet.base.org".into()));
        assert_eq!(config.ws_url, None);
        assert_eq!(config.ingest.network_id, 8453);
        assert_eq!(config.ingest.chunk_size, 2000);
        assert_eq!(config.ingest.poll_interval_ms, 2000);
        assert_eq!(config.ingest.backfill_depth, 5000);
        assert_eq!(config.ingest.start_block, None);
        assert_eq!(config.ingest.confirmation_depth, 0);
        assert_eq!(config.ingest.retry, RetryMode::Fixed);
        assert_eq!(config.ingest.hub.max_subscribers, 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.public_dir, None);
        assert!(!config.log_json);
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("RELAY_SOURCE_ADDRESS", "0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD"),
            ("RELAY_WS_URL", "wss://node.example/ws"),
            ("RELAY_NETWORK_ID", "84532"),
            ("RELAY_CHUNK_SIZE", "500"),
            ("RELAY_START_BLOCK", "12000000"),
            ("RELAY_CONFIRMATION_DEPTH", "3"),
            ("RELAY_RETRY_MODE", "Exponential"),
            ("RELAY_RETRY_MAX_MS", "10000"),
            ("RELAY_LOG_JSON", "true"),
            ("RELAY_PUBLIC_DIR", "./public"),
        ])
        .unwrap();

        assert_eq!(config.poll, PollEndpoint::Ws("wss://node.example/ws".into()));
        assert_eq!(config.ws_url.as_deref(), Some("wss://node.example/ws"));
        assert_eq!(
            config.ingest.source_address.as_str(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
        assert_eq!(config.ingest.network_id, 84532);
        assert_eq!(config.ingest.chunk_size, 500);
        assert_eq!(config.ingest.start_block, Some(12_000_000));
        assert_eq!(config.ingest.confirmation_depth, 3);
        assert_eq!(config.ingest.retry, RetryMode::Exponential { max_ms: 10_000 });
        assert!(config.log_json);
        assert_eq!(config.public_dir.as_deref(), Some("./public"));
    }

    #[test]
    fn rpc_url_takes_polling_when_both_set() {
        let config = load(&[
            ("RELAY_SOURCE_ADDRESS", SOURCE),
            ("RELAY_RPC_URL", "http://localhost:8545"),
            ("RELAY_WS_URL", "ws://localhost:8546"),
        ])
        .unwrap();
        assert_eq!(config.poll, PollEndpoint::Http("http://localhost:8545".into()));
        assert_eq!(config.ws_url.as_deref(), Some("ws://localhost:8546"));
    }

    #[test]
    fn missing_or_bad_values_are_fatal() {
        assert!(matches!(
            load(&[("RELAY_RPC_URL", "http://localhost:8545")]),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            load(&[("RELAY_SOURCE_ADDRESS", "0x1234"), ("RELAY_RPC_URL", "http://x")]),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            load(&[("RELAY_SOURCE_ADDRESS", SOURCE)]),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            load(&[
                ("RELAY_SOURCE_ADDRESS", SOURCE),
                ("RELAY_RPC_URL", "http://x"),
                ("RELAY_CHUNK_SIZE", "lots"),
            ]),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            load(&[
                ("RELAY_SOURCE_ADDRESS", SOURCE),
                ("RELAY_RPC_URL", "http://x"),
                ("RELAY_RETRY_MODE", "linear"),
            ]),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[
            ("RELAY_SOURCE_ADDRESS", SOURCE),
            ("RELAY_RPC_URL", "  "),
            ("RELAY_WS_URL", "ws://localhost:8546"),
            ("RELAY_START_BLOCK", ""),
        ])
        .unwrap();
        assert_eq!(config.poll, PollEndpoint::Ws("ws://localhost:8546".into()));
        assert_eq!(config.ingest.start_block, None);
    }
}
