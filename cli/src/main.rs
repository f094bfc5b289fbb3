//! ctxrelay: relay `ContextWritten` events from an EVM node to HTTP clients.
//!
//! Usage:
//! ```bash
//! RELAY_SOURCE_ADDRESS=0x… RELAY_RPC_URL=https://… ctxrelay
//! ctxrelay info
//! ctxrelay version
//! ```

mod config;
mod logging;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use axum::http::Request;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use ctxrelay_core::hub::BroadcastHub;
use ctxrelay_core::metrics::RelayMetrics;
use ctxrelay_core::source::SourceClient;
use ctxrelay_core::status::StatusHandle;
use ctxrelay_evm::{spawn_push, IngestEngine, LogSink, RpcSourceClient, WsLogSubscription};
use ctxrelay_rpc::{HttpTransport, HttpTransportConfig, RpcTransport, WsTransport, WsTransportConfig};
use ctxrelay_serve::{router, with_dashboard, AppState};
use ctxrelay_storage::SqliteStorage;

use crate::config::{AppConfig, PollEndpoint};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("run") => run().await,
        Some("info") => {
            cmd_info();
            Ok(())
        }
        Some("version" | "--version" | "-V") => {
            println!("ctxrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("help" | "--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("ctxrelay {}", env!("CARGO_PKG_VERSION"));
    println!("Relay ContextWritten events to HTTP and SSE clients\n");
    println!("USAGE:");
    println!("    ctxrelay [COMMAND]\n");
    println!("COMMANDS:");
    println!("    run      Start ingesting and serving (default)");
    println!("    info     Show defaults and configuration variables");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    println!("ctxrelay v{}", env!("CARGO_PKG_VERSION"));
    println!("  Event: {}", ctxrelay_evm::decoder::CONTEXT_WRITTEN_SIGNATURE);
    println!("  topic0: {}", ctxrelay_evm::context_written_topic());
    println!("  Default network id: 8453");
    println!("  Default chunk size: 2000 blocks/call");
    println!("  Default backfill: 5000 blocks");
    println!("  Default database: {}", config::DEFAULT_DB_PATH);
    println!("  Default bind address: {}", config::DEFAULT_BIND_ADDR);
    println!("  Dashboard: set RELAY_PUBLIC_DIR (e.g. ./public)");
    println!("  Required: RELAY_SOURCE_ADDRESS, and RELAY_RPC_URL or RELAY_WS_URL");
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    logging::init_tracing(config.log_json);

    tracing::info!(
        network_id = config.ingest.network_id,
        source = %config.ingest.source_address,
        poll = ?config.poll,
        push = config.ws_url.is_some(),
        db = %config.db_path,
        "ctxrelay starting"
    );

    let storage = Arc::new(
        SqliteStorage::open(&config.db_path)
            .await
            .with_context(|| format!("opening database {}", config.db_path))?,
    );

    let transport: Arc<dyn RpcTransport> = match &config.poll {
        PollEndpoint::Http(url) => Arc::new(HttpTransport::new(
            url.clone(),
            HttpTransportConfig {
                request_timeout: config.request_timeout,
            },
        )?),
        PollEndpoint::Ws(url) => Arc::new(WsTransport::connect(
            url.clone(),
            WsTransportConfig {
                request_timeout: config.request_timeout,
                ..WsTransportConfig::default()
            },
        )),
    };
    let source: Arc<dyn SourceClient> = Arc::new(RpcSourceClient::new(transport));

    let hub = BroadcastHub::new(config.ingest.hub);
    let metrics = Arc::new(RelayMetrics::new());
    let status = StatusHandle::new();

    let sink = Arc::new(LogSink::new(
        &config.ingest,
        source.clone(),
        storage.clone(),
        hub.clone(),
        metrics.clone(),
    ));
    let engine = IngestEngine::new(config.ingest.clone(), source.clone(), sink.clone(), storage.clone())
        .with_status(status.clone());

    let push = config.ws_url.as_ref().map(|url| {
        spawn_push(
            sink.clone(),
            Arc::new(WsLogSubscription::new(url.clone())),
            engine.filter().clone(),
        )
    });

    let state = AppState {
        store: storage.clone(),
        hub,
        source,
        status,
        metrics,
        network_id: config.ingest.network_id,
        source_address: config.ingest.source_address.clone(),
    };

    let mut app = router(state);
    if let Some(dir) = &config.public_dir {
        tracing::info!(dir = %dir, "serving monitor dashboard");
        app = with_dashboard(app, dir);
    }

    let app = app
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "http server listening");

    let mut ingest = tokio::spawn(engine.run());
    let server = async move { axum::serve(listener, app).await };

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
        joined = &mut ingest => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("ingest engine stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("ingest task panicked")),
        },
        served = server => served.context("http server failed"),
    };

    ingest.abort();
    if let Some(push) = push {
        push.abort();
    }
    tracing::info!(ok = result.is_ok(), "ctxrelay stopped");
    result
}
