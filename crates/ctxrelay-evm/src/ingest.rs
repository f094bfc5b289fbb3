//! The ingest engine: chunked scan loop plus the shared log sink.
//!
//! # Scan loop
//! 1. Read the head; `target = head - confirmation_depth`.
//! 2. Nothing new (`frontier > target`): sleep the poll interval.
//! 3. Otherwise scan `[frontier, target]` in chunks. For each chunk: fetch logs
//!    → [`LogSink::ingest`] → persist `frontier = chunk_end + 1`.
//!
//! # Push path
//! [`spawn_push`] feeds logs from a [`LogSubscription`] through the same
//! [`LogSink`]. It never touches the checkpoint; duplicates across both paths
//! collapse in the store's uniqueness constraint.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use ctxrelay_core::backoff::Backoff;
use ctxrelay_core::checkpoint::{resolve_start, CheckpointKey, CheckpointManager, CheckpointStore};
use ctxrelay_core::config::IngestConfig;
use ctxrelay_core::error::RelayError;
use ctxrelay_core::hub::BroadcastHub;
use ctxrelay_core::metrics::RelayMetrics;
use ctxrelay_core::source::{LogSubscription, SourceClient};
use ctxrelay_core::status::{state_for, IngestState, StatusHandle};
use ctxrelay_core::store::{EventStore, InsertOutcome};
use ctxrelay_core::types::{LogFilter, RawLog};

use crate::decoder::{context_filter, ContextDecoder};

/// Per-batch ingest totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Decode → timestamp → insert → publish. The only caller of the insert path.
pub struct LogSink {
    network_id: u64,
    decoder: ContextDecoder,
    source: Arc<dyn SourceClient>,
    store: Arc<dyn EventStore>,
    hub: BroadcastHub,
    metrics: Arc<RelayMetrics>,
}

impl LogSink {
    pub fn new(
        config: &IngestConfig,
        source: Arc<dyn SourceClient>,
        store: Arc<dyn EventStore>,
        hub: BroadcastHub,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            network_id: config.network_id,
            decoder: ContextDecoder::new(config.source_address.clone()),
            source,
            store,
            hub,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Process a batch of raw logs in `(block_number, log_index)` order.
    ///
    /// Undecodable logs are skipped. Any source or store error aborts the
    /// batch; events inserted before the error stay inserted.
    pub async fn ingest(&self, mut logs: Vec<RawLog>) -> Result<SinkReport, RelayError> {
        self.metrics.record_fetched(logs.len());
        logs.sort_by_key(RawLog::position);

        let mut report = SinkReport::default();
        let mut timestamps: HashMap<u64, i64> = HashMap::new();

        for log in &logs {
            let decoded = match self.decoder.decode(log) {
                Ok(d) => d,
                Err(reason) => {
                    self.metrics.record_skipped();
                    report.skipped += 1;
                    tracing::warn!(
                        tx_hash = log.tx_hash.as_deref().unwrap_or("-"),
                        log_index = log.log_index.as_deref().unwrap_or("-"),
                        %reason,
                        "skipping undecodable log"
                    );
                    continue;
                }
            };

            let block_timestamp = match timestamps.get(&decoded.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self.source.block_timestamp(decoded.block_number).await?;
                    timestamps.insert(decoded.block_number, ts);
                    ts
                }
            };

            let event = decoded.into_event(self.network_id, block_timestamp);
            match self.store.insert(&event).await? {
                InsertOutcome::Inserted => {
                    self.metrics.record_inserted();
                    report.inserted += 1;
                    let delivered = self.hub.publish(&event);
                    self.metrics.record_published(delivered);
                    tracing::debug!(
                        block = event.block_number,
                        tx_hash = %event.tx_hash,
                        log_index = event.log_index,
                        topic = %event.topic_hash,
                        seq = event.sequence_number,
                        delivered,
                        "context event stored"
                    );
                }
                InsertOutcome::Duplicate => {
                    self.metrics.record_duplicate();
                    report.duplicates += 1;
                    tracing::debug!(
                        tx_hash = %event.tx_hash,
                        log_index = event.log_index,
                        "duplicate context event ignored"
                    );
                }
            }
        }
        Ok(report)
    }
}

/// Result of one scan iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Chunks fully processed and checkpointed.
    pub chunks: u64,
    /// Frontier after the iteration.
    pub frontier: u64,
    pub head: u64,
}

/// Drives the chunked scan and owns the checkpoint.
pub struct IngestEngine {
    config: IngestConfig,
    source: Arc<dyn SourceClient>,
    sink: Arc<LogSink>,
    checkpoint: CheckpointManager,
    filter: LogFilter,
    status: StatusHandle,
    frontier: Option<u64>,
}

impl IngestEngine {
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn SourceClient>,
        sink: Arc<LogSink>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let key = CheckpointKey::new(config.network_id, config.source_address.clone());
        Self {
            filter: context_filter(config.source_address.clone()),
            checkpoint: CheckpointManager::new(checkpoints, key),
            status: StatusHandle::new(),
            frontier: None,
            config,
            source,
            sink,
        }
    }

    /// Share an existing status handle (e.g. with the HTTP layer).
    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// The `(address, topic0)` filter used for scanning and push.
    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    /// Next block to scan, once resolved.
    pub fn frontier(&self) -> Option<u64> {
        self.frontier
    }

    /// Resolve the starting frontier: saved checkpoint, else `start_block`,
    /// else `head - backfill_depth`.
    ///
    /// A checkpoint read failure is returned as-is; only a head lookup failure
    /// is [`RelayError::Rpc`].
    pub async fn start(&mut self) -> Result<u64, RelayError> {
        if let Some(frontier) = self.frontier {
            return Ok(frontier);
        }
        self.status.set_state(IngestState::Starting);

        let saved = self.checkpoint.load().await?;
        let frontier = match (saved, self.config.start_block) {
            (Some(f), _) => f,
            (None, Some(b)) => b,
            (None, None) => {
                let head = self.source.current_height().await?;
                self.status.set_head(head);
                resolve_start(None, None, head, self.config.backfill_depth)
            }
        };

        tracing::info!(
            key = %self.checkpoint.key(),
            frontier,
            resumed = saved.is_some(),
            "ingest frontier resolved"
        );
        self.frontier = Some(frontier);
        self.status.set_frontier(frontier);
        self.status.set_state(IngestState::CatchingUp);
        Ok(frontier)
    }

    /// Scan everything between the frontier and the confirmed head once.
    pub async fn scan_once(&mut self) -> Result<ScanOutcome, RelayError> {
        let mut frontier = self.start().await?;
        let head = self.source.current_height().await?;
        self.status.set_head(head);

        let chunk = self.config.chunk_size.max(1);
        let target = head.saturating_sub(self.config.confirmation_depth);
        let mut chunks = 0;

        while frontier <= target {
            let from = frontier;
            let to = from.saturating_add(chunk - 1).min(target);

            let logs = self.source.get_logs(from, to, &self.filter).await?;
            let fetched = logs.len();
            let report = self.sink.ingest(logs).await?;

            self.checkpoint.advance(to + 1).await?;
            frontier = to + 1;
            chunks += 1;
            self.frontier = Some(frontier);
            self.status.set_frontier(frontier);
            self.status.set_state(state_for(frontier, target, chunk));
            self.sink.metrics().record_chunk();

            tracing::info!(
                from,
                to,
                target,
                fetched,
                inserted = report.inserted,
                duplicates = report.duplicates,
                skipped = report.skipped,
                "chunk complete"
            );
        }

        self.status.set_state(state_for(frontier, target, chunk));
        Ok(ScanOutcome {
            chunks,
            frontier,
            head,
        })
    }

    /// Run forever. Returns only on a fatal error: a failed checkpoint write,
    /// or a checkpoint read failure at startup.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let poll = self.config.poll_interval();
        let mut backoff = Backoff::new(self.config.retry, poll);

        tracing::info!(
            network_id = self.config.network_id,
            source = %self.config.source_address,
            chunk_size = self.config.chunk_size,
            confirmation_depth = self.config.confirmation_depth,
            "ingest engine starting"
        );

        loop {
            match self.scan_once().await {
                Ok(_) => {
                    if backoff.succeed() {
                        tracing::info!("upstream recovered");
                    }
                    tokio::time::sleep(poll).await;
                }
                Err(e) => {
                    let starting = self.frontier.is_none();
                    if e.is_fatal() || (starting && !matches!(e, RelayError::Rpc(_))) {
                        tracing::error!(error = %e, "ingest engine stopping");
                        return Err(e);
                    }
                    self.sink.metrics().record_upstream_error();
                    let delay = backoff.fail();
                    if backoff.just_tripped() {
                        tracing::error!(
                            failures = backoff.failures(),
                            error = %e,
                            "upstream failing repeatedly, still retrying"
                        );
                    }
                    if backoff.is_tripped() {
                        self.status.set_state(IngestState::Degraded);
                    }
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "scan iteration failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Feed a push subscription through `sink` until the stream ends.
pub fn spawn_push(
    sink: Arc<LogSink>,
    subscription: Arc<dyn LogSubscription>,
    filter: LogFilter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match subscription.subscribe(&filter).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "push subscription failed to start");
                return;
            }
        };
        tracing::info!(address = %filter.address, "push path started");

        while let Some(log) = stream.next().await {
            // The scan loop re-reads this range, so a failed push insert is not lost.
            if let Err(e) = sink.ingest(vec![log]).await {
                tracing::warn!(error = %e, "push ingest failed");
            }
        }
        tracing::info!("push stream ended");
    })
}
