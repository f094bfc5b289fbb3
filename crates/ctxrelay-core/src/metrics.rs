//! OpenTelemetry ingestion counters.
//!
//! - `ctxrelay.logs_fetched`: raw logs returned by the source (scan + push)
//! - `ctxrelay.events_inserted`: logs that produced a new stored row
//! - `ctxrelay.duplicates`: inserts absorbed by the uniqueness constraint
//! - `ctxrelay.decode_skipped`: logs rejected by the decoder
//! - `ctxrelay.published`: deliveries accepted by live subscribers
//! - `ctxrelay.chunks_completed`: scan chunks whose checkpoint was persisted
//! - `ctxrelay.upstream_errors`: failed scan iterations
//!
//! Instruments are registered on an SDK meter provider with a manual reader
//! attached, so `/metrics` can collect the cumulative sums on demand.

use std::sync::{Arc, Weak};

use opentelemetry::metrics::{Counter, Meter, MeterProvider as _};
use opentelemetry_sdk::metrics::data::{ResourceMetrics, Sum, Temporality};
use opentelemetry_sdk::metrics::reader::{AggregationSelector, MetricReader, TemporalitySelector};
use opentelemetry_sdk::metrics::{
    Aggregation, InstrumentKind, ManualReader, Pipeline, SdkMeterProvider,
};
use opentelemetry_sdk::Resource;
use serde::{Deserialize, Serialize};

const LOGS_FETCHED: &str = "ctxrelay.logs_fetched";
const EVENTS_INSERTED: &str = "ctxrelay.events_inserted";
const DUPLICATES: &str = "ctxrelay.duplicates";
const DECODE_SKIPPED: &str = "ctxrelay.decode_skipped";
const PUBLISHED: &str = "ctxrelay.published";
const CHUNKS_COMPLETED: &str = "ctxrelay.chunks_completed";
const UPSTREAM_ERRORS: &str = "ctxrelay.upstream_errors";

/// Counters for one relay instance.
pub struct RelayMetrics {
    logs_fetched: Counter<u64>,
    events_inserted: Counter<u64>,
    duplicates: Counter<u64>,
    decode_skipped: Counter<u64>,
    published: Counter<u64>,
    chunks_completed: Counter<u64>,
    upstream_errors: Counter<u64>,
    reader: SharedReader,
    _provider: SdkMeterProvider,
}

/// Point-in-time view of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub logs_fetched: u64,
    pub events_inserted: u64,
    pub duplicates: u64,
    pub decode_skipped: u64,
    pub published: u64,
    pub chunks_completed: u64,
    pub upstream_errors: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let meter = provider.meter("ctxrelay");
        Self::with_meter(&meter, reader, provider)
    }

    fn with_meter(meter: &Meter, reader: SharedReader, provider: SdkMeterProvider) -> Self {
        Self {
            logs_fetched: meter
                .u64_counter(LOGS_FETCHED)
                .with_description("Raw logs returned by the source")
                .init(),
            events_inserted: meter
                .u64_counter(EVENTS_INSERTED)
                .with_description("Context events newly stored")
                .init(),
            duplicates: meter
                .u64_counter(DUPLICATES)
                .with_description("Logs already present in the store")
                .init(),
            decode_skipped: meter
                .u64_counter(DECODE_SKIPPED)
                .with_description("Logs rejected by the decoder")
                .init(),
            published: meter
                .u64_counter(PUBLISHED)
                .with_description("Deliveries accepted by live subscribers")
                .init(),
            chunks_completed: meter
                .u64_counter(CHUNKS_COMPLETED)
                .with_description("Scan chunks with a persisted checkpoint")
                .init(),
            upstream_errors: meter
                .u64_counter(UPSTREAM_ERRORS)
                .with_description("Failed scan iterations")
                .init(),
            reader,
            _provider: provider,
        }
    }

    pub fn record_fetched(&self, n: usize) {
        self.logs_fetched.add(n as u64, &[]);
    }

    pub fn record_inserted(&self) {
        self.events_inserted.add(1, &[]);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.add(1, &[]);
    }

    pub fn record_skipped(&self) {
        self.decode_skipped.add(1, &[]);
    }

    pub fn record_published(&self, deliveries: usize) {
        self.published.add(deliveries as u64, &[]);
    }

    pub fn record_chunk(&self) {
        self.chunks_completed.add(1, &[]);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.add(1, &[]);
    }

    /// Collect the current cumulative sums. A failed collection yields zeros.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut rm = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        };
        if let Err(e) = self.reader.collect(&mut rm) {
            tracing::warn!(error = %e, "metrics collection failed");
            return MetricsSnapshot::default();
        }

        let mut snap = MetricsSnapshot::default();
        for metric in rm.scope_metrics.iter().flat_map(|scope| &scope.metrics) {
            let Some(sum) = metric.data.as_any().downcast_ref::<Sum<u64>>() else {
                continue;
            };
            let total = sum.data_points.iter().map(|p| p.value).sum();
            let slot = match metric.name.as_ref() {
                LOGS_FETCHED => &mut snap.logs_fetched,
                EVENTS_INSERTED => &mut snap.events_inserted,
                DUPLICATES => &mut snap.duplicates,
                DECODE_SKIPPED => &mut snap.decode_skipped,
                PUBLISHED => &mut snap.published,
                CHUNKS_COMPLETED => &mut snap.chunks_completed,
                UPSTREAM_ERRORS => &mut snap.upstream_errors,
                _ => continue,
            };
            *slot = total;
        }
        snap
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets the provider own a registration while [`RelayMetrics`] keeps a
/// handle for on-demand collection.
#[derive(Debug, Clone)]
struct SharedReader(Arc<ManualReader>);

impl TemporalitySelector for SharedReader {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.0.temporality(kind)
    }
}

impl AggregationSelector for SharedReader {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.0.aggregation(kind)
    }
}

impl MetricReader for SharedReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.0.register_pipeline(pipeline)
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
        self.0.collect(rm)
    }

    fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
        self.0.force_flush()
    }

    fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
        self.0.shutdown()
    }
}
