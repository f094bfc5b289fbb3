//! Router-level tests: requests go through the full axum stack via `oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use ctxrelay_core::error::RelayError;
use ctxrelay_core::hub::{BroadcastHub, HubConfig};
use ctxrelay_core::metrics::RelayMetrics;
use ctxrelay_core::source::SourceClient;
use ctxrelay_core::status::{IngestState, StatusHandle};
use ctxrelay_core::store::EventStore;
use ctxrelay_core::types::{ContextEvent, LogFilter, RawLog, SourceAddress};
use ctxrelay_serve::{router, with_dashboard, AppState};
use ctxrelay_storage::InMemoryStorage;

const SOURCE: &str = "0x1111111111111111111111111111111111111111";

struct FakeSource {
    head: Option<u64>,
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn current_height(&self) -> Result<u64, RelayError> {
        self.head
            .ok_or_else(|| RelayError::Rpc("connection refused".into()))
    }

    async fn get_logs(&self, _: u64, _: u64, _: &LogFilter) -> Result<Vec<RawLog>, RelayError> {
        Ok(vec![])
    }

    async fn block_timestamp(&self, _: u64) -> Result<i64, RelayError> {
        Ok(0)
    }
}

fn event(topic: &str, author: &str, block: u64) -> ContextEvent {
    ContextEvent {
        network_id: 8453,
        block_number: block,
        tx_hash: format!("0x{block:064x}"),
        log_index: 0,
        block_timestamp: 1_700_000_000,
        topic_hash: topic.into(),
        sequence_number: block,
        author: author.into(),
        payload_hash: "0x01".into(),
        uri_hash: "0x02".into(),
        meta_hash: "0x03".into(),
        context_id: "0x04".into(),
    }
}

struct Harness {
    state: AppState,
    store: Arc<InMemoryStorage>,
}

impl Harness {
    fn new(head: Option<u64>) -> Self {
        Self::with_hub(head, BroadcastHub::default())
    }

    fn with_hub(head: Option<u64>, hub: BroadcastHub) -> Self {
        let store = Arc::new(InMemoryStorage::new());
        let state = AppState {
            store: store.clone(),
            hub,
            source: Arc::new(FakeSource { head }),
            status: StatusHandle::new(),
            metrics: Arc::new(RelayMetrics::new()),
            network_id: 8453,
            source_address: SourceAddress::parse(SOURCE).unwrap(),
        };
        Self { state, store }
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    async fn seed(&self, events: &[ContextEvent]) {
        for e in events {
            self.store.insert(e).await.unwrap();
        }
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn blocks(body: &Value) -> Vec<u64> {
    body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["blockNumber"].as_u64().unwrap())
        .collect()
}

// ─── /events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn events_filtered_by_topic_newest_first() {
    let h = Harness::new(Some(100));
    h.seed(&[
        event("0xa", "0xAbC", 10),
        event("0xb", "0xAbC", 11),
        event("0xa", "0xdef", 12),
        event("0xb", "0xdef", 13),
        event("0xa", "0xAbC", 14),
    ])
    .await;

    let (status, body) = get_json(h.app(), "/events?topic=0xa").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocks(&body), vec![14, 12, 10]);
    assert_eq!(body["events"][0]["topicHash"], "0xa");

    let (_, body) = get_json(h.app(), "/events?topic=0xa&limit=2").await;
    assert_eq!(blocks(&body), vec![14, 12]);

    let (_, body) = get_json(h.app(), "/events?author=0xABC").await;
    assert_eq!(blocks(&body), vec![14, 11, 10]);

    let (_, body) = get_json(h.app(), "/events?topic=&author=").await;
    assert_eq!(blocks(&body).len(), 5);
}

#[tokio::test]
async fn events_limit_is_clamped() {
    let h = Harness::new(Some(100));
    h.seed(&[event("0xa", "0x1", 1), event("0xa", "0x1", 2)]).await;

    let (status, body) = get_json(h.app(), "/events?limit=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocks(&body), vec![2]);

    let (_, body) = get_json(h.app(), "/events?limit=100000").await;
    assert_eq!(blocks(&body).len(), 2);
}

#[tokio::test]
async fn events_non_numeric_limit_is_bad_request() {
    let h = Harness::new(Some(100));
    let (status, body) = get_json(h.app(), "/events?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

// ─── /topics ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn topics_ordered_by_count() {
    let h = Harness::new(Some(100));
    h.seed(&[
        event("0xa", "0x1", 1),
        event("0xb", "0x1", 2),
        event("0xa", "0x1", 3),
        event("0xb", "0x1", 4),
        event("0xa", "0x1", 5),
    ])
    .await;

    let (status, body) = get_json(h.app(), "/topics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topics"][0]["topic"], "0xa");
    assert_eq!(body["topics"][0]["count"], 3);
    assert_eq!(body["topics"][1]["count"], 2);

    let (_, body) = get_json(h.app(), "/topics?limit=1").await;
    assert_eq!(body["topics"].as_array().unwrap().len(), 1);
}

// ─── /health, /metrics ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_position_and_lag() {
    let h = Harness::new(Some(105));
    h.state.status.set_frontier(101);
    h.state.status.set_state(IngestState::Steady);

    let (status, body) = get_json(h.app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["networkId"], 8453);
    assert_eq!(body["sourceAddress"], SOURCE);
    assert_eq!(body["latestHeight"], 105);
    assert_eq!(body["frontier"], 101);
    assert_eq!(body["lag"], 5);
    assert_eq!(body["state"], "steady");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn health_is_503_when_upstream_unreachable() {
    let h = Harness::new(None);
    h.state.status.set_frontier(77);
    h.seed(&[event("0xa", "0x1", 1)]).await;

    let (status, body) = get_json(h.app(), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
    assert_eq!(body["frontier"], 77);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));

    // History keeps serving.
    let (status, body) = get_json(h.app(), "/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocks(&body), vec![1]);
}

#[tokio::test]
async fn metrics_include_counters_and_gauges() {
    let h = Harness::new(Some(1));
    h.seed(&[event("0xa", "0x1", 1), event("0xa", "0x1", 2)]).await;
    h.state.metrics.record_inserted();
    h.state.metrics.record_skipped();
    let _sub = h.state.hub.subscribe().unwrap();

    let (status, body) = get_json(h.app(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eventsInserted"], 1);
    assert_eq!(body["decodeSkipped"], 1);
    assert_eq!(body["storedEvents"], 2);
    assert_eq!(body["subscribers"], 1);
}

// ─── dashboard fallback ───────────────────────────────────────────────────────

const PUBLIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../public");

async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn dashboard_served_beside_api() {
    let h = Harness::new(Some(10));
    h.seed(&[event("0xa", "0x1", 3)]).await;

    let (status, page) = get_text(with_dashboard(h.app(), PUBLIC_DIR), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("ctxrelay monitor"));

    let (status, script) = get_text(with_dashboard(h.app(), PUBLIC_DIR), "/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(script.contains("new EventSource('/stream')"));
    assert!(script.contains("/events?"));

    let (status, body) = get_json(with_dashboard(h.app(), PUBLIC_DIR), "/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocks(&body), vec![3]);

    let (status, _) = get_text(with_dashboard(h.app(), PUBLIC_DIR), "/missing.html").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_paths_are_404_without_dashboard() {
    let h = Harness::new(Some(10));
    let (status, _) = get_text(h.app(), "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── /stream ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_sends_hello_then_context_events() {
    let h = Harness::new(Some(1));
    let resp = h
        .app()
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.state.hub.len(), 1);

    let mut body = resp.into_body().into_data_stream();
    let hello = body.next().await.unwrap().unwrap();
    let hello = String::from_utf8(hello.to_vec()).unwrap();
    assert!(hello.contains("event: hello"));
    assert!(hello.contains("\"networkId\":8453"));

    h.state.hub.publish(&event("0xfeed", "0x1", 42));
    let frame = body.next().await.unwrap().unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.contains("event: context"));
    assert!(frame.contains("\"topicHash\":\"0xfeed\""));
    assert!(frame.contains("\"blockNumber\":42"));

    drop(body);
    assert!(h.state.hub.is_empty());
}

#[tokio::test]
async fn stream_rejects_beyond_subscriber_limit() {
    let hub = BroadcastHub::new(HubConfig {
        max_subscribers: 1,
        subscriber_buffer: 4,
    });
    let h = Harness::with_hub(Some(1), hub);

    let first = h
        .app()
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let (status, body) = get_json(h.app(), "/stream").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "unavailable");

    drop(first);
    assert!(h.state.hub.is_empty());
}
