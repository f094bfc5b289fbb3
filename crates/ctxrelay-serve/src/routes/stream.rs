//! Live event stream (Server-Sent Events).
//!
//! On connect the client receives a `hello` event, then one `context` event
//! per newly stored context event. There is no replay; clients that need
//! history query `/events` first.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;

use ctxrelay_core::error::RelayError;
use ctxrelay_core::types::ContextEvent;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Hello {
    ok: bool,
    network_id: u64,
    source_address: String,
}

fn context_to_sse_event(event: &ContextEvent) -> Event {
    Event::default()
        .event("context")
        .json_data(event)
        .unwrap_or_else(|_| Event::default().comment("serialization error"))
}

/// `GET /stream`
pub async fn stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Register before responding so nothing published after the hello is missed.
    let subscription = state.hub.subscribe().map_err(|e| match e {
        RelayError::SubscriberLimit { .. } => ApiError::Unavailable(e.to_string()),
        other => ApiError::Internal(other),
    })?;
    tracing::info!(subscriber = subscription.id, "SSE client connected");

    let hello = Event::default()
        .event("hello")
        .json_data(Hello {
            ok: true,
            network_id: state.network_id,
            source_address: state.source_address.to_string(),
        })
        .unwrap_or_else(|_| Event::default().comment("serialization error"));

    // The subscription lives inside the stream; dropping the response
    // unregisters it.
    let live = stream::unfold(subscription, |mut sub| async move {
        let event = sub.recv().await?;
        Some((Ok::<_, Infallible>(context_to_sse_event(&event)), sub))
    });

    let combined = stream::once(async move { Ok::<_, Infallible>(hello) }).chain(live);

    Ok(Sse::new(combined).keep_alive(KeepAlive::default().interval(Duration::from_secs(30))))
}
