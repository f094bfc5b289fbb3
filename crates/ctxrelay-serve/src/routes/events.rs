//! History endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use ctxrelay_core::types::{
    clamp_limit, ContextEvent, EventQuery, TopicCount, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT,
};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_TOPICS_LIMIT: u32 = 50;

/// Query parameters for `/events`. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsParams {
    pub topic: Option<String>,
    pub author: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicsParams {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<ContextEvent>,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicCount>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse and clamp a `limit` parameter into `[1, MAX_QUERY_LIMIT]`.
fn parse_limit(raw: Option<String>, default: u32) -> Result<u32, ApiError> {
    let Some(raw) = non_blank(raw) else {
        return Ok(default);
    };
    let digits = raw.strip_prefix('-').unwrap_or(&raw);
    match raw.parse::<i64>() {
        Ok(n) => Ok(clamp_limit(Some(n), default)),
        // Integers too large for i64 still clamp.
        Err(_) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            Ok(if raw.starts_with('-') { 1 } else { MAX_QUERY_LIMIT })
        }
        Err(_) => Err(ApiError::BadRequest(format!(
            "limit must be an integer, got {raw:?}"
        ))),
    }
}

/// `GET /events`
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let mut query = EventQuery::new(parse_limit(params.limit, DEFAULT_QUERY_LIMIT)?);
    if let Some(topic) = non_blank(params.topic) {
        query = query.topic(topic);
    }
    if let Some(author) = non_blank(params.author) {
        query = query.author(author);
    }

    let events = state.store.query(&query).await?;
    Ok(Json(EventsResponse { events }))
}

/// `GET /topics`
pub async fn list_topics(
    State(state): State<AppState>,
    Query(params): Query<TopicsParams>,
) -> Result<Json<TopicsResponse>, ApiError> {
    let limit = parse_limit(params.limit, DEFAULT_TOPICS_LIMIT)?;
    let topics = state.store.topic_counts(limit).await?;
    Ok(Json(TopicsResponse { topics }))
}
