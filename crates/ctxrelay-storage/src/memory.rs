//! In-memory storage backend.
//!
//! Stores context events and checkpoints in RAM. Useful for tests and
//! short-lived relays that don't need persistence.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use ctxrelay_core::checkpoint::{Checkpoint, CheckpointKey, CheckpointStore, MemoryCheckpointStore};
use ctxrelay_core::error::RelayError;
use ctxrelay_core::store::{EventStore, InsertOutcome};
use ctxrelay_core::types::{ContextEvent, EventKey, EventQuery, TopicCount};

#[derive(Default)]
struct Events {
    rows: Vec<ContextEvent>,
    keys: HashSet<EventKey>,
}

/// In-memory relay storage.
///
/// Inserts run under a single mutex, so the uniqueness check and the write
/// are atomic. All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    events: Mutex<Events>,
    checkpoints: MemoryCheckpointStore,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event in insertion order.
    pub fn all_events(&self) -> Vec<ContextEvent> {
        self.events.lock().rows.clone()
    }
}

#[async_trait]
impl EventStore for InMemoryStorage {
    async fn insert(&self, event: &ContextEvent) -> Result<InsertOutcome, RelayError> {
        let mut events = self.events.lock();
        if !events.keys.insert(event.key()) {
            return Ok(InsertOutcome::Duplicate);
        }
        events.rows.push(event.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<ContextEvent>, RelayError> {
        let events = self.events.lock();
        let mut matched: Vec<ContextEvent> = events
            .rows
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index))
        });
        matched.truncate(query.limit as usize);
        Ok(matched)
    }

    async fn topic_counts(&self, limit: u32) -> Result<Vec<TopicCount>, RelayError> {
        let events = self.events.lock();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for e in &events.rows {
            *counts.entry(e.topic_hash.as_str()).or_default() += 1;
        }
        let mut out: Vec<TopicCount> = counts
            .into_iter()
            .map(|(topic, count)| TopicCount {
                topic: topic.to_string(),
                count,
            })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn count(&self) -> Result<u64, RelayError> {
        Ok(self.events.lock().rows.len() as u64)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, RelayError> {
        self.checkpoints.get(key).await
    }

    async fn set(&self, key: &CheckpointKey, frontier: u64) -> Result<(), RelayError> {
        self.checkpoints.set(key, frontier).await
    }
}
