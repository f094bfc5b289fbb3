//! Checkpoint management: the durable, resumable scan frontier.
//!
//! The persisted value is the *frontier*: the next block that has not yet been
//! fully processed. It is written only after every log of a chunk has been
//! handled, so a crash mid-chunk causes that chunk to be re-scanned rather than
//! skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::types::SourceAddress;

/// Checkpoint key: one frontier per `(network, source address)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub network_id: u64,
    pub source_address: SourceAddress,
}

impl CheckpointKey {
    pub fn new(network_id: u64, source_address: SourceAddress) -> Self {
        Self {
            network_id,
            source_address,
        }
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.network_id, self.source_address)
    }
}

/// A persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: CheckpointKey,
    /// Next block to scan.
    pub frontier: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Durable key → frontier mapping.
///
/// `set` is last-write-wins; monotonicity is enforced one level up by
/// [`CheckpointManager`].
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, RelayError>;

    async fn set(&self, key: &CheckpointKey, frontier: u64) -> Result<(), RelayError>;
}

/// Resolve where scanning starts.
///
/// Priority: saved checkpoint, then the explicit start block, then
/// `head - backfill_depth` floored at zero.
pub fn resolve_start(
    saved: Option<u64>,
    start_block: Option<u64>,
    head: u64,
    backfill_depth: u64,
) -> u64 {
    saved
        .or(start_block)
        .unwrap_or_else(|| head.saturating_sub(backfill_depth))
}

/// Owns the frontier for one ingest engine and refuses to move it backwards.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    key: CheckpointKey,
    /// Last value persisted (or loaded) by this manager.
    persisted: Option<u64>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, key: CheckpointKey) -> Self {
        Self {
            store,
            key,
            persisted: None,
        }
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    /// Load the saved frontier, if any.
    pub async fn load(&mut self) -> Result<Option<u64>, RelayError> {
        let frontier = self.store.get(&self.key).await?.map(|cp| cp.frontier);
        self.persisted = frontier;
        Ok(frontier)
    }

    /// Last frontier this manager knows to be durable.
    pub fn persisted(&self) -> Option<u64> {
        self.persisted
    }

    /// Persist a new frontier.
    ///
    /// Values at or below the persisted one are ignored (returns `false`).
    /// A storage failure is reported as [`RelayError::CheckpointWrite`].
    pub async fn advance(&mut self, frontier: u64) -> Result<bool, RelayError> {
        if let Some(current) = self.persisted {
            if frontier <= current {
                if frontier < current {
                    tracing::warn!(
                        key = %self.key,
                        current,
                        requested = frontier,
                        "refusing to move checkpoint backwards"
                    );
                }
                return Ok(false);
            }
        }
        self.store
            .set(&self.key, frontier)
            .await
            .map_err(|e| RelayError::CheckpointWrite {
                block: frontier,
                reason: e.to_string(),
            })?;
        self.persisted = Some(frontier);
        tracing::debug!(key = %self.key, frontier, "checkpoint saved");
        Ok(true)
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral relays.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<CheckpointKey, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, RelayError> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &CheckpointKey, frontier: u64) -> Result<(), RelayError> {
        let cp = Checkpoint {
            key: key.clone(),
            frontier,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.data.lock().insert(key.clone(), cp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CheckpointKey {
        CheckpointKey::new(
            8453,
            SourceAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
        )
    }

    struct FailingStore;

    #[async_trait]
    impl CheckpointStore for FailingStore {
        async fn get(&self, _: &CheckpointKey) -> Result<Option<Checkpoint>, RelayError> {
            Ok(None)
        }
        async fn set(&self, _: &CheckpointKey, _: u64) -> Result<(), RelayError> {
            Err(RelayError::Storage("disk full".into()))
        }
    }

    #[test]
    fn start_resolution_priority() {
        assert_eq!(resolve_start(Some(42), Some(10), 1000, 50), 42);
        assert_eq!(resolve_start(None, Some(10), 1000, 50), 10);
        assert_eq!(resolve_start(None, None, 1000, 50), 950);
        assert_eq!(resolve_start(None, None, 30, 50), 0);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store.clone(), key());

        assert_eq!(mgr.load().await.unwrap(), None);
        assert!(mgr.advance(1000).await.unwrap());

        let cp = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(cp.frontier, 1000);
        assert_eq!(cp.key.network_id, 8453);
    }

    #[tokio::test]
    async fn advance_never_decreases() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store.clone(), key());

        assert!(mgr.advance(200).await.unwrap());
        assert!(!mgr.advance(150).await.unwrap());
        assert!(!mgr.advance(200).await.unwrap());
        assert!(mgr.advance(201).await.unwrap());

        assert_eq!(store.get(&key()).await.unwrap().unwrap().frontier, 201);
    }

    #[tokio::test]
    async fn load_seeds_monotonic_floor() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        store.set(&key(), 500).await.unwrap();

        let mut mgr = CheckpointManager::new(store.clone(), key());
        assert_eq!(mgr.load().await.unwrap(), Some(500));
        assert!(!mgr.advance(400).await.unwrap());
        assert_eq!(mgr.persisted(), Some(500));
    }

    #[tokio::test]
    async fn write_failure_is_checkpoint_error() {
        let mut mgr = CheckpointManager::new(Arc::new(FailingStore), key());
        let err = mgr.advance(10).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(mgr.persisted(), None);
    }
}
