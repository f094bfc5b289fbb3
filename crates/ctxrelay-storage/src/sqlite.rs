//! SQLite storage backend.
//!
//! Persists context events and checkpoints to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use ctxrelay_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./ctxrelay.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use ctxrelay_core::checkpoint::{Checkpoint, CheckpointKey, CheckpointStore};
use ctxrelay_core::error::RelayError;
use ctxrelay_core::store::{EventStore, InsertOutcome};
use ctxrelay_core::types::{ContextEvent, EventQuery, TopicCount};

const EVENT_COLUMNS: &str = "network_id, block_number, tx_hash, log_index, block_timestamp, \
     topic_hash, sequence_number, author, payload_hash, uri_hash, meta_hash, context_id";

fn db_err(e: sqlx::Error) -> RelayError {
    RelayError::Storage(e.to_string())
}

/// SQLite-backed storage for context events and checkpoints.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./ctxrelay.db"`) or a full
    /// SQLite URL (`"sqlite:./ctxrelay.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, RelayError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        debug!(path, "sqlite storage opened");
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds exactly one connection that never expires, since every
    /// `:memory:` connection is its own database. Ideal for tests.
    pub async fn in_memory() -> Result<Self, RelayError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), RelayError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contexts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                network_id      INTEGER NOT NULL,
                block_number    INTEGER NOT NULL,
                tx_hash         TEXT    NOT NULL,
                log_index       INTEGER NOT NULL,
                block_timestamp INTEGER NOT NULL,
                topic_hash      TEXT    NOT NULL,
                sequence_number INTEGER NOT NULL,
                author          TEXT    NOT NULL,
                payload_hash    TEXT    NOT NULL,
                uri_hash        TEXT    NOT NULL,
                meta_hash       TEXT    NOT NULL,
                context_id      TEXT    NOT NULL,
                UNIQUE (tx_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_contexts_topic ON contexts (topic_hash);",
            "CREATE INDEX IF NOT EXISTS idx_contexts_author ON contexts (lower(author));",
            "CREATE INDEX IF NOT EXISTS idx_contexts_timestamp ON contexts (block_timestamp);",
            "CREATE INDEX IF NOT EXISTS idx_contexts_position ON contexts (block_number, log_index);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                network_id     INTEGER NOT NULL,
                source_address TEXT    NOT NULL,
                frontier       INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL,
                PRIMARY KEY (network_id, source_address)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

fn row_to_event(row: &SqliteRow) -> ContextEvent {
    ContextEvent {
        network_id: row.get::<i64, _>("network_id") as u64,
        block_number: row.get::<i64, _>("block_number") as u64,
        tx_hash: row.get("tx_hash"),
        log_index: row.get::<i64, _>("log_index") as u32,
        block_timestamp: row.get("block_timestamp"),
        topic_hash: row.get("topic_hash"),
        sequence_number: row.get::<i64, _>("sequence_number") as u64,
        author: row.get("author"),
        payload_hash: row.get("payload_hash"),
        uri_hash: row.get("uri_hash"),
        meta_hash: row.get("meta_hash"),
        context_id: row.get("context_id"),
    }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl EventStore for SqliteStorage {
    async fn insert(&self, event: &ContextEvent) -> Result<InsertOutcome, RelayError> {
        let result = sqlx::query(&format!(
            "INSERT INTO contexts ({EVENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tx_hash, log_index) DO NOTHING"
        ))
        .bind(event.network_id as i64)
        .bind(event.block_number as i64)
        .bind(event.tx_hash.to_ascii_lowercase())
        .bind(event.log_index as i64)
        .bind(event.block_timestamp)
        .bind(&event.topic_hash)
        .bind(event.sequence_number as i64)
        .bind(&event.author)
        .bind(&event.payload_hash)
        .bind(&event.uri_hash)
        .bind(&event.meta_hash)
        .bind(&event.context_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<ContextEvent>, RelayError> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM contexts");
        let mut clauses = Vec::new();
        if query.topic.is_some() {
            clauses.push("topic_hash = lower(?)");
        }
        if query.author.is_some() {
            clauses.push("lower(author) = lower(?)");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY block_number DESC, log_index DESC LIMIT ?");

        let mut q = sqlx::query(&sql);
        if let Some(topic) = &query.topic {
            q = q.bind(topic);
        }
        if let Some(author) = &query.author {
            q = q.bind(author);
        }
        let rows = q
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn topic_counts(&self, limit: u32) -> Result<Vec<TopicCount>, RelayError> {
        let rows = sqlx::query(
            "SELECT topic_hash, COUNT(*) AS cnt FROM contexts
             GROUP BY topic_hash
             ORDER BY cnt DESC, topic_hash ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|r| TopicCount {
                topic: r.get("topic_hash"),
                count: r.get::<i64, _>("cnt") as u64,
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, RelayError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM contexts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, RelayError> {
        let row = sqlx::query(
            "SELECT frontier, updated_at FROM checkpoints
             WHERE network_id = ? AND source_address = ?",
        )
        .bind(key.network_id as i64)
        .bind(key.source_address.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Checkpoint {
            key: key.clone(),
            frontier: r.get::<i64, _>("frontier") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn set(&self, key: &CheckpointKey, frontier: u64) -> Result<(), RelayError> {
        sqlx::query(
            "INSERT INTO checkpoints (network_id, source_address, frontier, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (network_id, source_address)
             DO UPDATE SET frontier = excluded.frontier, updated_at = excluded.updated_at",
        )
        .bind(key.network_id as i64)
        .bind(key.source_address.as_str())
        .bind(frontier as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(key = %key, frontier, "checkpoint saved");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
