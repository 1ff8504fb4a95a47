//! SQLite persistence and hybrid scored retrieval for character memories.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE character_memories (
//!     id             TEXT PRIMARY KEY,
//!     character_id   TEXT NOT NULL,
//!     user_id        TEXT NOT NULL,
//!     kind           TEXT NOT NULL,
//!     content        TEXT NOT NULL,
//!     importance     REAL NOT NULL DEFAULT 0.5,
//!     access_count   INTEGER NOT NULL DEFAULT 0,
//!     source_chat_id TEXT,
//!     created_at     INTEGER NOT NULL,
//!     last_accessed  INTEGER NOT NULL,
//!     UNIQUE (character_id, user_id, content)
//! );
//! CREATE TABLE character_memory_vectors (
//!     memory_id  TEXT PRIMARY KEY REFERENCES character_memories(id) ON DELETE CASCADE,
//!     embedding  BLOB NOT NULL,
//!     created_at INTEGER NOT NULL
//! );
//! ```
//!
//! Retrieval runs as one combined query joining records to their vectors.
//! A registered `cosine_sim` scalar function computes similarity inside
//! SQLite, so full vector sets never leave the database:
//!
//! ```text
//! score = w_sim · cosine_sim(v, q) + w_imp · importance + w_rec · recency
//! recency = 1 − seconds_since_last_accessed / recency_window
//! ```
//!
//! The recency term is intentionally unclamped — stale, unimportant,
//! dissimilar memories rank below everything else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{MemoryLimits, PersistenceConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::types::{
    CharacterId, ChatId, Embedding, MemoryDraft, MemoryId, MemoryKind, MemoryRecord, MemoryTier,
    RetrievedMemory, ScoreBreakdown, UserId,
};

// ---------------------------------------------------------------------------
// Embedding <-> BLOB codec
// ---------------------------------------------------------------------------

/// Encode an embedding as little-endian f32 bytes.
fn embedding_to_blob(embedding: &Embedding) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.0.len() * 4);
    for value in &embedding.0 {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode little-endian f32 bytes back into a float vector.
fn blob_to_floats(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Register the `cosine_sim(blob, blob) -> REAL` scalar function.
fn register_cosine(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "cosine_sim",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = ctx.get_raw(0).as_blob()?;
            let b = ctx.get_raw(1).as_blob()?;
            let va = Embedding(blob_to_floats(a));
            let vb = Embedding(blob_to_floats(b));
            Ok(f64::from(va.cosine_similarity(&vb)))
        },
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Query & result types
// ---------------------------------------------------------------------------

/// Parameters for a hybrid retrieval query.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// Character scope.
    pub character_id: CharacterId,
    /// User scope.
    pub user_id: UserId,
    /// Free-text query, embedded before ranking.
    pub query: String,
    /// Restrict results to one chat session (session isolation).
    pub chat_id: Option<ChatId>,
    /// Maximum results; falls back to the configured default when `None`.
    pub limit: Option<usize>,
}

/// Outcome of a `store()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A fresh record+vector pair was written.
    Inserted(MemoryId),
    /// Identical content already existed; importance and last-accessed
    /// were refreshed instead.
    Updated(MemoryId),
    /// The per-pair ceiling was reached; the draft was dropped silently.
    Dropped,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// SQLite-backed memory store with hybrid scored retrieval.
pub struct MemoryStore {
    conn: Mutex<Connection>,
    provider: Arc<dyn EmbeddingProvider>,
    limits: MemoryLimits,
    retrieval: RetrievalConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("db_path", &self.db_path)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        persistence: &PersistenceConfig,
        limits: MemoryLimits,
        retrieval: RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if persistence.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};",
            persistence.busy_timeout_ms
        ))?;

        Self::create_schema(&conn)?;
        register_cosine(&conn)?;

        info!(path = %db_path.display(), wal = persistence.wal_mode, "memory store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            provider,
            limits,
            retrieval,
            db_path,
        })
    }

    /// Open an in-memory store (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open_in_memory(
        limits: MemoryLimits,
        retrieval: RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::create_schema(&conn)?;
        register_cosine(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            provider,
            limits,
            retrieval,
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS character_memories (
                id             TEXT PRIMARY KEY,
                character_id   TEXT NOT NULL,
                user_id        TEXT NOT NULL,
                kind           TEXT NOT NULL,
                content        TEXT NOT NULL,
                importance     REAL NOT NULL DEFAULT 0.5,
                access_count   INTEGER NOT NULL DEFAULT 0,
                source_chat_id TEXT,
                created_at     INTEGER NOT NULL,
                last_accessed  INTEGER NOT NULL,
                UNIQUE (character_id, user_id, content)
            );
            CREATE TABLE IF NOT EXISTS character_memory_vectors (
                memory_id  TEXT PRIMARY KEY
                           REFERENCES character_memories(id) ON DELETE CASCADE,
                embedding  BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_scope
                ON character_memories (character_id, user_id);",
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Store
    // ------------------------------------------------------------------

    /// Persist a memory draft for a (character, user) pair.
    ///
    /// Enforces the tier ceiling (at or over the limit the draft is dropped
    /// silently), deduplicates on `(character_id, user_id, content)` by
    /// refreshing importance and last-accessed, and writes record+vector in
    /// one transaction — a failed vector write fails the whole store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures. Embedding
    /// failures never surface here (the provider degrades to a zero vector).
    pub async fn store(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        draft: MemoryDraft,
        chat_id: Option<ChatId>,
        tier: MemoryTier,
    ) -> Result<StoreOutcome> {
        let limit = self.limits.limit_for(tier);
        let current = self.count(character_id, user_id)?;
        if current >= limit {
            warn!(
                character = %character_id,
                user = %user_id,
                current,
                limit,
                "memory ceiling reached, dropping new memory"
            );
            return Ok(StoreOutcome::Dropped);
        }

        // Embed before taking the connection lock; the call cannot fail.
        let embedding = self.provider.embed(&draft.content).await;
        let now = Utc::now().timestamp();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM character_memories
                 WHERE character_id = ?1 AND user_id = ?2 AND content = ?3",
                params![character_id.to_string(), user_id.to_string(), draft.content],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = if let Some(id_str) = existing {
            tx.execute(
                "UPDATE character_memories
                 SET importance = ?1, last_accessed = ?2
                 WHERE id = ?3",
                params![f64::from(draft.importance), now, id_str],
            )?;
            let id = parse_memory_id(&id_str)?;
            debug!(memory = %id, "re-ingested identical content, refreshed importance");
            StoreOutcome::Updated(id)
        } else {
            let id = MemoryId::new();
            tx.execute(
                "INSERT INTO character_memories
                    (id, character_id, user_id, kind, content, importance,
                     access_count, source_chat_id, created_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    character_id.to_string(),
                    user_id.to_string(),
                    draft.kind.as_str(),
                    draft.content,
                    f64::from(draft.importance),
                    chat_id.map(|c| c.to_string()),
                    now,
                ],
            )?;
            tx.execute(
                "INSERT INTO character_memory_vectors (memory_id, embedding, created_at)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), embedding_to_blob(&embedding), now],
            )?;
            debug!(memory = %id, kind = %draft.kind, "stored new memory");
            StoreOutcome::Inserted(id)
        };

        tx.commit()?;
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Retrieve
    // ------------------------------------------------------------------

    /// Rank eligible memories against a query and return the top results.
    ///
    /// Embeds the query text (fallback-safe), then delegates to
    /// [`Self::retrieve_ranked`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures.
    pub async fn retrieve(&self, query: MemoryQuery) -> Result<Vec<RetrievedMemory>> {
        let query_embedding = self.provider.embed(&query.query).await;
        self.retrieve_ranked(
            query.character_id,
            query.user_id,
            &query_embedding,
            query.chat_id,
            query.limit,
        )
    }

    /// Rank eligible memories against a pre-computed query embedding.
    ///
    /// Every returned record is touched — `access_count` incremented and
    /// `last_accessed` refreshed — as a real side effect of reading.
    /// An empty result set is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures.
    pub fn retrieve_ranked(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        query_embedding: &Embedding,
        chat_id: Option<ChatId>,
        limit: Option<usize>,
    ) -> Result<Vec<RetrievedMemory>> {
        let start = Instant::now();
        let limit = limit.unwrap_or(self.retrieval.default_limit);
        let blob = embedding_to_blob(query_embedding);
        let now = Utc::now().timestamp();

        let weights = &self.retrieval.weights;
        let window = self.retrieval.recency_window_secs as f64;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT m.id, m.content, m.kind,
                    cosine_sim(v.embedding, ?1) AS similarity,
                    m.importance,
                    1.0 - (CAST(?2 - m.last_accessed AS REAL) / ?3) AS recency,
                    (?4 * cosine_sim(v.embedding, ?1)
                     + ?5 * m.importance
                     + ?6 * (1.0 - (CAST(?2 - m.last_accessed AS REAL) / ?3))) AS score
             FROM character_memories m
             JOIN character_memory_vectors v ON v.memory_id = m.id
             WHERE m.character_id = ?7
               AND m.user_id = ?8
               AND (?9 IS NULL OR m.source_chat_id = ?9)
             ORDER BY score DESC, m.rowid ASC
             LIMIT ?10",
        )?;

        let rows = stmt.query_map(
            params![
                blob,
                now,
                window,
                weights.similarity,
                weights.importance,
                weights.recency,
                character_id.to_string(),
                user_id.to_string(),
                chat_id.map(|c| c.to_string()),
                limit as i64,
            ],
            |row| {
                let id_str: String = row.get(0)?;
                let kind_str: String = row.get(2)?;
                Ok((
                    id_str,
                    row.get::<_, String>(1)?,
                    kind_str,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (id_str, content, kind_str, similarity, importance, recency, score) = row?;
            results.push(RetrievedMemory {
                id: parse_memory_id(&id_str)?,
                content,
                kind: parse_kind(&kind_str)?,
                score,
                breakdown: ScoreBreakdown {
                    similarity,
                    importance,
                    recency,
                },
            });
        }

        // Touching is part of the read contract.
        let mut touch = conn.prepare_cached(
            "UPDATE character_memories
             SET access_count = access_count + 1, last_accessed = ?1
             WHERE id = ?2",
        )?;
        for memory in &results {
            touch.execute(params![now, memory.id.to_string()])?;
        }

        debug!(
            character = %character_id,
            results = results.len(),
            elapsed_us = start.elapsed().as_micros(),
            "hybrid retrieval complete"
        );

        Ok(results)
    }

    // ------------------------------------------------------------------
    // Inspection & maintenance
    // ------------------------------------------------------------------

    /// Delete a single memory (its vector cascades).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn delete(&self, id: MemoryId) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM character_memories WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Delete every memory for a (character, user) pair, optionally
    /// restricted to one chat session. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn delete_all(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        chat_id: Option<ChatId>,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM character_memories
             WHERE character_id = ?1 AND user_id = ?2
               AND (?3 IS NULL OR source_chat_id = ?3)",
            params![
                character_id.to_string(),
                user_id.to_string(),
                chat_id.map(|c| c.to_string())
            ],
        )?;
        info!(character = %character_id, user = %user_id, deleted, "memory wipe");
        Ok(deleted)
    }

    /// Count live memories for a (character, user) pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn count(&self, character_id: CharacterId, user_id: UserId) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM character_memories
             WHERE character_id = ?1 AND user_id = ?2",
            params![character_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Count memories per kind for a (character, user) pair.
    /// Kinds with no records are present with a zero count.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn count_by_kind(
        &self,
        character_id: CharacterId,
        user_id: UserId,
    ) -> Result<HashMap<MemoryKind, usize>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT kind, COUNT(*) FROM character_memories
             WHERE character_id = ?1 AND user_id = ?2
             GROUP BY kind",
        )?;
        let rows = stmt.query_map(
            params![character_id.to_string(), user_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut counts: HashMap<MemoryKind, usize> =
            MemoryKind::ALL.iter().map(|&k| (k, 0)).collect();
        for row in rows {
            let (kind_str, count) = row?;
            counts.insert(parse_kind(&kind_str)?, count as usize);
        }
        Ok(counts)
    }

    /// List memories for a (character, user) pair, most recently accessed
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn list(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, character_id, user_id, kind, content, importance,
                    access_count, source_chat_id, created_at, last_accessed
             FROM character_memories
             WHERE character_id = ?1 AND user_id = ?2
             ORDER BY last_accessed DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![
                character_id.to_string(),
                user_id.to_string(),
                limit as i64
            ],
            row_to_record,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    /// Path to the backing database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn parse_memory_id(s: &str) -> Result<MemoryId> {
    Uuid::parse_str(s)
        .map(MemoryId)
        .map_err(|e| EngineError::Serialization(format!("invalid memory id '{s}': {e}")))
}

fn parse_kind(s: &str) -> Result<MemoryKind> {
    s.parse().map_err(EngineError::Serialization)
}

fn parse_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn row_to_record(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<Result<MemoryRecord>, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let character_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let chat_str: Option<String> = row.get(7)?;
    let created: i64 = row.get(8)?;
    let accessed: i64 = row.get(9)?;
    let content: String = row.get(4)?;
    let importance: f64 = row.get(5)?;
    let access_count: i64 = row.get(6)?;

    Ok((|| {
        Ok(MemoryRecord {
            id: parse_memory_id(&id_str)?,
            character_id: CharacterId(
                Uuid::parse_str(&character_str)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?,
            ),
            user_id: UserId(
                Uuid::parse_str(&user_str)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?,
            ),
            kind: parse_kind(&kind_str)?,
            content,
            importance: importance as f32,
            access_count: access_count as u32,
            source_chat_id: match chat_str {
                Some(s) => Some(ChatId(
                    Uuid::parse_str(&s)
                        .map_err(|e| EngineError::Serialization(e.to_string()))?,
                )),
                None => None,
            },
            created_at: parse_timestamp(created),
            last_accessed: parse_timestamp(accessed),
        })
    })())
}

/// Extension trait adding an `.optional()` combinator to `rusqlite::Result`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NeutralProvider;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;

    /// Test provider returning fixed vectors per exact text, zero otherwise.
    struct StaticProvider {
        vectors: StdHashMap<String, Vec<f32>>,
        dims: usize,
    }

    impl StaticProvider {
        fn new(dims: usize, entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
                dims,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StaticProvider {
        async fn embed(&self, text: &str) -> Embedding {
            self.vectors
                .get(text)
                .cloned()
                .map_or_else(|| Embedding::zeros(self.dims), Embedding)
        }

        async fn analyze_sentiment(&self, _text: &str) -> crate::AffectState {
            crate::AffectState::NEUTRAL
        }

        async fn health(&self) -> bool {
            true
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }

    fn neutral_store() -> MemoryStore {
        MemoryStore::open_in_memory(
            MemoryLimits::default(),
            RetrievalConfig::default(),
            Arc::new(NeutralProvider::new(4)),
        )
        .expect("open")
    }

    fn store_with(provider: Arc<dyn EmbeddingProvider>, limits: MemoryLimits) -> MemoryStore {
        MemoryStore::open_in_memory(limits, RetrievalConfig::default(), provider).expect("open")
    }

    #[tokio::test]
    async fn store_and_count() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        let outcome = store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "User is a developer"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");

        assert!(matches!(outcome, StoreOutcome::Inserted(_)));
        assert_eq!(store.count(character, user).expect("count"), 1);
    }

    #[tokio::test]
    async fn duplicate_content_dedupes_and_refreshes_importance() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        store
            .store(
                character,
                user,
                MemoryDraft::new(MemoryKind::Preference, "User likes coffee", 0.4),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("first store");

        let second = store
            .store(
                character,
                user,
                MemoryDraft::new(MemoryKind::Preference, "User likes coffee", 0.9),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("second store");

        assert!(matches!(second, StoreOutcome::Updated(_)));
        assert_eq!(store.count(character, user).expect("count"), 1);

        let records = store.list(character, user, 10).expect("list");
        assert_eq!(records.len(), 1);
        assert!((records[0].importance - 0.9).abs() < 0.001);
    }

    #[tokio::test]
    async fn ceiling_drops_silently() {
        let limits = MemoryLimits {
            free: 2,
            ..MemoryLimits::default()
        };
        let store = store_with(Arc::new(NeutralProvider::new(4)), limits);
        let character = CharacterId::new();
        let user = UserId::new();

        for i in 0..2 {
            let outcome = store
                .store(
                    character,
                    user,
                    MemoryDraft::seeded(MemoryKind::Fact, format!("fact number {i}")),
                    None,
                    MemoryTier::Free,
                )
                .await
                .expect("store");
            assert!(matches!(outcome, StoreOutcome::Inserted(_)));
        }

        let over = store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "one too many"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");

        assert_eq!(over, StoreOutcome::Dropped);
        assert_eq!(store.count(character, user).expect("count"), 2);
    }

    #[tokio::test]
    async fn retrieval_orders_by_hybrid_score() {
        // Controlled inputs: same recency, similarity dominates via the
        // query vector; importance breaks the near/far split.
        let provider = StaticProvider::new(
            3,
            &[
                ("query about cats", vec![1.0, 0.0, 0.0]),
                ("User adores cats", vec![1.0, 0.0, 0.0]),
                ("User tolerates dogs", vec![0.0, 1.0, 0.0]),
                ("User once saw a bird", vec![0.0, 0.0, 1.0]),
            ],
        );
        let store = store_with(Arc::new(provider), MemoryLimits::default());
        let character = CharacterId::new();
        let user = UserId::new();

        for (content, importance) in [
            ("User tolerates dogs", 0.9),
            ("User adores cats", 0.5),
            ("User once saw a bird", 0.1),
        ] {
            store
                .store(
                    character,
                    user,
                    MemoryDraft::new(MemoryKind::Preference, content, importance),
                    None,
                    MemoryTier::Free,
                )
                .await
                .expect("store");
        }

        let results = store
            .retrieve(MemoryQuery {
                character_id: character,
                user_id: user,
                query: "query about cats".to_string(),
                chat_id: None,
                limit: Some(3),
            })
            .await
            .expect("retrieve");

        assert_eq!(results.len(), 3);
        // 0.5·1.0 + 0.3·0.5 = 0.65 beats 0.5·0.0 + 0.3·0.9 = 0.27.
        assert_eq!(results[0].content, "User adores cats");
        assert!(results[0].score > results[1].score);
        assert!((results[0].breakdown.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn retrieval_touches_access_metadata() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Event, "User went hiking"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");

        for _ in 0..3 {
            store
                .retrieve(MemoryQuery {
                    character_id: character,
                    user_id: user,
                    query: "anything".to_string(),
                    chat_id: None,
                    limit: None,
                })
                .await
                .expect("retrieve");
        }

        let records = store.list(character, user, 10).expect("list");
        assert_eq!(records[0].access_count, 3);
    }

    #[tokio::test]
    async fn retrieval_empty_scope_returns_empty() {
        let store = neutral_store();
        let results = store
            .retrieve(MemoryQuery {
                character_id: CharacterId::new(),
                user_id: UserId::new(),
                query: "unknown topic".to_string(),
                chat_id: None,
                limit: None,
            })
            .await
            .expect("retrieve");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn session_isolation_filters_by_chat() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();
        let chat_a = ChatId::new();
        let chat_b = ChatId::new();

        store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "said in chat A"),
                Some(chat_a),
                MemoryTier::Free,
            )
            .await
            .expect("store");
        store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "said in chat B"),
                Some(chat_b),
                MemoryTier::Free,
            )
            .await
            .expect("store");

        let results = store
            .retrieve(MemoryQuery {
                character_id: character,
                user_id: user,
                query: "anything".to_string(),
                chat_id: Some(chat_a),
                limit: None,
            })
            .await
            .expect("retrieve");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "said in chat A");
    }

    #[tokio::test]
    async fn stale_memories_rank_below_fresh_ones() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        store
            .store(
                character,
                user,
                MemoryDraft::new(MemoryKind::Fact, "ancient fact", 0.5),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");
        store
            .store(
                character,
                user,
                MemoryDraft::new(MemoryKind::Fact, "fresh fact", 0.5),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");

        // Age the first record far past the 30-day window: recency goes
        // negative, which is intentional.
        {
            let conn = store.conn.lock();
            let stale = Utc::now().timestamp() - 90 * 24 * 3600;
            conn.execute(
                "UPDATE character_memories SET last_accessed = ?1 WHERE content = 'ancient fact'",
                params![stale],
            )
            .expect("age record");
        }

        let results = store
            .retrieve(MemoryQuery {
                character_id: character,
                user_id: user,
                query: "anything".to_string(),
                chat_id: None,
                limit: None,
            })
            .await
            .expect("retrieve");

        assert_eq!(results[0].content, "fresh fact");
        assert!(results[1].breakdown.recency < 0.0, "stale recency should go negative");
    }

    #[tokio::test]
    async fn delete_and_delete_all() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        let outcome = store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "to be deleted"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");
        let StoreOutcome::Inserted(id) = outcome else {
            panic!("expected insert");
        };

        assert!(store.delete(id).expect("delete"));
        assert!(!store.delete(id).expect("delete again"));

        for i in 0..3 {
            store
                .store(
                    character,
                    user,
                    MemoryDraft::seeded(MemoryKind::Event, format!("event {i}")),
                    None,
                    MemoryTier::Free,
                )
                .await
                .expect("store");
        }
        assert_eq!(store.delete_all(character, user, None).expect("wipe"), 3);
        assert_eq!(store.count(character, user).expect("count"), 0);
    }

    #[tokio::test]
    async fn count_by_kind_includes_zero_groups() {
        let store = neutral_store();
        let character = CharacterId::new();
        let user = UserId::new();

        store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Preference, "User likes tea"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");

        let counts = store.count_by_kind(character, user).expect("counts");
        assert_eq!(counts[&MemoryKind::Preference], 1);
        assert_eq!(counts[&MemoryKind::Fact], 0);
        assert_eq!(counts.len(), 4);
    }

    #[tokio::test]
    async fn file_backed_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memories.db");
        let store = MemoryStore::open(
            &path,
            &PersistenceConfig::default(),
            MemoryLimits::default(),
            RetrievalConfig::default(),
            Arc::new(NeutralProvider::new(4)),
        )
        .expect("open");

        let character = CharacterId::new();
        let user = UserId::new();
        store
            .store(
                character,
                user,
                MemoryDraft::seeded(MemoryKind::Fact, "persisted fact"),
                None,
                MemoryTier::Free,
            )
            .await
            .expect("store");
        drop(store);

        let reopened = MemoryStore::open(
            &path,
            &PersistenceConfig::default(),
            MemoryLimits::default(),
            RetrievalConfig::default(),
            Arc::new(NeutralProvider::new(4)),
        )
        .expect("reopen");
        assert_eq!(reopened.count(character, user).expect("count"), 1);
    }

    #[test]
    fn blob_codec_round_trip() {
        let embedding = Embedding(vec![0.25, -1.5, 3.75]);
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_floats(&blob), embedding.0);
    }
}
