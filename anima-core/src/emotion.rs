//! Emotion engine — sentiment → smoothed state → discrete label.
//!
//! Characters carry a 2D emotional state per (character, user) pair,
//! optionally scoped to one chat session. Each incoming message is run
//! through sentiment analysis, blended into the previous state with an
//! exponential carry (0.7 by default), clamped, and appended to an
//! immutable sample log. The "current emotion" is simply the most recent
//! sample.
//!
//! The discrete label comes from a fixed map of 12 regions in the
//! valence × arousal plane; where regions overlap, the one whose center is
//! closest wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EmotionConfig, PersistenceConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::types::{AffectState, CharacterId, ChatId, EmotionSample, UserId};

// ---------------------------------------------------------------------------
// Label map
// ---------------------------------------------------------------------------

/// The fixed set of discrete emotion labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    /// High valence, high arousal.
    Excited,
    /// Positive and moderately energetic.
    Happy,
    /// Warm, positive, low arousal.
    Loving,
    /// Mildly positive and settled — also the default label.
    Calm,
    /// Positive-leaning, alert.
    Curious,
    /// High arousal, valence near neutral.
    Surprised,
    /// Slightly negative, middling arousal.
    Confused,
    /// Slightly negative, low arousal.
    Bored,
    /// Negative, low arousal.
    Sad,
    /// Negative, high arousal.
    Fearful,
    /// Strongly negative, high arousal.
    Angry,
    /// Strongly negative, mid arousal.
    Disgusted,
}

/// One labelled region of the valence × arousal plane.
struct LabelRegion {
    label: EmotionLabel,
    valence: [f32; 2],
    arousal: [f32; 2],
}

/// Region table covering the plane with intentional overlap.
const LABEL_REGIONS: [LabelRegion; 12] = [
    LabelRegion { label: EmotionLabel::Excited, valence: [0.5, 1.0], arousal: [0.7, 1.0] },
    LabelRegion { label: EmotionLabel::Happy, valence: [0.3, 0.8], arousal: [0.3, 0.7] },
    LabelRegion { label: EmotionLabel::Loving, valence: [0.5, 1.0], arousal: [0.2, 0.5] },
    LabelRegion { label: EmotionLabel::Calm, valence: [0.0, 0.5], arousal: [0.0, 0.3] },
    LabelRegion { label: EmotionLabel::Curious, valence: [0.1, 0.5], arousal: [0.4, 0.7] },
    LabelRegion { label: EmotionLabel::Surprised, valence: [-0.2, 0.5], arousal: [0.6, 1.0] },
    LabelRegion { label: EmotionLabel::Confused, valence: [-0.3, 0.1], arousal: [0.3, 0.6] },
    LabelRegion { label: EmotionLabel::Bored, valence: [-0.3, 0.0], arousal: [0.0, 0.3] },
    LabelRegion { label: EmotionLabel::Sad, valence: [-0.8, -0.2], arousal: [0.0, 0.4] },
    LabelRegion { label: EmotionLabel::Fearful, valence: [-0.7, -0.2], arousal: [0.5, 0.9] },
    LabelRegion { label: EmotionLabel::Angry, valence: [-1.0, -0.4], arousal: [0.6, 1.0] },
    LabelRegion { label: EmotionLabel::Disgusted, valence: [-0.9, -0.4], arousal: [0.3, 0.7] },
];

impl EmotionLabel {
    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Excited => "excited",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Loving => "loving",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Curious => "curious",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Confused => "confused",
            EmotionLabel::Bored => "bored",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgusted => "disgusted",
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a valence/arousal point to its discrete label.
///
/// Among all regions containing the point, the one with the geometrically
/// closest center wins; a point outside every region defaults to `Calm`.
#[must_use]
pub fn label_for(valence: f32, arousal: f32) -> EmotionLabel {
    LABEL_REGIONS
        .iter()
        .filter(|region| {
            valence >= region.valence[0]
                && valence <= region.valence[1]
                && arousal >= region.arousal[0]
                && arousal <= region.arousal[1]
        })
        .min_by_key(|region| {
            let v_center = (region.valence[0] + region.valence[1]) / 2.0;
            let a_center = (region.arousal[0] + region.arousal[1]) / 2.0;
            OrderedFloat((valence - v_center).powi(2) + (arousal - a_center).powi(2))
        })
        .map_or(EmotionLabel::Calm, |region| region.label)
}

// ---------------------------------------------------------------------------
// EmotionState — the engine's public view
// ---------------------------------------------------------------------------

/// The labelled emotional state returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionState {
    /// Valence in [-1, 1].
    pub valence: f32,
    /// Arousal in [0, 1].
    pub arousal: f32,
    /// Discrete label for the current point.
    pub label: EmotionLabel,
    /// Human-readable summary for prompt/debug display.
    pub description: String,
}

impl EmotionState {
    /// Build a labelled state from a point in the affect plane.
    #[must_use]
    pub fn from_affect(affect: AffectState) -> Self {
        let label = label_for(affect.valence, affect.arousal);
        Self {
            valence: affect.valence,
            arousal: affect.arousal,
            label,
            description: format!("Current emotion: {label}"),
        }
    }

    /// The state's position in the affect plane.
    #[must_use]
    pub fn affect(&self) -> AffectState {
        AffectState::new(self.valence, self.arousal)
    }
}

// ---------------------------------------------------------------------------
// EmotionStore — append-only sample log
// ---------------------------------------------------------------------------

/// SQLite-backed append-only log of emotion samples.
pub struct EmotionStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for EmotionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

/// Fields of a new sample to append.
#[derive(Debug, Clone)]
pub struct NewEmotionSample {
    /// Owning character.
    pub character_id: CharacterId,
    /// Owning user.
    pub user_id: UserId,
    /// Chat session, when state is session-scoped.
    pub chat_id: Option<ChatId>,
    /// Valence, expected pre-clamped.
    pub valence: f32,
    /// Arousal, expected pre-clamped.
    pub arousal: f32,
    /// Message that triggered the update.
    pub trigger_message_id: Option<i64>,
    /// Triggering text, expected pre-truncated.
    pub trigger_content: Option<String>,
}

impl EmotionStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, persistence: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if persistence.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};",
            persistence.busy_timeout_ms
        ))?;

        Self::create_schema(&conn)?;
        info!(path = %db_path.display(), "emotion store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory store (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS character_emotions (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id       TEXT NOT NULL,
                user_id            TEXT NOT NULL,
                chat_id            TEXT,
                valence            REAL NOT NULL,
                arousal            REAL NOT NULL,
                trigger_message_id INTEGER,
                trigger_content    TEXT,
                created_at         INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_emotions_scope
                ON character_emotions (character_id, user_id, chat_id);",
        )?;
        Ok(())
    }

    /// Append a new sample. Rows are never mutated after insert.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn append(&self, sample: &NewEmotionSample) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO character_emotions
                (character_id, user_id, chat_id, valence, arousal,
                 trigger_message_id, trigger_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                sample.character_id.to_string(),
                sample.user_id.to_string(),
                sample.chat_id.map(|c| c.to_string()),
                f64::from(sample.valence),
                f64::from(sample.arousal),
                sample.trigger_message_id,
                sample.trigger_content,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent sample for the key, or `None` if the log is empty.
    ///
    /// With a `chat_id`, only samples of that session are considered; without
    /// one, the latest sample across the whole pair wins.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn latest(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        chat_id: Option<ChatId>,
    ) -> Result<Option<EmotionSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, character_id, user_id, chat_id, valence, arousal,
                    trigger_message_id, trigger_content, created_at
             FROM character_emotions
             WHERE character_id = ?1 AND user_id = ?2
               AND (?3 IS NULL OR chat_id = ?3)
             ORDER BY id DESC
             LIMIT 1",
        )?;

        let result = stmt
            .query_row(
                params![
                    character_id.to_string(),
                    user_id.to_string(),
                    chat_id.map(|c| c.to_string()),
                ],
                row_to_sample,
            )
            .optional()?;

        match result {
            Some(inner) => Ok(Some(inner?)),
            None => Ok(None),
        }
    }

    /// The most recent `limit` samples for the pair, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn history(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmotionSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, character_id, user_id, chat_id, valence, arousal,
                    trigger_message_id, trigger_content, created_at
             FROM character_emotions
             WHERE character_id = ?1 AND user_id = ?2
             ORDER BY id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![
                character_id.to_string(),
                user_id.to_string(),
                limit as i64
            ],
            row_to_sample,
        )?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row??);
        }
        Ok(samples)
    }

    /// Clear every sample for a (character, user) pair. Returns the number
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn reset(&self, character_id: CharacterId, user_id: UserId) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM character_emotions WHERE character_id = ?1 AND user_id = ?2",
            params![character_id.to_string(), user_id.to_string()],
        )?;
        info!(character = %character_id, user = %user_id, deleted, "emotion history reset");
        Ok(deleted)
    }
}

fn row_to_sample(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<Result<EmotionSample>, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let character_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let chat_str: Option<String> = row.get(3)?;
    let valence: f64 = row.get(4)?;
    let arousal: f64 = row.get(5)?;
    let trigger_message_id: Option<i64> = row.get(6)?;
    let trigger_content: Option<String> = row.get(7)?;
    let created: i64 = row.get(8)?;

    Ok((|| {
        Ok(EmotionSample {
            id,
            character_id: CharacterId(
                Uuid::parse_str(&character_str)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?,
            ),
            user_id: UserId(
                Uuid::parse_str(&user_str)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?,
            ),
            chat_id: match chat_str {
                Some(s) => Some(ChatId(
                    Uuid::parse_str(&s)
                        .map_err(|e| EngineError::Serialization(e.to_string()))?,
                )),
                None => None,
            },
            valence: valence as f32,
            arousal: arousal as f32,
            trigger_message_id,
            trigger_content,
            created_at: Utc.timestamp_opt(created, 0).single().unwrap_or_default(),
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
// EmotionEngine
// ---------------------------------------------------------------------------

/// Parameters for one emotion update.
#[derive(Debug, Clone)]
pub struct EmotionUpdate {
    /// Character scope.
    pub character_id: CharacterId,
    /// User scope.
    pub user_id: UserId,
    /// Chat session, when the state is session-scoped.
    pub chat_id: Option<ChatId>,
    /// The triggering message text.
    pub text: String,
    /// Id of the triggering message, if known.
    pub message_id: Option<i64>,
}

/// Sentiment analysis + smoothing + persistence, built on [`EmotionStore`].
pub struct EmotionEngine {
    store: EmotionStore,
    provider: Arc<dyn EmbeddingProvider>,
    config: EmotionConfig,
}

impl EmotionEngine {
    /// Create an engine over a store and sentiment provider.
    #[must_use]
    pub fn new(
        store: EmotionStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: EmotionConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Analyze a message, blend it into the current state, persist a new
    /// sample, and return the labelled result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures. Sentiment
    /// unavailability never surfaces (the provider degrades to neutral).
    pub async fn analyze_and_update(&self, update: EmotionUpdate) -> Result<EmotionState> {
        let sentiment = self.provider.analyze_sentiment(&update.text).await;
        let current = self
            .store
            .latest(update.character_id, update.user_id, update.chat_id)?;

        let blended = match &current {
            Some(sample) => sample.affect().blend(sentiment, self.config.smoothing_carry),
            None => sentiment,
        };
        // AffectState construction clamps, but re-clamp explicitly so the
        // stored values can never leave range.
        let blended = AffectState::new(blended.valence, blended.arousal);

        let snippet: String = update
            .text
            .chars()
            .take(self.config.trigger_snippet_chars)
            .collect();

        self.store.append(&NewEmotionSample {
            character_id: update.character_id,
            user_id: update.user_id,
            chat_id: update.chat_id,
            valence: blended.valence,
            arousal: blended.arousal,
            trigger_message_id: update.message_id,
            trigger_content: Some(snippet),
        })?;

        let state = EmotionState::from_affect(blended);
        debug!(
            character = %update.character_id,
            label = %state.label,
            valence = state.valence,
            arousal = state.arousal,
            "emotion updated"
        );
        Ok(state)
    }

    /// The current labelled state, or `None` when no samples exist.
    ///
    /// `None` must propagate to the prompt assembler as "no emotion
    /// section" — never as a default mood.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures.
    pub fn current_emotion(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        chat_id: Option<ChatId>,
    ) -> Result<Option<EmotionState>> {
        let latest = self.store.latest(character_id, user_id, chat_id)?;
        Ok(latest.map(|sample| EmotionState::from_affect(sample.affect())))
    }

    /// The most recent `limit` samples for the pair, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures.
    pub fn history(
        &self,
        character_id: CharacterId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmotionSample>> {
        self.store.history(character_id, user_id, limit)
    }

    /// Clear the emotion history for a (character, user) pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] on storage failures.
    pub fn reset(&self, character_id: CharacterId, user_id: UserId) -> Result<usize> {
        self.store.reset(character_id, user_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
