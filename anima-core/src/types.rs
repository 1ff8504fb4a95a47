//! Core type definitions for the Anima memory system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a character persona.
    CharacterId
);
id_type!(
    /// Unique identifier for an end user.
    UserId
);
id_type!(
    /// Unique identifier for a chat session.
    ChatId
);
id_type!(
    /// Unique identifier for a stored memory record.
    MemoryId
);

// ---------------------------------------------------------------------------
// Memory Kinds
// ---------------------------------------------------------------------------

/// The closed set of memory categories.
///
/// Each kind carries the seed importance assigned when the extraction
/// pipeline produces a candidate of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Factual information about the user ("User is 30 years old").
    Fact,
    /// A user preference ("User prefers dark mode").
    Preference,
    /// Relationship information ("User considers the character a friend").
    Relationship,
    /// A notable event ("User had a birthday last week").
    Event,
}

impl MemoryKind {
    /// All kinds in the fixed display order used by the prompt assembler.
    pub const ALL: [MemoryKind; 4] = [
        MemoryKind::Fact,
        MemoryKind::Preference,
        MemoryKind::Relationship,
        MemoryKind::Event,
    ];

    /// Importance seeded onto extraction candidates of this kind.
    #[must_use]
    pub fn seed_importance(self) -> f32 {
        match self {
            MemoryKind::Fact => 0.7,
            MemoryKind::Preference => 0.6,
            MemoryKind::Relationship => 0.8,
            MemoryKind::Event => 0.5,
        }
    }

    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
            MemoryKind::Relationship => "relationship",
            MemoryKind::Event => "event",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryKind::Fact),
            "preference" => Ok(MemoryKind::Preference),
            "relationship" => Ok(MemoryKind::Relationship),
            "event" => Ok(MemoryKind::Event),
            other => Err(format!("unknown memory kind: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription Tiers
// ---------------------------------------------------------------------------

/// Subscription tier of the user owning a memory scope.
///
/// Determines the per-(character, user) memory ceiling; see
/// [`crate::config::MemoryLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Free tier.
    Free,
    /// Pro tier.
    Pro,
    /// Team tier.
    Team,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::Free
    }
}

// ---------------------------------------------------------------------------
// Affect Model — 2D Valence/Arousal
// ---------------------------------------------------------------------------

/// A point in the 2D valence/arousal affect plane.
///
/// - **Valence**: negative (-1.0) → positive (+1.0)
/// - **Arousal**: calm (0.0) → excited (1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectState {
    /// Negative (-1.0) to positive (+1.0).
    pub valence: f32,
    /// Calm (0.0) to excited (1.0).
    pub arousal: f32,
}

impl AffectState {
    /// The neutral fallback sentiment used when the sentiment service is
    /// unreachable.
    pub const NEUTRAL: Self = Self {
        valence: 0.0,
        arousal: 0.3,
    };

    /// Create a new affect state, clamping valence to [-1, 1] and arousal
    /// to [0, 1].
    #[must_use]
    pub fn new(valence: f32, arousal: f32) -> Self {
        Self {
            valence: valence.clamp(-1.0, 1.0),
            arousal: arousal.clamp(0.0, 1.0),
        }
    }

    /// Blend a newly observed affect into the current state.
    ///
    /// `carry` is the weight kept from `self`; the remainder comes from
    /// `incoming`. The default carry of 0.7 gives
    /// `0.7·current + 0.3·incoming` per axis.
    #[must_use]
    pub fn blend(&self, incoming: Self, carry: f32) -> Self {
        let keep = carry.clamp(0.0, 1.0);
        Self::new(
            self.valence * keep + incoming.valence * (1.0 - keep),
            self.arousal * keep + incoming.arousal * (1.0 - keep),
        )
    }
}

impl Default for AffectState {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ---------------------------------------------------------------------------
// Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
/// 384 dimensions in the default deployment (MiniLM-family models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// An all-zero embedding of the given dimensionality — the neutral
    /// fallback when the embedding service is unreachable.
    #[must_use]
    pub fn zeros(dimensions: usize) -> Self {
        Self(vec![0.0; dimensions])
    }

    /// Cosine similarity between two embeddings.
    /// Returns 0.0 on dimension mismatch or zero-magnitude input.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut mag_a, mut mag_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            mag_a += a * a;
            mag_b += b * b;
        }
        let denom = mag_a.sqrt() * mag_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Whether every component is zero (the service-unavailable fallback).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0.0)
    }
}

// ---------------------------------------------------------------------------
// Memory Records
// ---------------------------------------------------------------------------

/// A candidate memory ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// Memory category.
    pub kind: MemoryKind,
    /// Free-text content — the unit of retrieval and display.
    pub content: String,
    /// Importance in [0, 1].
    pub importance: f32,
}

impl MemoryDraft {
    /// Create a draft, clamping importance to [0, 1].
    #[must_use]
    pub fn new(kind: MemoryKind, content: impl Into<String>, importance: f32) -> Self {
        Self {
            kind,
            content: content.into(),
            importance: importance.clamp(0.0, 1.0),
        }
    }

    /// Create a draft seeded with the kind's default importance.
    #[must_use]
    pub fn seeded(kind: MemoryKind, content: impl Into<String>) -> Self {
        Self::new(kind, content, kind.seed_importance())
    }
}

/// A fully stored memory record, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: MemoryId,
    /// Owning character.
    pub character_id: CharacterId,
    /// Owning user.
    pub user_id: UserId,
    /// Memory category.
    pub kind: MemoryKind,
    /// Free-text content.
    pub content: String,
    /// Importance in [0, 1].
    pub importance: f32,
    /// How many times retrieval has returned this record.
    pub access_count: u32,
    /// Chat session the memory originated from, if session-scoped.
    pub source_chat_id: Option<ChatId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Last time retrieval touched this record.
    pub last_accessed: DateTime<Utc>,
}

/// Per-factor breakdown of a hybrid retrieval score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Cosine similarity between query and memory embeddings.
    pub similarity: f64,
    /// Stored importance of the record.
    pub importance: f64,
    /// Linear recency term (unclamped — stale records go negative).
    pub recency: f64,
}

/// A memory returned by hybrid retrieval, ranked by combined score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    /// Record identifier.
    pub id: MemoryId,
    /// Free-text content.
    pub content: String,
    /// Memory category.
    pub kind: MemoryKind,
    /// Combined hybrid score.
    pub score: f64,
    /// Per-factor contributions before weighting.
    pub breakdown: ScoreBreakdown,
}

// ---------------------------------------------------------------------------
// Emotion Samples
// ---------------------------------------------------------------------------

/// One row of the append-only emotion log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    /// Monotonic row id (append order).
    pub id: i64,
    /// Owning character.
    pub character_id: CharacterId,
    /// Owning user.
    pub user_id: UserId,
    /// Chat session, when the state is session-scoped.
    pub chat_id: Option<ChatId>,
    /// Smoothed valence at this point, in [-1, 1].
    pub valence: f32,
    /// Smoothed arousal at this point, in [0, 1].
    pub arousal: f32,
    /// Message that triggered this sample, if known.
    pub trigger_message_id: Option<i64>,
    /// Triggering text, truncated to the configured snippet length.
    pub trigger_content: Option<String>,
    /// When the sample was recorded.
    pub created_at: DateTime<Utc>,
}

impl EmotionSample {
    /// The sample's position in the affect plane.
    #[must_use]
    pub fn affect(&self) -> AffectState {
        AffectState::new(self.valence, self.arousal)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
