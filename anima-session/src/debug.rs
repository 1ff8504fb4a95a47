//! Per-session debug state — "why did the character say that".
//!
//! Every chat session owns a [`DebugCollector`] inside its
//! [`SessionContext`]. The collector records the last retrieval, four
//! latency metrics, the extraction message counter, and the last-extraction
//! timestamp. It observes the data path without participating in its
//! correctness: concurrent increments for the same session may race, which
//! is an accepted approximation for diagnostic-only counters.
//!
//! Contexts are created and closed explicitly through [`SessionRegistry`];
//! there is no process-wide ambient map growing behind the engine's back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use anima_core::emotion::EmotionState;
use anima_core::{CharacterId, ChatId, MemoryKind, RetrievedMemory, UserId};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// The named latency metrics the collector tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMetric {
    /// Query embedding time.
    Embedding,
    /// Hybrid retrieval time.
    Retrieval,
    /// Sentiment analysis + smoothing time.
    EmotionAnalysis,
    /// Whole prompt assembly time.
    PromptBuild,
}

/// Snapshot of the per-session latency metrics, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencyMetrics {
    /// Query embedding latency.
    pub embedding_ms: f64,
    /// Hybrid retrieval latency.
    pub retrieval_ms: f64,
    /// Emotion analysis latency.
    pub emotion_analysis_ms: f64,
    /// Prompt build latency.
    pub prompt_build_ms: f64,
    /// Estimated token count of the last built prompt.
    pub last_prompt_tokens: u32,
}

/// The last retrieval observed for a session.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalDebugEntry {
    /// The query text that was embedded.
    pub query: String,
    /// Scored results, ranked.
    pub results: Vec<RetrievedMemory>,
    /// When the retrieval ran.
    pub timestamp: DateTime<Utc>,
    /// How long it took, in milliseconds.
    pub latency_ms: f64,
}

#[derive(Debug, Default)]
struct DebugInner {
    last_retrieval: Option<RetrievalDebugEntry>,
    latency: LatencyMetrics,
    last_extracted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Ring of diagnostic state for one chat session.
#[derive(Debug, Default)]
pub struct DebugCollector {
    inner: Mutex<DebugInner>,
    message_counter: AtomicU32,
}

impl DebugCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the most recent retrieval.
    pub fn record_retrieval(&self, query: &str, results: &[RetrievedMemory], latency_ms: f64) {
        let mut inner = self.inner.lock();
        inner.last_retrieval = Some(RetrievalDebugEntry {
            query: query.to_string(),
            results: results.to_vec(),
            timestamp: Utc::now(),
            latency_ms,
        });
        inner.latency.retrieval_ms = latency_ms;
    }

    /// Record one latency metric.
    pub fn record_latency(&self, metric: LatencyMetric, value_ms: f64) {
        let mut inner = self.inner.lock();
        match metric {
            LatencyMetric::Embedding => inner.latency.embedding_ms = value_ms,
            LatencyMetric::Retrieval => inner.latency.retrieval_ms = value_ms,
            LatencyMetric::EmotionAnalysis => inner.latency.emotion_analysis_ms = value_ms,
            LatencyMetric::PromptBuild => inner.latency.prompt_build_ms = value_ms,
        }
    }

    /// Record the estimated token count of the last built prompt.
    pub fn record_prompt_tokens(&self, tokens: u32) {
        self.inner.lock().latency.last_prompt_tokens = tokens;
    }

    /// Increment the extraction message counter; returns the new value.
    pub fn increment_message_counter(&self) -> u32 {
        self.message_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current counter value without mutation.
    #[must_use]
    pub fn message_counter(&self) -> u32 {
        self.message_counter.load(Ordering::Relaxed)
    }

    /// Reset the counter after an extraction pass and stamp the time.
    pub fn reset_message_counter(&self) {
        self.message_counter.store(0, Ordering::Relaxed);
        self.inner.lock().last_extracted_at = Some(Utc::now());
    }

    /// Snapshot the collector for export.
    #[must_use]
    pub fn snapshot(&self) -> DebugSnapshot {
        let inner = self.inner.lock();
        DebugSnapshot {
            last_retrieval: inner.last_retrieval.clone(),
            latency: inner.latency,
            last_extracted_at: inner.last_extracted_at,
            message_counter: self.message_counter.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a collector's state.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    /// The most recent retrieval, if any ran.
    pub last_retrieval: Option<RetrievalDebugEntry>,
    /// Latency metrics.
    pub latency: LatencyMetrics,
    /// When extraction last ran for this session.
    pub last_extracted_at: Option<DateTime<Utc>>,
    /// Messages seen since the last extraction.
    pub message_counter: u32,
}

// ---------------------------------------------------------------------------
// Session context & registry
// ---------------------------------------------------------------------------

/// The per-conversation handle the engine operates on.
///
/// Owns the session's debug state; passed by `Arc` into the engine rather
/// than looked up from a global.
#[derive(Debug)]
pub struct SessionContext {
    /// Chat session id.
    pub chat_id: ChatId,
    /// Character speaking in this session.
    pub character_id: CharacterId,
    /// User on the other side.
    pub user_id: UserId,
    /// Diagnostic state for this session.
    pub debug: DebugCollector,
}

impl SessionContext {
    /// Create a context for one conversation.
    #[must_use]
    pub fn new(chat_id: ChatId, character_id: CharacterId, user_id: UserId) -> Self {
        Self {
            chat_id,
            character_id,
            user_id,
            debug: DebugCollector::new(),
        }
    }
}

/// Registry of live session contexts with explicit lifecycle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ChatId, Arc<SessionContext>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or return the existing) context for a chat.
    pub fn open_session(
        &self,
        chat_id: ChatId,
        character_id: CharacterId,
        user_id: UserId,
    ) -> Arc<SessionContext> {
        Arc::clone(
            self.sessions
                .entry(chat_id)
                .or_insert_with(|| {
                    Arc::new(SessionContext::new(chat_id, character_id, user_id))
                })
                .value(),
        )
    }

    /// Look up a live session.
    #[must_use]
    pub fn session(&self, chat_id: ChatId) -> Option<Arc<SessionContext>> {
        self.sessions.get(&chat_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Close a session, dropping its debug state. Returns whether it existed.
    pub fn close_session(&self, chat_id: ChatId) -> bool {
        self.sessions.remove(&chat_id).is_some()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Assembled debug state
// ---------------------------------------------------------------------------

/// The full "why did the character say that" view for one session.
///
/// Memory counts and emotion are fetched fresh from the stores at assembly
/// time, never cached here.
#[derive(Debug, Clone, Serialize)]
pub struct DebugState {
    /// The character's current labelled emotion, if any history exists.
    pub current_emotion: Option<EmotionState>,
    /// Total live memories for the (character, user) pair.
    pub memory_total: usize,
    /// Live memory counts per kind (zero counts included).
    pub memory_by_kind: HashMap<MemoryKind, usize>,
    /// Collector snapshot: last retrieval, latencies, counters.
    pub collector: DebugSnapshot,
    /// The configured extraction cadence threshold.
    pub extraction_threshold: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_and_resets() {
        let collector = DebugCollector::new();
        assert_eq!(collector.increment_message_counter(), 1);
        assert_eq!(collector.increment_message_counter(), 2);
        assert_eq!(collector.message_counter(), 2);

        collector.reset_message_counter();
        assert_eq!(collector.message_counter(), 0);
        assert!(collector.snapshot().last_extracted_at.is_some());
    }

    #[test]
    fn latency_metrics_record_independently() {
        let collector = DebugCollector::new();
        collector.record_latency(LatencyMetric::Embedding, 12.5);
        collector.record_latency(LatencyMetric::PromptBuild, 3.0);
        collector.record_prompt_tokens(42);

        let snapshot = collector.snapshot();
        assert!((snapshot.latency.embedding_ms - 12.5).abs() < f64::EPSILON);
        assert!((snapshot.latency.prompt_build_ms - 3.0).abs() < f64::EPSILON);
        assert!(snapshot.latency.retrieval_ms.abs() < f64::EPSILON);
        assert_eq!(snapshot.latency.last_prompt_tokens, 42);
    }

    #[test]
    fn record_retrieval_keeps_query_and_latency() {
        let collector = DebugCollector::new();
        collector.record_retrieval("what does the user like?", &[], 7.25);

        let snapshot = collector.snapshot();
        let retrieval = snapshot.last_retrieval.expect("recorded");
        assert_eq!(retrieval.query, "what does the user like?");
        assert!(retrieval.results.is_empty());
        assert!((snapshot.latency.retrieval_ms - 7.25).abs() < f64::EPSILON);
    }

    #[test]
    fn registry_lifecycle() {
        let registry = SessionRegistry::new();
        let chat = ChatId::new();
        let character = CharacterId::new();
        let user = UserId::new();

        assert!(registry.is_empty());
        let ctx = registry.open_session(chat, character, user);
        assert_eq!(registry.len(), 1);

        // Re-opening returns the same context (same counter state).
        ctx.debug.increment_message_counter();
        let again = registry.open_session(chat, character, user);
        assert_eq!(again.debug.message_counter(), 1);

        assert!(registry.close_session(chat));
        assert!(!registry.close_session(chat));
        assert!(registry.session(chat).is_none());
    }
}
