//! The orchestration point: prompt assembly, emotion updates, and the
//! extraction cadence.
//!
//! One [`IntelligenceEngine`] serves every session; per-conversation state
//! lives in the [`SessionContext`] passed into each call. Memory extraction
//! is fire-and-forget: it runs as a detached task with its own error
//! handling (log and continue) so it never delays the reply that triggered
//! it. The spawn handle is returned for callers that want to await
//! completion (tests, graceful shutdown).

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use anima_core::embedding::EmbeddingProvider;
use anima_core::emotion::{EmotionEngine, EmotionState, EmotionUpdate};
use anima_core::error::Result;
use anima_core::store::{MemoryStore, StoreOutcome};
use anima_core::{EngineConfig, MemoryDraft, MemoryKind, MemoryTier};
use anima_llm::extraction::{extract_memories, ExtractionOptions};
use anima_llm::{ChatBackend, ChatTurn, ExtractedMemories};

use crate::character::CharacterCard;
use crate::debug::{DebugState, LatencyMetric, SessionContext};
use crate::prompt::{character_section, emotion_section, memories_section, PromptSections, GUIDELINES};

/// Before/after emotional state of one message update.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionTransition {
    /// State before the update, if any history existed.
    pub previous: Option<EmotionState>,
    /// State after the update.
    pub current: EmotionState,
}

/// The prompt plus its section and token breakdown, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDetails {
    /// The assembled prompt.
    pub full_prompt: String,
    /// Individual sections.
    pub sections: PromptSections,
    /// Per-section token estimates.
    pub tokens: crate::prompt::TokenBreakdown,
}

/// Engine configuration distilled from [`EngineConfig`].
#[derive(Debug, Clone)]
struct EngineTuning {
    prompt_limit: usize,
    cadence_threshold: u32,
    message_window: usize,
    extraction: ExtractionOptions,
}

/// The per-process intelligence engine.
pub struct IntelligenceEngine {
    memory: Arc<MemoryStore>,
    emotion: Arc<EmotionEngine>,
    provider: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn ChatBackend>,
    tuning: EngineTuning,
}

impl IntelligenceEngine {
    /// Wire an engine from its collaborators and configuration.
    #[must_use]
    pub fn new(
        memory: Arc<MemoryStore>,
        emotion: Arc<EmotionEngine>,
        provider: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn ChatBackend>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            memory,
            emotion,
            provider,
            llm,
            tuning: EngineTuning {
                prompt_limit: config.retrieval.prompt_limit,
                cadence_threshold: config.extraction.cadence_threshold,
                message_window: config.extraction.message_window,
                extraction: ExtractionOptions {
                    model: config.extraction.model.clone(),
                    max_per_category: config.extraction.max_per_category,
                    timeout_ms: config.extraction.request_timeout_ms,
                    ..ExtractionOptions::default()
                },
            },
        }
    }

    /// The configured extraction cadence threshold.
    #[must_use]
    pub fn extraction_threshold(&self) -> u32 {
        self.tuning.cadence_threshold
    }

    // ------------------------------------------------------------------
    // Prompt assembly
    // ------------------------------------------------------------------

    /// Build the enhanced system prompt for one turn.
    ///
    /// Retrieval is session-isolated to the context's chat; the memory and
    /// emotion sections are omitted entirely when there is nothing to show.
    /// Retrieval and whole-build latencies land in the session's collector.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures only; provider unavailability
    /// degrades silently.
    pub async fn build_enhanced_prompt(
        &self,
        ctx: &SessionContext,
        character: &CharacterCard,
        user_message: &str,
    ) -> Result<String> {
        let sections = self.build_sections(ctx, character, user_message).await?;
        Ok(sections.full_prompt())
    }

    /// Build the prompt section by section with token estimates, for the
    /// debug surface. Runs the same code path as the real prompt build.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures only.
    pub async fn prompt_details(
        &self,
        ctx: &SessionContext,
        character: &CharacterCard,
        user_message: &str,
    ) -> Result<PromptDetails> {
        let sections = self.build_sections(ctx, character, user_message).await?;
        let tokens = sections.token_breakdown();
        Ok(PromptDetails {
            full_prompt: sections.full_prompt(),
            sections,
            tokens,
        })
    }

    async fn build_sections(
        &self,
        ctx: &SessionContext,
        character: &CharacterCard,
        user_message: &str,
    ) -> Result<PromptSections> {
        let build_start = Instant::now();

        let embed_start = Instant::now();
        let query_embedding = self.provider.embed(user_message).await;
        ctx.debug.record_latency(
            LatencyMetric::Embedding,
            embed_start.elapsed().as_secs_f64() * 1000.0,
        );

        let retrieval_start = Instant::now();
        let memories = self.memory.retrieve_ranked(
            ctx.character_id,
            ctx.user_id,
            &query_embedding,
            Some(ctx.chat_id),
            Some(self.tuning.prompt_limit),
        )?;
        let retrieval_ms = retrieval_start.elapsed().as_secs_f64() * 1000.0;
        ctx.debug.record_retrieval(user_message, &memories, retrieval_ms);

        let emotion = self
            .emotion
            .current_emotion(ctx.character_id, ctx.user_id, Some(ctx.chat_id))?;

        let sections = PromptSections {
            character_base: character_section(character),
            memories: memories_section(&memories),
            emotion: emotion.as_ref().map(emotion_section),
            guidelines: GUIDELINES.to_string(),
        };

        let build_ms = build_start.elapsed().as_secs_f64() * 1000.0;
        ctx.debug.record_latency(LatencyMetric::PromptBuild, build_ms);
        ctx.debug.record_prompt_tokens(sections.token_breakdown().total);

        Ok(sections)
    }

    // ------------------------------------------------------------------
    // Emotion
    // ------------------------------------------------------------------

    /// Update the character's emotion from one message and report the
    /// transition. Latency lands in the session's collector.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures only.
    pub async fn update_emotion_from_message(
        &self,
        ctx: &SessionContext,
        text: &str,
        message_id: Option<i64>,
    ) -> Result<EmotionTransition> {
        let start = Instant::now();
        let previous = self
            .emotion
            .current_emotion(ctx.character_id, ctx.user_id, Some(ctx.chat_id))?;

        let current = self
            .emotion
            .analyze_and_update(EmotionUpdate {
                character_id: ctx.character_id,
                user_id: ctx.user_id,
                chat_id: Some(ctx.chat_id),
                text: text.to_string(),
                message_id,
            })
            .await?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        ctx.debug
            .record_latency(LatencyMetric::EmotionAnalysis, elapsed_ms);

        Ok(EmotionTransition { previous, current })
    }

    // ------------------------------------------------------------------
    // Extraction cadence
    // ------------------------------------------------------------------

    /// Count a message against the extraction cadence; at the threshold,
    /// reset the counter and spawn a detached extraction pass over the most
    /// recent message window.
    ///
    /// Returns the spawn handle when extraction was triggered so callers
    /// can await it; dropping the handle leaves the task running.
    pub fn check_and_extract_memories(
        &self,
        ctx: &Arc<SessionContext>,
        recent_messages: &[ChatTurn],
        tier: MemoryTier,
    ) -> Option<JoinHandle<()>> {
        let count = ctx.debug.increment_message_counter();
        if count < self.tuning.cadence_threshold {
            return None;
        }
        ctx.debug.reset_message_counter();

        let window_start = recent_messages
            .len()
            .saturating_sub(self.tuning.message_window);
        let window: Vec<ChatTurn> = recent_messages[window_start..].to_vec();

        let memory = Arc::clone(&self.memory);
        let llm = Arc::clone(&self.llm);
        let options = self.tuning.extraction.clone();
        let ctx = Arc::clone(ctx);

        Some(tokio::spawn(async move {
            let extracted = extract_memories(llm.as_ref(), &window, &options).await;
            if extracted.is_empty() {
                debug!(chat = %ctx.chat_id, "extraction pass produced no candidates");
                return;
            }

            let mut stored = 0_usize;
            for draft in candidates(extracted) {
                match memory
                    .store(ctx.character_id, ctx.user_id, draft, Some(ctx.chat_id), tier)
                    .await
                {
                    Ok(StoreOutcome::Dropped) => {}
                    Ok(_) => stored += 1,
                    Err(e) => {
                        warn!(chat = %ctx.chat_id, error = %e, "failed to store extracted memory");
                    }
                }
            }
            debug!(chat = %ctx.chat_id, stored, "extraction pass complete");
        }))
    }

    // ------------------------------------------------------------------
    // Debug surface
    // ------------------------------------------------------------------

    /// Assemble the full debug view for a session. Memory counts and the
    /// current emotion are fetched fresh, never cached.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures only.
    pub fn debug_state(&self, ctx: &SessionContext) -> Result<DebugState> {
        let current_emotion =
            self.emotion
                .current_emotion(ctx.character_id, ctx.user_id, Some(ctx.chat_id))?;
        let memory_total = self.memory.count(ctx.character_id, ctx.user_id)?;
        let memory_by_kind = self.memory.count_by_kind(ctx.character_id, ctx.user_id)?;

        Ok(DebugState {
            current_emotion,
            memory_total,
            memory_by_kind,
            collector: ctx.debug.snapshot(),
            extraction_threshold: self.tuning.cadence_threshold,
        })
    }
}

/// Map extraction output to drafts carrying the per-kind seed importance.
fn candidates(extracted: ExtractedMemories) -> Vec<MemoryDraft> {
    let mut drafts = Vec::with_capacity(extracted.len());
    for fact in extracted.facts {
        drafts.push(MemoryDraft::seeded(MemoryKind::Fact, fact));
    }
    for preference in extracted.preferences {
        drafts.push(MemoryDraft::seeded(MemoryKind::Preference, preference));
    }
    for relationship in extracted.relationships {
        drafts.push(MemoryDraft::seeded(MemoryKind::Relationship, relationship));
    }
    for event in extracted.events {
        drafts.push(MemoryDraft::seeded(MemoryKind::Event, event));
    }
    drafts
}
