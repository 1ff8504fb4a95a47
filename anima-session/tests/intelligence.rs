//! Integration tests — end-to-end intelligence flows.
//!
//! Store → retrieve → inject, emotion continuity, extraction cadence, and
//! the graceful-degradation paths, wired exactly as a conversation turn
//! would wire them.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use anima_core::config::EngineConfig;
use anima_core::embedding::NeutralProvider;
use anima_core::emotion::{EmotionEngine, EmotionStore};
use anima_core::store::MemoryStore;
use anima_core::{CharacterId, ChatId, MemoryDraft, MemoryKind, MemoryTier, UserId};
use anima_llm::error::LlmError;
use anima_llm::{ChatBackend, ChatRequest, ChatResponse, ChatTurn};
use anima_session::{CharacterCard, IntelligenceEngine, SessionRegistry};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Scripted LLM backend that counts invocations.
struct ScriptedLlm {
    reply: String,
    calls: Mutex<u32>,
}

impl ScriptedLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl ChatBackend for ScriptedLlm {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        *self.calls.lock() += 1;
        Ok(ChatResponse {
            text: self.reply.clone(),
            tokens_generated: 0,
            latency_ms: 1,
            model: request.model.clone(),
        })
    }
}

struct Harness {
    engine: IntelligenceEngine,
    memory: Arc<MemoryStore>,
    llm: Arc<ScriptedLlm>,
    registry: SessionRegistry,
}

fn init_tracing() {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn harness_with(config: EngineConfig, llm_reply: &str) -> Harness {
    init_tracing();
    let provider = Arc::new(NeutralProvider::new(8));
    let memory = Arc::new(
        MemoryStore::open_in_memory(
            config.memory.clone(),
            config.retrieval.clone(),
            provider.clone(),
        )
        .expect("open memory store"),
    );
    let emotion = Arc::new(EmotionEngine::new(
        EmotionStore::open_in_memory().expect("open emotion store"),
        provider.clone(),
        config.emotion.clone(),
    ));
    let llm = ScriptedLlm::new(llm_reply);
    let engine = IntelligenceEngine::new(memory.clone(), emotion, provider, llm.clone(), &config);
    Harness {
        engine,
        memory,
        llm,
        registry: SessionRegistry::new(),
    }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default(), "{}")
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bare_character_yields_base_and_guidelines_only() {
    let h = harness();
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());
    let card = CharacterCard::new("Assistant").with_description("A helpful AI");

    let prompt = h
        .engine
        .build_enhanced_prompt(&ctx, &card, "Hello")
        .await
        .expect("build");

    assert!(prompt.contains("You are Assistant."));
    assert!(prompt.contains("A helpful AI"));
    assert!(prompt.contains("行为指引"));
    assert!(!prompt.contains("关于用户的记忆"), "no memories → no section");
    assert!(!prompt.contains("当前情感状态"), "no emotion history → no section");
}

#[tokio::test]
async fn stored_preference_reaches_the_prompt() {
    let h = harness();
    let chat = ChatId::new();
    let character = CharacterId::new();
    let user = UserId::new();
    let ctx = h.registry.open_session(chat, character, user);

    h.memory
        .store(
            character,
            user,
            MemoryDraft::new(MemoryKind::Preference, "User loves hiking", 0.8),
            Some(chat),
            MemoryTier::Free,
        )
        .await
        .expect("store");

    let card = CharacterCard::new("HikingBuddy").with_description("An outdoor enthusiast companion");
    let prompt = h
        .engine
        .build_enhanced_prompt(&ctx, &card, "Tell me about hiking trails")
        .await
        .expect("build");

    assert!(prompt.contains("HikingBuddy"));
    assert!(prompt.contains("关于用户的记忆"));
    assert!(prompt.contains("【偏好】User loves hiking"));
    assert!(prompt.contains("行为指引"));
}

#[tokio::test]
async fn memories_from_other_chats_stay_isolated() {
    let h = harness();
    let chat = ChatId::new();
    let other_chat = ChatId::new();
    let character = CharacterId::new();
    let user = UserId::new();
    let ctx = h.registry.open_session(chat, character, user);

    h.memory
        .store(
            character,
            user,
            MemoryDraft::seeded(MemoryKind::Fact, "secret from another session"),
            Some(other_chat),
            MemoryTier::Free,
        )
        .await
        .expect("store");

    let prompt = h
        .engine
        .build_enhanced_prompt(&ctx, &CharacterCard::new("Assistant"), "anything")
        .await
        .expect("build");

    assert!(!prompt.contains("secret from another session"));
    assert!(!prompt.contains("关于用户的记忆"));
}

#[tokio::test]
async fn emotion_section_appears_after_an_update() {
    let h = harness();
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());

    let transition = h
        .engine
        .update_emotion_from_message(&ctx, "I had a great day!", Some(1))
        .await
        .expect("update");
    assert!(transition.previous.is_none(), "first update has no prior state");

    let prompt = h
        .engine
        .build_enhanced_prompt(&ctx, &CharacterCard::new("Assistant"), "hi")
        .await
        .expect("build");

    // NeutralProvider sentiment is (0.0, 0.3); of the three overlapping
    // regions containing that point, `confused` has the nearest center.
    assert!(prompt.contains("当前情感状态"));
    assert!(prompt.contains("当前情感: confused"));
    assert!(prompt.contains("Valence: 0.00"));
    assert!(prompt.contains("Arousal: 0.30"));
}

#[tokio::test]
async fn prompt_details_reports_per_section_tokens() {
    let h = harness();
    let chat = ChatId::new();
    let character = CharacterId::new();
    let user = UserId::new();
    let ctx = h.registry.open_session(chat, character, user);

    h.memory
        .store(
            character,
            user,
            MemoryDraft::seeded(MemoryKind::Fact, "User is 30 years old"),
            Some(chat),
            MemoryTier::Free,
        )
        .await
        .expect("store");

    let details = h
        .engine
        .prompt_details(&ctx, &CharacterCard::new("Assistant"), "tell me about myself")
        .await
        .expect("details");

    assert!(details.sections.memories.is_some());
    assert!(details.sections.emotion.is_none());
    assert!(details.tokens.memories > 0);
    assert_eq!(details.tokens.emotion, 0);
    assert!(details.tokens.total >= details.tokens.character_base + details.tokens.guidelines);
    assert_eq!(details.full_prompt, details.sections.full_prompt());
}

// ---------------------------------------------------------------------------
// Extraction cadence
// ---------------------------------------------------------------------------

fn extraction_reply() -> &'static str {
    r#"{"facts": ["User is a programmer"], "preferences": [], "relationships": [], "events": []}"#
}

#[tokio::test]
async fn extraction_triggers_at_threshold_and_resets() {
    let mut config = EngineConfig::default();
    config.extraction.cadence_threshold = 10;
    let h = harness_with(config, extraction_reply());

    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());
    let messages = vec![
        ChatTurn::user("I love coffee"),
        ChatTurn::assistant("Great choice!"),
    ];

    // Nine messages: no extraction yet.
    for _ in 0..9 {
        assert!(h
            .engine
            .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
            .is_none());
    }
    assert_eq!(h.llm.call_count(), 0);

    // Tenth message triggers extraction.
    let handle = h
        .engine
        .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
        .expect("triggered");
    handle.await.expect("join");
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(ctx.debug.message_counter(), 0, "counter resets at threshold");

    // The extracted fact landed in the store.
    assert_eq!(h.memory.count(ctx.character_id, ctx.user_id).expect("count"), 1);

    // Nine more messages stay quiet; the tenth triggers again.
    for _ in 0..9 {
        assert!(h
            .engine
            .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
            .is_none());
    }
    assert_eq!(h.llm.call_count(), 1);
    let handle = h
        .engine
        .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
        .expect("triggered again");
    handle.await.expect("join");
    assert_eq!(h.llm.call_count(), 2);
}

#[tokio::test]
async fn default_cadence_extracts_every_message() {
    let h = harness_with(EngineConfig::default(), extraction_reply());
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());
    let messages = vec![ChatTurn::user("I live in Berlin")];

    let handle = h
        .engine
        .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
        .expect("threshold 1 triggers immediately");
    handle.await.expect("join");
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn extraction_window_takes_trailing_messages() {
    let mut config = EngineConfig::default();
    config.extraction.message_window = 2;
    let h = harness_with(config, extraction_reply());
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());

    // A long transcript; only the last exchange should be sent. The
    // scripted backend ignores input, so this just exercises the slicing.
    let messages: Vec<ChatTurn> = (0..20)
        .map(|i| ChatTurn::user(format!("message {i}")))
        .collect();

    let handle = h
        .engine
        .check_and_extract_memories(&ctx, &messages, MemoryTier::Free)
        .expect("triggered");
    handle.await.expect("join");
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn malformed_extraction_output_stores_nothing() {
    let h = harness_with(EngineConfig::default(), "that is not JSON at all");
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());

    let handle = h
        .engine
        .check_and_extract_memories(
            &ctx,
            &[ChatTurn::user("I love coffee")],
            MemoryTier::Free,
        )
        .expect("triggered");
    handle.await.expect("join");

    assert_eq!(h.memory.count(ctx.character_id, ctx.user_id).expect("count"), 0);
}

#[tokio::test]
async fn empty_window_never_calls_the_llm() {
    let h = harness_with(EngineConfig::default(), extraction_reply());
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());

    let handle = h
        .engine
        .check_and_extract_memories(&ctx, &[], MemoryTier::Free)
        .expect("cadence still fires");
    handle.await.expect("join");

    assert_eq!(h.llm.call_count(), 0, "zero input messages short-circuit");
    assert_eq!(h.memory.count(ctx.character_id, ctx.user_id).expect("count"), 0);
}

// ---------------------------------------------------------------------------
// Debug surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debug_state_aggregates_fresh_counts() {
    let h = harness();
    let chat = ChatId::new();
    let character = CharacterId::new();
    let user = UserId::new();
    let ctx = h.registry.open_session(chat, character, user);

    h.memory
        .store(
            character,
            user,
            MemoryDraft::seeded(MemoryKind::Preference, "User likes tea"),
            Some(chat),
            MemoryTier::Free,
        )
        .await
        .expect("store");
    h.engine
        .update_emotion_from_message(&ctx, "lovely", None)
        .await
        .expect("emotion");
    h.engine
        .build_enhanced_prompt(&ctx, &CharacterCard::new("Assistant"), "what do I like?")
        .await
        .expect("build");

    let state = h.engine.debug_state(&ctx).expect("debug state");
    assert!(state.current_emotion.is_some());
    assert_eq!(state.memory_total, 1);
    assert_eq!(state.memory_by_kind[&MemoryKind::Preference], 1);
    assert_eq!(state.memory_by_kind[&MemoryKind::Fact], 0);
    assert_eq!(state.extraction_threshold, 1);

    let retrieval = state.collector.last_retrieval.expect("recorded");
    assert_eq!(retrieval.query, "what do I like?");
    assert_eq!(retrieval.results.len(), 1);
    assert!(state.collector.latency.prompt_build_ms >= 0.0);
    assert!(state.collector.latency.last_prompt_tokens > 0);
}

// ---------------------------------------------------------------------------
// Emotion continuity across a conversation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn emotion_transitions_smoothly_across_messages() {
    let h = harness();
    let ctx = h
        .registry
        .open_session(ChatId::new(), CharacterId::new(), UserId::new());

    let first = h
        .engine
        .update_emotion_from_message(&ctx, "hello", None)
        .await
        .expect("first");
    let second = h
        .engine
        .update_emotion_from_message(&ctx, "hello again", None)
        .await
        .expect("second");

    // Neutral sentiment everywhere: the state converges to (0.0, 0.3) and
    // the transition carries the previous sample.
    let previous = second.previous.expect("has prior state");
    assert!((previous.valence - first.current.valence).abs() < 0.001);
    assert!(second.current.valence.abs() < 0.001);
    assert!((second.current.arousal - 0.3).abs() < 0.001);
}
