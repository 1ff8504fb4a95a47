//! System-prompt section builders and the token-estimate heuristic.
//!
//! The enhanced prompt is assembled from up to four sections, separated by
//! blank lines:
//!
//! 1. character base (always)
//! 2. memories, grouped by kind (omitted when retrieval is empty)
//! 3. current emotion (omitted when no emotion history exists)
//! 4. fixed behavioral guidance (always)
//!
//! Section text is bilingual by design — the memory tags and guidance block
//! are the product's original wording.

use serde::Serialize;

use anima_core::emotion::EmotionState;
use anima_core::{MemoryKind, RetrievedMemory};

use crate::character::CharacterCard;

/// Header of the memories section.
pub const MEMORY_SECTION_HEADER: &str = "## 关于用户的记忆";

/// Header of the emotion section.
pub const EMOTION_SECTION_HEADER: &str = "## 当前情感状态";

/// The fixed behavioral-guidance block closing every prompt.
pub const GUIDELINES: &str = "## 行为指引
- 根据记忆中的信息个性化回复
- 保持情感状态的一致性，情感变化应自然过渡
- 可以主动提及相关记忆，但不要生硬
Stay in character at all times.";

/// Tag prefixing each memory group line.
#[must_use]
pub fn kind_tag(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Fact => "【事实】",
        MemoryKind::Preference => "【偏好】",
        MemoryKind::Relationship => "【关系】",
        MemoryKind::Event => "【事件】",
    }
}

// ---------------------------------------------------------------------------
// Section builders
// ---------------------------------------------------------------------------

/// Build the character base section. Absent card fields omit their line.
#[must_use]
pub fn character_section(card: &CharacterCard) -> String {
    let mut parts = vec![format!("You are {}.", card.name)];
    if let Some(description) = &card.description {
        parts.push(description.clone());
    }
    if let Some(personality) = &card.personality {
        parts.push(format!("Personality: {personality}"));
    }
    if let Some(scenario) = &card.scenario {
        parts.push(format!("Scenario: {scenario}"));
    }
    if let Some(system_prompt) = &card.system_prompt {
        parts.push(system_prompt.clone());
    }
    parts.join("\n")
}

/// Build the memories section, grouping by kind in the fixed order and
/// joining each group with `；`. Returns `None` when there is nothing to
/// show — the whole section is then omitted from the prompt.
#[must_use]
pub fn memories_section(memories: &[RetrievedMemory]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }

    let mut parts = vec![MEMORY_SECTION_HEADER.to_string()];
    for kind in MemoryKind::ALL {
        let group: Vec<&str> = memories
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.content.as_str())
            .collect();
        if !group.is_empty() {
            parts.push(format!("{}{}", kind_tag(kind), group.join("；")));
        }
    }
    Some(parts.join("\n"))
}

/// Build the one-line emotion section.
#[must_use]
pub fn emotion_section(emotion: &EmotionState) -> String {
    format!(
        "{EMOTION_SECTION_HEADER}\n当前情感: {}, Valence: {:.2}, Arousal: {:.2}",
        emotion.label, emotion.valence, emotion.arousal
    )
}

// ---------------------------------------------------------------------------
// Assembled prompt
// ---------------------------------------------------------------------------

/// The prompt broken out section by section, with token estimates.
#[derive(Debug, Clone, Serialize)]
pub struct PromptSections {
    /// Character base block.
    pub character_base: String,
    /// Memories section, when retrieval returned anything.
    pub memories: Option<String>,
    /// Emotion section, when emotion history exists.
    pub emotion: Option<String>,
    /// Fixed guidance block.
    pub guidelines: String,
}

impl PromptSections {
    /// Concatenate the present sections with blank-line separation.
    #[must_use]
    pub fn full_prompt(&self) -> String {
        let mut parts = vec![self.character_base.as_str()];
        if let Some(memories) = &self.memories {
            parts.push(memories.as_str());
        }
        if let Some(emotion) = &self.emotion {
            parts.push(emotion.as_str());
        }
        parts.push(self.guidelines.as_str());
        parts.join("\n\n")
    }

    /// Per-section token estimates.
    #[must_use]
    pub fn token_breakdown(&self) -> TokenBreakdown {
        let character_base = estimate_tokens(&self.character_base);
        let memories = self.memories.as_deref().map_or(0, estimate_tokens);
        let emotion = self.emotion.as_deref().map_or(0, estimate_tokens);
        let guidelines = estimate_tokens(&self.guidelines);
        TokenBreakdown {
            total: estimate_tokens(&self.full_prompt()),
            character_base,
            memories,
            emotion,
            guidelines,
        }
    }
}

/// Approximate token counts per prompt section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenBreakdown {
    /// Whole prompt.
    pub total: u32,
    /// Character base block.
    pub character_base: u32,
    /// Memories section (0 when omitted).
    pub memories: u32,
    /// Emotion section (0 when omitted).
    pub emotion: u32,
    /// Guidance block.
    pub guidelines: u32,
}

/// Estimate the token count of a text: CJK code points cost 0.5 token,
/// every other character 0.25, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let mut cost = 0.0_f64;
    for ch in text.chars() {
        if is_cjk(ch) {
            cost += 0.5;
        } else {
            cost += 0.25;
        }
    }
    cost.ceil() as u32
}

/// CJK Unified Ideographs block, matching the reference heuristic.
fn is_cjk(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
