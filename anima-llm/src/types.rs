//! Core types for LLM requests, responses, and extraction output.

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The end user.
    User,
    /// The character/assistant.
    Assistant,
}

impl TurnRole {
    /// Stable string form used when formatting conversation windows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One message of a conversation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Speaker.
    pub role: TurnRole,
    /// Message text.
    pub content: String,
}

impl ChatTurn {
    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request to the chat-completion provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl ChatRequest {
    /// Create a request with conservative defaults for structured output.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: model.into(),
            max_tokens: 500,
            temperature: 0.3,
            timeout_ms: 10_000,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A response from the chat-completion provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// The generated text.
    pub text: String,
    /// How many completion tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model answered.
    pub model: String,
}

/// Structured extraction output — four capped category arrays.
///
/// Unknown fields in the model's reply are ignored; missing fields default
/// to empty, which keeps partial outputs usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedMemories {
    /// Factual information about the user.
    #[serde(default)]
    pub facts: Vec<String>,
    /// User preferences.
    #[serde(default)]
    pub preferences: Vec<String>,
    /// Relationship information.
    #[serde(default)]
    pub relationships: Vec<String>,
    /// Notable events.
    #[serde(default)]
    pub events: Vec<String>,
}

impl ExtractedMemories {
    /// Total candidates across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len() + self.preferences.len() + self.relationships.len() + self.events.len()
    }

    /// Whether every category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
