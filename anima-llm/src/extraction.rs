//! Memory extraction pipeline — conversation window → structured candidates.
//!
//! One LLM call per pass, best-effort end to end:
//! - zero input messages short-circuit without touching the backend
//! - an unavailable backend yields an empty result
//! - malformed output (invalid JSON, wrong shape) yields an empty result
//!
//! Nothing in this module returns an error; extraction failures are logged
//! and the conversation continues without new memories.

use tracing::{debug, warn};

use crate::client::ChatBackend;
use crate::prompt::{render_template, EXTRACTION_SYSTEM, EXTRACTION_USER};
use crate::types::{ChatRequest, ChatTurn, ExtractedMemories};

/// Tunables for one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Model used for the call.
    pub model: String,
    /// Cap per category requested from the model.
    pub max_per_category: usize,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Hard timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_per_category: 3,
            max_tokens: 500,
            temperature: 0.3,
            timeout_ms: 10_000,
        }
    }
}

/// Run one extraction pass over a message window.
///
/// Returns the categorized candidates, or an empty set on any failure.
pub async fn extract_memories<B: ChatBackend + ?Sized>(
    backend: &B,
    messages: &[ChatTurn],
    options: &ExtractionOptions,
) -> ExtractedMemories {
    if messages.is_empty() {
        return ExtractedMemories::default();
    }

    let conversation = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let max_str = options.max_per_category.to_string();
    let user_prompt = render_template(
        EXTRACTION_USER,
        &[("conversation", conversation.as_str()), ("max_per_category", max_str.as_str())],
    );

    let request = ChatRequest {
        max_tokens: options.max_tokens,
        ..ChatRequest::new(EXTRACTION_SYSTEM, user_prompt, options.model.clone())
            .with_temperature(options.temperature)
            .with_timeout(options.timeout_ms)
    };

    let response = match backend.complete(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "memory extraction LLM call failed, skipping pass");
            return ExtractedMemories::default();
        }
    };

    match parse_extraction(&response.text) {
        Some(extracted) => {
            debug!(
                candidates = extracted.len(),
                latency_ms = response.latency_ms,
                "memory extraction complete"
            );
            extracted
        }
        None => {
            warn!(
                raw = %response.text,
                "memory extraction output unparseable, skipping pass"
            );
            ExtractedMemories::default()
        }
    }
}

/// Leniently parse extraction output.
///
/// Tolerates surrounding whitespace and markdown code fences; anything that
/// still fails to parse as the expected four-array shape yields `None`.
fn parse_extraction(raw: &str) -> Option<ExtractedMemories> {
    let trimmed = strip_code_fence(raw.trim());
    serde_json::from_str(trimmed).ok()
}

/// Strip a single surrounding ```-fence (with optional language tag).
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, if any.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
