//! Chat-completion backends.
//!
//! All completion access goes through the [`ChatBackend`] capability trait,
//! with two implementations selected at construction time: [`LlmClient`]
//! talks to an OpenAI-compatible gateway over HTTP, [`OfflineBackend`]
//! errors on every call so deployments without a provider degrade to empty
//! extraction passes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse};

/// Capability trait for chat completion.
///
/// The extraction pipeline talks to this trait rather than a concrete
/// client, so tests can count invocations and script replies.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate a completion for a system+user message pair.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when no backend is configured or all attempts
    /// against the provider fail.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Backend for deployments without a completion provider.
///
/// Every call returns [`LlmError::NoBackend`]; extraction callers log it
/// and produce an empty pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

#[async_trait]
impl ChatBackend for OfflineBackend {
    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::NoBackend)
    }
}

/// HTTP client for OpenAI-compatible `/v1/chat/completions` gateways.
///
/// The wire shape also covers Anthropic-compatible proxies, Together,
/// vLLM, and similar hosts. Transient failures are retried up to the
/// configured attempt budget before the call errors out.
pub struct LlmClient {
    endpoint: String,
    api_key: String,
    http: Client,
    max_retries: u32,
}

impl LlmClient {
    /// Create a client against a gateway base URL (without the
    /// `/v1/chat/completions` suffix).
    #[must_use]
    pub fn new(base_url: &str, api_key: impl Into<String>, max_retries: u32) -> Self {
        Self {
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            http: Client::new(),
            max_retries,
        }
    }

    /// One request/response round trip. String errors feed the retry loop.
    async fn attempt(&self, request: &ChatRequest) -> Result<ChatResponse, String> {
        let start = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": request.model,
                "messages": [
                    { "role": "system", "content": request.system },
                    { "role": "user", "content": request.user },
                ],
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
            }))
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}ms", request.timeout_ms)
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("body read failed: {e}"))?;

        Ok(ChatResponse {
            text: payload["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            tokens_generated: payload["usage"]["completion_tokens"]
                .as_u64()
                .unwrap_or(0) as u32,
            latency_ms: start.elapsed().as_millis() as u64,
            model: request.model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(attempt, of = attempts, "retrying completion call");
            }
            match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_error = e;
                }
            }
        }

        Err(LlmError::Exhausted {
            attempts,
            last_error,
        })
    }
}
