//! Embedding & sentiment provider abstraction.
//!
//! The engine consumes an external ML service for text embeddings and 2D
//! sentiment. The service is best-effort by contract: when it is slow or
//! unreachable, callers receive a neutral fallback (zero vector, neutral
//! sentiment) instead of an error. The memory store and emotion engine are
//! built on the assumption that these calls cannot fail.
//!
//! Two implementations are selected at construction time:
//! - [`HttpMlClient`] — the production HTTP adapter
//! - [`NeutralProvider`] — an offline stub for tests and degraded deployments

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::types::{AffectState, Embedding};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Produce embeddings and sentiment from text.
///
/// All methods are infallible: implementations must degrade to neutral
/// fallbacks on any transport failure and record the outage internally.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string. Returns a zero vector on failure.
    async fn embed(&self, text: &str) -> Embedding;

    /// Embed a batch of texts. Returns one vector per input; zero vectors
    /// on failure. The default implementation loops over [`Self::embed`].
    async fn embed_batch(&self, texts: &[String]) -> Vec<Embedding> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }

    /// Analyze the sentiment of a text as a valence/arousal point.
    /// Returns [`AffectState::NEUTRAL`] on failure.
    async fn analyze_sentiment(&self, text: &str) -> AffectState;

    /// Probe whether the backing service is initialized and reachable.
    async fn health(&self) -> bool;

    /// Dimensionality of the embeddings this provider produces.
    fn dimensions(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Neutral stub
// ---------------------------------------------------------------------------

/// A provider that always returns the neutral fallbacks.
///
/// Used in tests and in deployments that run without an ML service —
/// retrieval then ranks purely on importance and recency.
pub struct NeutralProvider {
    dims: usize,
}

impl NeutralProvider {
    /// Create a new neutral provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for NeutralProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for NeutralProvider {
    async fn embed(&self, _text: &str) -> Embedding {
        Embedding::zeros(self.dims)
    }

    async fn analyze_sentiment(&self, _text: &str) -> AffectState {
        AffectState::NEUTRAL
    }

    async fn health(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// Random provider (integration-test support)
// ---------------------------------------------------------------------------

/// A provider returning random unit-length vectors.
///
/// Useful for integration tests that need diverse, non-zero embeddings
/// without a live model.
pub struct RandomProvider {
    dims: usize,
}

impl RandomProvider {
    /// Create a new random provider.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for RandomProvider {
    async fn embed(&self, _text: &str) -> Embedding {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Embedding::zeros(self.dims);
        }
        Embedding(raw.iter().map(|x| x / mag).collect())
    }

    async fn analyze_sentiment(&self, _text: &str) -> AffectState {
        AffectState::NEUTRAL
    }

    async fn health(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    valence: f32,
    arousal: f32,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    initialized: bool,
}

/// HTTP adapter for the external embedding/sentiment service.
///
/// Endpoints: `POST /embed`, `POST /embed/batch`, `POST /sentiment`,
/// `GET /health`. Every call carries a bounded timeout; every failure
/// degrades to the neutral fallback and flips the availability flag.
/// Repeated embeddings of the same text are served from a small LRU cache.
pub struct HttpMlClient {
    base_url: String,
    http: reqwest::Client,
    dims: usize,
    request_timeout: Duration,
    batch_timeout: Duration,
    health_timeout: Duration,
    available: AtomicBool,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl HttpMlClient {
    /// Create a new client from provider configuration.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let cache_size =
            NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            dims: config.embedding_dimensions,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
            available: AtomicBool::new(true),
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Whether the last call to the service succeeded.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn mark_unavailable(&self, endpoint: &str, error: &dyn std::fmt::Display) {
        if self.available.swap(false, Ordering::Relaxed) {
            warn!(%endpoint, %error, "ML service unavailable, falling back to neutral outputs");
        } else {
            debug!(%endpoint, %error, "ML service still unavailable");
        }
    }

    async fn post_json<B: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Option<R> {
        let url = format!("{}{endpoint}", self.base_url);
        let result = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<R>().await {
                Ok(parsed) => {
                    self.available.store(true, Ordering::Relaxed);
                    Some(parsed)
                }
                Err(e) => {
                    self.mark_unavailable(endpoint, &e);
                    None
                }
            },
            Ok(resp) => {
                self.mark_unavailable(endpoint, &format!("HTTP {}", resp.status()));
                None
            }
            Err(e) => {
                self.mark_unavailable(endpoint, &e);
                None
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpMlClient {
    async fn embed(&self, text: &str) -> Embedding {
        if let Some(cached) = self.cache.lock().get(text).cloned() {
            return cached;
        }

        let response: Option<EmbedResponse> = self
            .post_json("/embed", &serde_json::json!({ "text": text }), self.request_timeout)
            .await;

        match response {
            Some(r) if r.embedding.len() == self.dims => {
                let embedding = Embedding(r.embedding);
                self.cache.lock().put(text.to_string(), embedding.clone());
                embedding
            }
            Some(r) => {
                warn!(
                    expected = self.dims,
                    got = r.embedding.len(),
                    "embedding dimension mismatch, using zero vector"
                );
                Embedding::zeros(self.dims)
            }
            None => Embedding::zeros(self.dims),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Embedding> {
        if texts.is_empty() {
            return Vec::new();
        }

        let response: Option<EmbedBatchResponse> = self
            .post_json(
                "/embed/batch",
                &serde_json::json!({ "texts": texts }),
                self.batch_timeout,
            )
            .await;

        match response {
            Some(r) if r.embeddings.len() == texts.len() => {
                r.embeddings.into_iter().map(Embedding).collect()
            }
            _ => texts.iter().map(|_| Embedding::zeros(self.dims)).collect(),
        }
    }

    async fn analyze_sentiment(&self, text: &str) -> AffectState {
        let response: Option<SentimentResponse> = self
            .post_json(
                "/sentiment",
                &serde_json::json!({ "text": text }),
                self.request_timeout,
            )
            .await;

        match response {
            Some(r) => AffectState::new(r.valence, r.arousal),
            None => AffectState::NEUTRAL,
        }
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let result = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<HealthResponse>()
                .await
                .map(|h| h.initialized)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
