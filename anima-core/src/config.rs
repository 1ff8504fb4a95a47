//! Configuration for the Anima engine.
//!
//! Maps directly to `anima.toml`. Every tunable the engine consumes —
//! provider URL and timeouts, tier ceilings, retrieval weights, the recency
//! window, the smoothing carry, and the extraction cadence — is a named
//! field here rather than a literal in the code.

use serde::{Deserialize, Serialize};

use crate::types::MemoryTier;

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Embedding/sentiment provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Per-pair memory ceilings.
    #[serde(default)]
    pub memory: MemoryLimits,
    /// Hybrid retrieval tuning.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Emotion smoothing settings.
    #[serde(default)]
    pub emotion: EmotionConfig,
    /// Extraction pipeline settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// SQLite persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::EngineError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Embedding/sentiment service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the ML service.
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    /// Embedding vector dimensions.
    #[serde(default = "default_384")]
    pub embedding_dimensions: usize,
    /// Timeout for the health probe in milliseconds.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,
    /// Timeout for a single embed/sentiment call in milliseconds.
    #[serde(default = "default_10000")]
    pub request_timeout_ms: u64,
    /// Timeout for a batch embed call in milliseconds.
    #[serde(default = "default_30000")]
    pub batch_timeout_ms: u64,
    /// Capacity of the in-process text → embedding cache.
    #[serde(default = "default_256")]
    pub cache_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            embedding_dimensions: 384,
            health_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
            batch_timeout_ms: 30_000,
            cache_size: 256,
        }
    }
}

/// Per-(character, user) memory ceilings by subscription tier.
///
/// Inserts past the ceiling are dropped silently — no eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLimits {
    /// Ceiling for free-tier users.
    #[serde(default = "default_100")]
    pub free: usize,
    /// Ceiling for pro-tier users.
    #[serde(default = "default_500")]
    pub pro: usize,
    /// Ceiling for team-tier users.
    #[serde(default = "default_2000")]
    pub team: usize,
}

impl MemoryLimits {
    /// The ceiling applying to the given tier.
    #[must_use]
    pub fn limit_for(&self, tier: MemoryTier) -> usize {
        match tier {
            MemoryTier::Free => self.free,
            MemoryTier::Pro => self.pro,
            MemoryTier::Team => self.team,
        }
    }
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            free: 100,
            pro: 500,
            team: 2_000,
        }
    }
}

/// Hybrid retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of memories returned per query.
    #[serde(default = "default_10_usize")]
    pub default_limit: usize,
    /// Number of memories injected into the system prompt.
    #[serde(default = "default_5_usize")]
    pub prompt_limit: usize,
    /// Window of the linear recency decay, in seconds (30 days).
    #[serde(default = "default_recency_window")]
    pub recency_window_secs: u64,
    /// Score weight tuning — must sum to ~1.0.
    #[serde(default)]
    pub weights: RetrievalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            prompt_limit: 5,
            recency_window_secs: 2_592_000,
            weights: RetrievalWeights::default(),
        }
    }
}

/// Hybrid score weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalWeights {
    /// Weight for cosine similarity.
    #[serde(default = "default_0_5")]
    pub similarity: f64,
    /// Weight for stored importance.
    #[serde(default = "default_0_3")]
    pub importance: f64,
    /// Weight for the linear recency term.
    #[serde(default = "default_0_2")]
    pub recency: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            importance: 0.3,
            recency: 0.2,
        }
    }
}

/// Emotion smoothing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// Fraction of the current state kept when blending in new sentiment.
    #[serde(default = "default_0_7")]
    pub smoothing_carry: f32,
    /// Maximum characters of trigger text stored with each sample.
    #[serde(default = "default_200")]
    pub trigger_snippet_chars: usize,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            smoothing_carry: 0.7,
            trigger_snippet_chars: 200,
        }
    }
}

/// Extraction pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Messages between extraction passes. At the default of 1 every
    /// exchange is mined; raise to batch more conversation per pass.
    #[serde(default = "default_1_u32")]
    pub cadence_threshold: u32,
    /// How many trailing messages are fed to each extraction pass.
    #[serde(default = "default_2_usize")]
    pub message_window: usize,
    /// Cap per category requested from the model.
    #[serde(default = "default_3_usize")]
    pub max_per_category: usize,
    /// Model used for the extraction call.
    #[serde(default = "default_extraction_model")]
    pub model: String,
    /// Hard timeout for the extraction LLM call in milliseconds.
    #[serde(default = "default_10000")]
    pub request_timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cadence_threshold: 1,
            message_window: 2,
            max_per_category: 3,
            model: default_extraction_model(),
            request_timeout_ms: 10_000,
        }
    }
}

/// SQLite persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_provider_url() -> String {
    "http://localhost:3001".to_string()
}
fn default_extraction_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_true() -> bool {
    true
}
fn default_0_2() -> f64 {
    0.2
}
fn default_0_3() -> f64 {
    0.3
}
fn default_0_5() -> f64 {
    0.5
}
fn default_0_7() -> f32 {
    0.7
}
fn default_1_u32() -> u32 {
    1
}
fn default_2_usize() -> usize {
    2
}
fn default_3_usize() -> usize {
    3
}
fn default_5_usize() -> usize {
    5
}
fn default_10_usize() -> usize {
    10
}
fn default_100() -> usize {
    100
}
fn default_200() -> usize {
    200
}
fn default_256() -> usize {
    256
}
fn default_384() -> usize {
    384
}
fn default_500() -> usize {
    500
}
fn default_2000() -> usize {
    2_000
}
fn default_health_timeout() -> u64 {
    2_000
}
fn default_5000() -> u64 {
    5_000
}
fn default_10000() -> u64 {
    10_000
}
fn default_30000() -> u64 {
    30_000
}
fn default_recency_window() -> u64 {
    2_592_000
}
