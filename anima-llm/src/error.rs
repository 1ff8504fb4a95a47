//! Failure modes of the completion layer.
//!
//! Every variant is soft from the conversation's point of view — the
//! extraction pipeline logs it and skips the pass. The split exists for
//! operational visibility, not control flow.

use thiserror::Error;

/// Errors surfaced by chat-completion backends.
#[derive(Debug, Error)]
pub enum LlmError {
    /// This deployment has no completion backend wired up.
    #[error("no completion backend configured")]
    NoBackend,

    /// Every attempt against the provider failed.
    #[error("completion failed after {attempts} attempt(s), last error: {last_error}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
}
