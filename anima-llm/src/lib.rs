//! # anima-llm — LLM Completion Layer for Anima
//!
//! A thin chat-completion client plus the memory-extraction pipeline that
//! turns a window of recent conversation into structured memory candidates.
//!
//! All LLM access goes through the [`client::ChatBackend`] capability trait
//! so extraction is testable without a network. Extraction itself is
//! best-effort end to end: an unreachable provider or malformed model
//! output yields an empty result, never an error — conversations must not
//! stall because a background enrichment failed.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod extraction;
pub mod prompt;
pub mod types;

pub use client::{ChatBackend, LlmClient, OfflineBackend};
pub use error::LlmError;
pub use types::{ChatRequest, ChatResponse, ChatTurn, ExtractedMemories, TurnRole};
