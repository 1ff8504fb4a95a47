//! # anima-session — Conversation-Session Layer
//!
//! Ties the core memory/emotion engines and the LLM extraction pipeline
//! into per-conversation behavior:
//!
//! - [`character::CharacterCard`] — the persona definition injected into
//!   every prompt
//! - [`prompt`] — section builders and the token-estimate heuristic
//! - [`debug`] — the per-session debug collector and session registry
//! - [`engine::IntelligenceEngine`] — the orchestration point: build the
//!   enhanced system prompt, update emotion per message, and trigger
//!   memory extraction on the configured cadence
//!
//! Debug state is owned by an explicit [`debug::SessionContext`] created
//! and closed through the [`debug::SessionRegistry`] — never looked up
//! from ambient global state.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod character;
pub mod debug;
pub mod engine;
pub mod prompt;

pub use character::CharacterCard;
pub use debug::{DebugCollector, SessionContext, SessionRegistry};
pub use engine::IntelligenceEngine;
