//! # Anima Core Library
//!
//! Persistent memory and emotional state for conversational AI characters.
//!
//! Every (character, user) pair accumulates [`MemoryRecord`]s — facts,
//! preferences, relationships, and events distilled from conversation —
//! and an evolving 2D emotional state ([`AffectState`], valence × arousal).
//! Both feed back into the system prompt of the next turn.
//!
//! The crate is built around three pieces:
//!
//! - [`embedding`] — provider abstraction over an external embedding +
//!   sentiment service, with a neutral fallback that never surfaces
//!   transport failures to callers.
//! - [`store`] — SQLite-backed memory persistence with hybrid scored
//!   retrieval (semantic similarity + importance + recency) computed inside
//!   a single query.
//! - [`emotion`] — append-only emotion samples, exponential smoothing, and
//!   a fixed 12-label valence/arousal map.
//!
//! ## Degradation Contract
//!
//! Network dependencies (embedding service, sentiment model) are best-effort:
//! when they are unreachable the engine degrades to neutral embeddings and
//! neutral sentiment and the conversation continues. Storage failures are
//! the opposite — they always propagate, so a successful `store()` means a
//! record+vector pair exists.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embedding;
pub mod emotion;
pub mod error;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use types::*;
