//! Hard-failure types for the Anima core engine.
//!
//! Only storage and configuration problems live here — they must reach the
//! caller, because a swallowed storage error would break the invariant that
//! a successful `store()` left a record+vector pair behind. Provider
//! unavailability is deliberately absent: the embedding layer degrades to
//! neutral fallbacks instead of erroring (see [`crate::embedding`]).

use thiserror::Error;

/// A hard failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// SQLite storage failure.
    #[error("storage failure: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded back into engine types.
    #[error("corrupt stored value: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem failure while loading configuration.
    #[error("config file unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
