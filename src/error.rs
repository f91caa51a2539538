//! Error taxonomy for the cache subsystem.
//!
//! Only programmer-contract violations and configuration mistakes surface
//! as errors. Lock contention is reported as a miss (reads) or `false`
//! (writes), and malformed stored payloads degrade to a miss.

use thiserror::Error;

/// Errors raised by cache construction and strict retrieval.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A `MustExist` lookup ended in a miss after the full chain was
    /// consulted. This is a caller bug, not a recoverable condition.
    #[error("key `{key}` was not found in any cache tier and could not be loaded")]
    MissingKey { key: String },

    /// A `MustExist` batch lookup left at least one requested key
    /// unresolved.
    #[error("keys {keys:?} were not found in any cache tier and could not be loaded")]
    MissingKeys { keys: Vec<String> },

    /// A `MustExist` batch read could not acquire the read lock for one
    /// of the requested keys.
    #[error("could not acquire a read lock for key `{key}`")]
    LockDenied { key: String },

    /// The factory has no definition registered under this id.
    #[error("unknown cache definition `{0}`")]
    UnknownDefinition(String),

    /// A definition is bound to a store backend the factory does not know.
    #[error("unknown cache store backend `{0}`")]
    UnknownStore(String),

    /// A definition or settings value is unusable as configured.
    #[error("invalid cache configuration: {0}")]
    Config(String),
}
