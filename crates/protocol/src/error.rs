//! Error sentinels shared across the engine
//!
//! Components match on these variants to drive recovery decisions, so their
//! identity is part of the public contract: `NotConnected` always means
//! "reconnect and retry", `TypeClosed` always means "shut down cleanly".

use thiserror::Error;

/// Errors that can occur during stream engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A driver lost (or never established) its connection. Always
    /// recoverable via reconnect.
    #[error("not connected to target source or sink")]
    NotConnected,

    /// A blocking operation exceeded its deadline.
    #[error("action timed out")]
    Timeout,

    /// The component has been instructed to shut down.
    #[error("type was closed")]
    TypeClosed,

    /// `consume` was called on a component that already has an upstream.
    #[error("type has already been started")]
    AlreadyStarted,

    /// A lookup for a named cache resource failed.
    #[error("cache resource not found")]
    CacheNotFound,

    /// A lookup for a named condition resource failed.
    #[error("condition resource not found")]
    ConditionNotFound,

    /// A lookup for a named processor resource failed.
    #[error("processor resource not found")]
    ProcessorNotFound,

    /// A lookup for a named rate limit resource failed.
    #[error("rate limit resource not found")]
    RateLimitNotFound,

    /// A lookup for a named transaction pipe failed.
    #[error("pipe was not found")]
    PipeNotFound,

    /// A cache `add` hit a key that already exists.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// A cache lookup missed.
    #[error("key does not exist")]
    KeyNotFound,

    /// An unexpected empty or partial read.
    #[error("message is empty")]
    MessageEmpty,

    /// A part index was out of bounds for its batch.
    #[error("target message part does not exist")]
    PartOutOfBounds,

    /// The part's content could not be parsed as a JSON document.
    #[error("failed to parse message part as JSON: {0}")]
    JsonParse(String),

    /// A runtime failure reported by a driver or processor, carried through
    /// nack responses.
    #[error("{0}")]
    Runtime(String),
}

impl Error {
    /// Wrap an arbitrary error message as a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Whether the error indicates lost connectivity, in which case the
    /// caller should reconnect and retry rather than nack.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}
