//! Response - the acknowledgement half of a transaction
//!
//! Exactly one response travels back per transaction: an ack, a nack carrying
//! the error, or the skip sentinel by which a consumer declines to
//! acknowledge (upstream treats the delivery as at-most-once).

use crate::error::Error;

/// The outcome of processing a transaction's batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The batch was fully processed downstream.
    Ack,
    /// Processing failed; the originating input decides whether to
    /// re-deliver, dead-letter, or drop.
    Error(Error),
    /// The consumer declines to acknowledge.
    Unack,
}

impl Response {
    /// An acknowledgement
    pub fn ack() -> Self {
        Self::Ack
    }

    /// A negative acknowledgement carrying an error
    pub fn error(err: Error) -> Self {
        Self::Error(err)
    }

    /// The skip-ack sentinel
    pub fn unack() -> Self {
        Self::Unack
    }

    /// The carried error, when this is a nack
    pub fn err(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the consumer skipped acknowledgement
    #[inline]
    pub fn skip_ack(&self) -> bool {
        matches!(self, Self::Unack)
    }

    /// Whether this is a plain acknowledgement
    #[inline]
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}
