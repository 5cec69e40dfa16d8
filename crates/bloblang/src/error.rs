//! Bloblang error types

use thiserror::Error as ThisError;

use crate::parser::ParserError;

/// Errors produced while building or evaluating expressions
#[derive(Debug, ThisError, Clone, PartialEq)]
pub enum Error {
    /// The expression failed to parse. Construction-time and fatal.
    #[error("failed to parse expression: {0}")]
    Parse(ParserError),

    /// The expression failed while evaluating against a message.
    #[error("{0}")]
    Eval(String),
}

impl Error {
    /// Wrap an evaluation failure message
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Eval(msg.into())
    }
}

impl From<ParserError> for Error {
    fn from(err: ParserError) -> Self {
        Self::Parse(err)
    }
}
