//! Weir Protocol - Core types for the Weir stream engine
//!
//! This crate provides the foundational types that flow through the pipeline:
//! - `Part` - A single message: bytes, metadata, an optional parsed JSON view
//! - `Batch` - An ordered sequence of parts traveling together
//! - `Transaction` - A batch coupled with a one-shot response port
//! - `Response` - Ack, nack-with-error, or skip-ack
//!
//! It also defines the contracts every component implements:
//! - `Closable` / `Input` / `Output` / `Pipeline` - the channel-passing shape
//!   that makes components freely composable
//! - `Processor` / `Cache` / `Condition` / `RateLimit` - the pluggable driver
//!   seams
//!
//! # Design
//!
//! - **Copy-on-write**: parts are immutable-with-copy; `bytes::Bytes` makes
//!   shallow copies cheap, `deep_copy` severs all sharing before independent
//!   mutation (brokers deep-copy per fan-out target)
//! - **One response per transaction**: the response port is a
//!   `tokio::sync::oneshot` sender, consumed on first use
//! - **Stable error sentinels**: downstream components match on `Error`
//!   variants, never on message strings

mod context;
mod error;
mod message;
mod metadata;
mod part;
mod response;
mod transaction;

pub mod component;
pub mod roundtrip;

pub use context::Context;
pub use error::Error;
pub use message::Batch;
pub use metadata::Metadata;
pub use part::{Part, FAIL_FLAG_KEY};
pub use response::Response;
pub use transaction::{ResponsePort, Transaction};

pub use component::{
    ack_fn, execute_all, join_responses, noop_ack, AckFn, AsyncReader, AsyncWriter, Cache,
    Closable, Condition, Input, Output, Pipeline, Processor, ProcessorResult, RateLimit,
    TransactionReceiver, TransactionSender,
};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Default capacity of transaction channels between components
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

#[cfg(test)]
#[path = "transaction_test.rs"]
mod transaction_test;
