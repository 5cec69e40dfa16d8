//! Weir Input - input-side wrappers
//!
//! Drivers implement the minimal [`weir_protocol::AsyncReader`] contract;
//! this crate supplies the machinery that turns a driver into a pipeline
//! [`Input`](weir_protocol::Input):
//!
//! - [`Reader`] owns the driver's connection lifecycle (reconnect with
//!   backoff), forwards each read as a transaction, and routes responses
//!   back through the driver's ack function, out of order where needed.
//! - [`Batcher`] adapts a single-message driver to a batch policy with a
//!   composite acknowledgement.
//! - [`Inproc`] serves transactions sent to a named in-process pipe.

mod async_reader;
mod batcher;
mod common;
mod inproc;

pub use async_reader::{Reader, ReaderConfig};
pub use batcher::{batched, Batcher};
pub use common::{ReaderMetrics, ReaderMetricsSnapshot};
pub use inproc::Inproc;

#[cfg(test)]
#[path = "async_reader_test.rs"]
mod async_reader_test;
#[cfg(test)]
#[path = "inproc_test.rs"]
mod inproc_test;
