//! Weir Output - output-side wrappers
//!
//! Drivers implement the minimal [`weir_protocol::AsyncWriter`] contract;
//! this crate supplies the machinery that turns a driver into a pipeline
//! [`Output`](weir_protocol::Output):
//!
//! - [`Writer`] runs `max_in_flight` worker tasks over one driver,
//!   serialises reconnection, and maps write outcomes onto transaction
//!   responses.
//! - [`Batcher`] applies a batch policy at the output boundary, fanning the
//!   downstream response out to every contributing upstream transaction.
//! - [`Inproc`] forwards transactions into a named in-process pipe.
//! - [`Null`] acknowledges and discards everything.
//! - [`roundtrip::Writer`] copies written batches into the result store
//!   attached to the batch's parts (request/response execution).

mod batcher;
mod common;
mod inproc;
mod null;
mod writer;

pub mod roundtrip;

pub use batcher::Batcher;
pub use common::{WriterMetrics, WriterMetricsSnapshot};
pub use inproc::Inproc;
pub use null::Null;
pub use writer::{Writer, WriterConfig};

#[cfg(test)]
#[path = "batcher_test.rs"]
mod batcher_test;
