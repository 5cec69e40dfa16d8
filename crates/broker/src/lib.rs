//! Weir Broker - multi-output dispatch
//!
//! Brokers are outputs that feed other outputs:
//!
//! - [`FanOut`] copies each transaction to every target concurrently and
//!   retries only the targets that nack (at-least-once across siblings).
//! - [`FanOutSequential`] delivers to targets one at a time in declared
//!   order, retrying each until it acknowledges.
//! - [`RoundRobin`] dispatches transactions in strict rotation; the chosen
//!   target owns the acknowledgement.
//! - [`Greedy`] offers each transaction to the first target ready to
//!   receive; non-deterministic across targets.
//!
//! Ordering: within each target FIFO holds; across fan-out siblings there is
//! no ordering guarantee.

mod fan_out;
mod fan_out_sequential;
mod greedy;
mod round_robin;

mod common;

pub use fan_out::FanOut;
pub use fan_out_sequential::FanOutSequential;
pub use greedy::Greedy;
pub use round_robin::RoundRobin;

#[cfg(test)]
#[path = "broker_test.rs"]
mod broker_test;
