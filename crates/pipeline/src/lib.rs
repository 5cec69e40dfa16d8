//! Weir Pipeline - processor chain runtime
//!
//! A [`Pipeline`] consumes transactions, runs a chain of processors over each
//! batch, emits the results downstream, and routes the downstream responses
//! back to the originating transaction. When a processor terminates a
//! transaction (filter-style drop), the upstream response is completed
//! immediately.
//!
//! ```text
//! [Input] ──▶ Pipeline ──▶ [Output]
//!     ◀── response ◀── response
//! ```
//!
//! Composite processors (`ForEach`, `Try`) and the condition set used by
//! batch policies and conditional checks also live here.

mod for_each;
mod map;
mod pipeline;
mod try_;

pub mod conditions;

pub use for_each::ForEach;
pub use map::Bloblang;
pub use pipeline::Pipeline;
pub use try_::Try;
