//! Roundtrip result store
//!
//! Request/response execution (e.g. a serverless invocation) needs the
//! results of a pipeline run handed back to the caller rather than written to
//! an external sink. A `ResultStore` is attached to the ambient context of
//! every part in the request batch; outputs that participate in roundtrips
//! deep-copy their batches into the store, and the handler collects them once
//! the transaction's response arrives.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::Batch;
use crate::part::Part;

/// Context-attached collector for roundtrip batches
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Mutex<Vec<Batch>>,
}

impl ResultStore {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a result batch
    pub fn add(&self, batch: Batch) {
        self.results.lock().push(batch);
    }

    /// Take a snapshot of all collected batches
    pub fn get(&self) -> Vec<Batch> {
        self.results.lock().clone()
    }

    /// Discard all collected batches
    pub fn clear(&self) {
        self.results.lock().clear();
    }
}

/// Attach a store to the ambient context of every part in the batch
///
/// Parts carry the store through the pipeline even when batches are split or
/// recombined, so attach before dispatching the transaction.
pub fn add_result_store(batch: &mut Batch, store: &Arc<ResultStore>) {
    for part in batch.iter_mut() {
        part.context_mut().set(Arc::clone(store));
    }
}

/// Fetch the store attached to a part, if any
pub fn result_store(part: &Part) -> Option<Arc<ResultStore>> {
    part.context().get::<ResultStore>()
}
