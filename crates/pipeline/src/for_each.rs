//! ForEach - run a child chain on every part independently

use std::sync::Arc;

use weir_protocol::component::execute_all;
use weir_protocol::{Batch, Processor, ProcessorResult};

/// Runs a chain of child processors on each part of a batch in isolation
///
/// Each part is wrapped in its own single-part batch before the children run,
/// so processors that inspect batch context see only that part. Parts whose
/// child chain drops everything are omitted; the survivors are reassembled
/// into one output batch in their original order.
pub struct ForEach {
    children: Vec<Arc<dyn Processor>>,
}

impl ForEach {
    /// Create a for-each wrapper around a child chain
    pub fn new(children: Vec<Arc<dyn Processor>>) -> Self {
        Self { children }
    }
}

impl Processor for ForEach {
    fn process(&self, batch: Batch) -> ProcessorResult {
        let mut out = Batch::new();
        for part in batch {
            let single = Batch::from_parts(vec![part]);
            let (batches, _) = execute_all(&self.children, vec![single]);
            for produced in batches {
                for part in produced {
                    out.push(part);
                }
            }
        }
        (vec![out], None)
    }
}
