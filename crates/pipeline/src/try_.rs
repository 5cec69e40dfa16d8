//! Try - per-part chain that skips failed parts

use std::sync::Arc;

use weir_protocol::component::execute_all;
use weir_protocol::{Batch, Processor, ProcessorResult};

/// Runs children in order over each part; once a child marks a part failed,
/// the remaining children skip that part. Failed parts are restored to the
/// output so downstream catch-style handling can observe the fail flag.
pub struct Try {
    children: Vec<Arc<dyn Processor>>,
}

impl Try {
    /// Create a try wrapper around a child chain
    pub fn new(children: Vec<Arc<dyn Processor>>) -> Self {
        Self { children }
    }
}

impl Processor for Try {
    fn process(&self, batch: Batch) -> ProcessorResult {
        let mut out = Batch::new();
        for part in batch {
            let mut lineage = vec![part];
            for child in &self.children {
                if lineage.iter().any(|p| p.failed().is_some()) {
                    break;
                }
                let (batches, _) =
                    execute_all(std::slice::from_ref(child), vec![Batch::from_parts(lineage)]);
                lineage = batches.into_iter().flatten().collect();
                if lineage.is_empty() {
                    break;
                }
            }
            for part in lineage {
                out.push(part);
            }
        }
        (vec![out], None)
    }
}
