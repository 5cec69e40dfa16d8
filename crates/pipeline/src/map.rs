//! Bloblang processor - map parts through a query expression

use serde_json::Value;

use weir_bloblang::query::{self, FunctionContext, QueryFn};
use weir_protocol::{Batch, Processor, ProcessorResult};

/// Maps each part of a batch through a query expression
///
/// String results replace the part's raw content; structural results replace
/// its JSON document. An evaluation failure marks that part's fail flag with
/// the error text and leaves its content untouched; sibling parts are
/// unaffected.
pub struct Bloblang {
    expr: QueryFn,
}

impl Bloblang {
    /// Parse the expression, failing at configuration time when malformed
    pub fn new(expr: &str) -> weir_bloblang::Result<Self> {
        Ok(Self {
            expr: query::parse_exact(expr)?,
        })
    }
}

impl Processor for Bloblang {
    fn process(&self, mut batch: Batch) -> ProcessorResult {
        for index in 0..batch.len() {
            let result = {
                let ctx = FunctionContext::new(index as i64, &batch);
                self.expr.exec(&ctx)
            };
            let part = batch.get_mut(index).expect("index is in range");
            match result {
                Ok(Value::String(s)) => part.set_data(s.into_bytes()),
                Ok(value) => {
                    if let Err(err) = part.set_json(value) {
                        part.set_failed(err.to_string());
                    }
                }
                Err(err) => part.set_failed(err.to_string()),
            }
        }
        (vec![batch], None)
    }
}
