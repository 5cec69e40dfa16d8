//! Roundtrip writer - store batches for request/response execution

use std::time::Duration;

use async_trait::async_trait;

use weir_protocol::roundtrip::result_store;
use weir_protocol::{AsyncWriter, Batch, Error};

/// A writer that deposits batches into the result store attached to their
/// parts
///
/// Serverless-style execution attaches a store to the request batch; any
/// batch descended from it that reaches this writer is deep-copied into the
/// store for the handler to collect. A batch with no attached store is
/// acknowledged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Writer;

#[async_trait]
impl AsyncWriter for Writer {
    async fn connect(&self) -> weir_protocol::Result<()> {
        Ok(())
    }

    async fn write(&self, batch: Batch) -> weir_protocol::Result<()> {
        let Some(part) = batch.get(0) else {
            return Ok(());
        };
        match result_store(part) {
            Some(store) => {
                store.add(batch.deep_copy());
                Ok(())
            }
            None => {
                tracing::debug!("batch reached response writer without a result store");
                Err(Error::runtime(
                    "result store not attached to message, cannot respond",
                ))
            }
        }
    }

    fn close_async(&self) {}

    async fn wait_for_close(&self, _timeout: Duration) -> weir_protocol::Result<()> {
        Ok(())
    }
}
