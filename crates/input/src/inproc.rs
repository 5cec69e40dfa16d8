//! Inproc - input fed by a named in-process pipe

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use weir_manager::Manager;
use weir_protocol::{
    Closable, Error, Input, TransactionReceiver, TransactionSender, DEFAULT_CHANNEL_CAPACITY,
};

/// Serves transactions sent to a named pipe
///
/// The input owns the pipe: it creates the channel, binds the send end under
/// the configured name, and exposes the receive end to the pipeline.
/// Transactions travel through untouched, so response ports pass end-to-end
/// between the producing output and this input's consumer.
pub struct Inproc {
    name: String,
    manager: Arc<Manager>,
    pipe_tx: TransactionSender,
    out_rx: Option<TransactionReceiver>,
}

impl Inproc {
    /// Create the pipe and bind it with the manager
    pub fn new(name: impl Into<String>, manager: Arc<Manager>) -> Self {
        let name = name.into();
        let (pipe_tx, out_rx) = tokio::sync::mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        manager.set_pipe(&name, pipe_tx.clone());
        tracing::info!(pipe = %name, "inproc input listening");
        Self {
            name,
            manager,
            pipe_tx,
            out_rx: Some(out_rx),
        }
    }
}

#[async_trait]
impl Closable for Inproc {
    fn close_async(&self) {
        // A stale unset after the name was re-bound is a no-op.
        self.manager.unset_pipe(&self.name, &self.pipe_tx);
    }

    async fn wait_for_close(&self, _timeout: Duration) -> weir_protocol::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Input for Inproc {
    fn transaction_chan(&mut self) -> weir_protocol::Result<TransactionReceiver> {
        self.out_rx.take().ok_or(Error::AlreadyStarted)
    }

    fn connected(&self) -> bool {
        true
    }
}
