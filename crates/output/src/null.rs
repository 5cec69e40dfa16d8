//! Null - acknowledge and discard

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use weir_protocol::{Closable, Error, Output, Response, TransactionReceiver};

/// Discards every batch it receives, acknowledging immediately
///
/// The null sink of the engine: useful when a pipeline is run purely for its
/// side effects, and in tests.
#[derive(Default)]
pub struct Null {
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl Null {
    /// Create a null output
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Closable for Null {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        if !self.consuming {
            return Ok(());
        }
        tokio::time::timeout(timeout, self.closed_token.cancelled())
            .await
            .map_err(|_| Error::Timeout)
    }
}

#[async_trait]
impl Output for Null {
    fn consume(&mut self, mut transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        self.consuming = true;

        let close_token = self.close_token.clone();
        let closed_token = self.closed_token.clone();
        tokio::spawn(async move {
            loop {
                let tran = tokio::select! {
                    biased;
                    _ = close_token.cancelled() => break,
                    tran = transactions.recv() => match tran {
                        Some(tran) => tran,
                        None => break,
                    },
                };
                tracing::trace!(parts = tran.payload().len(), "dropping batch");
                let _ = tran.respond(Response::ack());
            }
            closed_token.cancel();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }
}
