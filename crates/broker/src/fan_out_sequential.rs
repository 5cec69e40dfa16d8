//! FanOutSequential - ordered delivery to every target

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::{
    Closable, Error, Output, Response, Transaction, TransactionReceiver,
};

use crate::common::{wire_children, wait_broker_closed, RETRY_PAUSE};

/// Delivers each transaction to targets one at a time in declared order
///
/// The broker waits for each target's acknowledgement before moving to the
/// next; a nacking target is redelivered until it acknowledges. The upstream
/// acknowledgement follows the final target's.
pub struct FanOutSequential {
    children: Vec<Box<dyn Output>>,
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl FanOutSequential {
    /// Create a sequential fan-out broker over a set of outputs
    pub fn new(children: Vec<Box<dyn Output>>) -> Self {
        Self {
            children,
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_sequential(
    mut transactions: TransactionReceiver,
    child_txs: Vec<mpsc::Sender<Transaction>>,
    close_token: CancellationToken,
    closed_token: CancellationToken,
) {
    'outer: loop {
        let tran = tokio::select! {
            biased;
            _ = close_token.cancelled() => break,
            tran = transactions.recv() => match tran {
                Some(tran) => tran,
                None => break,
            },
        };
        let (batch, response_tx) = tran.into_inner();

        let mut skipped = false;
        for (index, child_tx) in child_txs.iter().enumerate() {
            // Redeliver to this target until it acknowledges, then move on.
            loop {
                let (child_tran, port) = Transaction::new(batch.deep_copy());
                tokio::select! {
                    _ = close_token.cancelled() => break 'outer,
                    sent = child_tx.send(child_tran) => {
                        if sent.is_err() {
                            break 'outer;
                        }
                    }
                }
                let response = tokio::select! {
                    _ = close_token.cancelled() => break 'outer,
                    response = port => {
                        response.unwrap_or(Response::Error(Error::TypeClosed))
                    }
                };
                match response {
                    Response::Ack => break,
                    Response::Unack => {
                        skipped = true;
                        break;
                    }
                    Response::Error(err) => {
                        tracing::error!(
                            output = index,
                            error = %err,
                            "failed to dispatch message, retrying"
                        );
                        tokio::select! {
                            _ = close_token.cancelled() => break 'outer,
                            _ = tokio::time::sleep(RETRY_PAUSE) => {}
                        }
                    }
                }
            }
        }

        let response = if skipped { Response::Unack } else { Response::Ack };
        let _ = response_tx.send(response);
    }
    closed_token.cancel();
    tracing::debug!("sequential fan out broker shut down");
}

#[async_trait]
impl Closable for FanOutSequential {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        wait_broker_closed(self.consuming, &self.closed_token, &self.children, timeout).await
    }
}

#[async_trait]
impl Output for FanOutSequential {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        let child_txs = wire_children(&mut self.children)?;
        self.consuming = true;

        tokio::spawn(run_sequential(
            transactions,
            child_txs,
            self.close_token.clone(),
            self.closed_token.clone(),
        ));
        Ok(())
    }

    fn connected(&self) -> bool {
        self.children.iter().all(|c| c.connected())
    }
}
