//! FanOut - concurrent delivery to every target

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::{
    Closable, Error, Output, Response, Transaction, TransactionReceiver,
};

use crate::common::{wire_children, wait_broker_closed, RETRY_PAUSE};

/// Copies each transaction to all targets concurrently
///
/// Every target receives a deep copy of the batch so it can mutate
/// independently of its siblings. The upstream transaction is acknowledged
/// only once every target has acknowledged; targets that nack are redelivered
/// (alone) until they succeed or shutdown is requested. No new upstream
/// transaction is accepted until the current one fully resolves.
pub struct FanOut {
    children: Vec<Box<dyn Output>>,
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl FanOut {
    /// Create a fan-out broker over a set of outputs
    pub fn new(children: Vec<Box<dyn Output>>) -> Self {
        Self {
            children,
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_fan_out(
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

        let mut remaining: Vec<usize> = (0..child_txs.len()).collect();
        let mut skipped = false;
        loop {
            // Dispatch a copy to every remaining target before waiting on
            // any response.
            let mut ports = Vec::with_capacity(remaining.len());
            for &index in &remaining {
                let (child_tran, port) = Transaction::new(batch.deep_copy());
                tokio::select! {
                    _ = close_token.cancelled() => break 'outer,
                    sent = child_txs[index].send(child_tran) => {
                        if sent.is_err() {
                            break 'outer;
                        }
                    }
                }
                ports.push((index, port));
            }

            let mut nacked = Vec::new();
            for (index, port) in ports {
                let response = tokio::select! {
                    _ = close_token.cancelled() => break 'outer,
                    response = port => {
                        response.unwrap_or(Response::Error(Error::TypeClosed))
                    }
                };
                match response {
                    Response::Ack => {}
                    Response::Unack => skipped = true,
                    Response::Error(err) => {
                        tracing::error!(
                            output = index,
                            error = %err,
                            "failed to dispatch message, retrying"
                        );
                        nacked.push(index);
                    }
                }
            }

            if nacked.is_empty() {
                let response = if skipped { Response::Unack } else { Response::Ack };
                let _ = response_tx.send(response);
                break;
            }
            remaining = nacked;

            tokio::select! {
                _ = close_token.cancelled() => break 'outer,
                _ = tokio::time::sleep(RETRY_PAUSE) => {}
            }
        }
    }
    closed_token.cancel();
    tracing::debug!("fan out broker shut down");
}

#[async_trait]
impl Closable for FanOut {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        wait_broker_closed(self.consuming, &self.closed_token, &self.children, timeout).await
    }
}

#[async_trait]
impl Output for FanOut {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        let child_txs = wire_children(&mut self.children)?;
        self.consuming = true;

        tokio::spawn(run_fan_out(
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
