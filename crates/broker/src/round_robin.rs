//! RoundRobin - strict rotation across targets

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::{Closable, Error, Output, Transaction, TransactionReceiver};

use crate::common::{wire_children, wait_broker_closed};

/// Dispatches transactions to targets in strict rotation
///
/// The transaction travels unchanged, response port included: the chosen
/// target owns the acknowledgement. Rotation is deterministic, so K
/// transactions across N targets land K/N each when K divides evenly.
pub struct RoundRobin {
    children: Vec<Box<dyn Output>>,
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl RoundRobin {
    /// Create a round-robin broker over a set of outputs
    pub fn new(children: Vec<Box<dyn Output>>) -> Self {
        Self {
            children,
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_round_robin(
    mut transactions: TransactionReceiver,
    child_txs: Vec<mpsc::Sender<Transaction>>,
    close_token: CancellationToken,
    closed_token: CancellationToken,
) {
    let mut next = 0usize;
    loop {
        let tran = tokio::select! {
            biased;
            _ = close_token.cancelled() => break,
            tran = transactions.recv() => match tran {
                Some(tran) => tran,
                None => break,
            },
        };

        let target = &child_txs[next];
        next = (next + 1) % child_txs.len();

        tokio::select! {
            _ = close_token.cancelled() => break,
            sent = target.send(tran) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    closed_token.cancel();
    tracing::debug!("round robin broker shut down");
}

#[async_trait]
impl Closable for RoundRobin {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        wait_broker_closed(self.consuming, &self.closed_token, &self.children, timeout).await
    }
}

#[async_trait]
impl Output for RoundRobin {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        let child_txs = wire_children(&mut self.children)?;
        self.consuming = true;

        tokio::spawn(run_round_robin(
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
