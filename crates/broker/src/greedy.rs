//! Greedy - first-ready target wins

use std::time::Duration;

use async_trait::async_trait;
use futures::future::select_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::{Closable, Error, Output, Transaction, TransactionReceiver};

use crate::common::{wire_children, wait_broker_closed};

/// Offers each transaction to whichever target is ready to receive first
///
/// The transaction travels unchanged, response port included: the chosen
/// target owns the acknowledgement. Selection across equally-ready targets
/// is non-deterministic; a slow target simply stops winning the race.
pub struct Greedy {
    children: Vec<Box<dyn Output>>,
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl Greedy {
    /// Create a greedy broker over a set of outputs
    pub fn new(children: Vec<Box<dyn Output>>) -> Self {
        Self {
            children,
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_greedy(
    mut transactions: TransactionReceiver,
    child_txs: Vec<mpsc::Sender<Transaction>>,
    close_token: CancellationToken,
    closed_token: CancellationToken,
) {
    loop {
        let tran = tokio::select! {
            biased;
            _ = close_token.cancelled() => break,
            tran = transactions.recv() => match tran {
                Some(tran) => tran,
                None => break,
            },
        };

        // Race a capacity reservation across every target; the first permit
        // wins the transaction and the losing reservations are dropped.
        let reservations = child_txs
            .iter()
            .map(|tx| Box::pin(tx.reserve()))
            .collect::<Vec<_>>();
        let permit = tokio::select! {
            _ = close_token.cancelled() => break,
            (permit, _, _) = select_all(reservations) => permit,
        };
        match permit {
            Ok(permit) => permit.send(tran),
            Err(_) => break,
        }
    }
    closed_token.cancel();
    tracing::debug!("greedy broker shut down");
}

#[async_trait]
impl Closable for Greedy {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        wait_broker_closed(self.consuming, &self.closed_token, &self.children, timeout).await
    }
}

#[async_trait]
impl Output for Greedy {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        let child_txs = wire_children(&mut self.children)?;
        self.consuming = true;

        tokio::spawn(run_greedy(
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
