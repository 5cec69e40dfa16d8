//! Batcher - apply a batch policy at the output boundary

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use weir_batch::Policy;
use weir_protocol::{
    Closable, Error, Output, Response, Transaction, TransactionReceiver,
    DEFAULT_CHANNEL_CAPACITY,
};

/// Wraps an output with a batch policy
///
/// Incoming transactions contribute their parts to the policy and park their
/// response ports. On flush the combined batch travels to the child output
/// as one transaction, and the child's single response is forwarded to
/// every contributor - a single nack from the output nacks them all.
///
/// Shutdown performs a final flush bounded by the close timeout; a
/// `wait_for_close` timeout escalates to a full stop that abandons pending
/// response forwarding.
pub struct Batcher<O> {
    child: O,
    policy: Option<Policy>,
    consuming: bool,

    close_token: CancellationToken,
    fully_close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl<O> Batcher<O>
where
    O: Output + Send + 'static,
{
    /// Wrap a child output with a policy
    pub fn new(policy: Policy, child: O) -> Self {
        Self {
            child,
            policy: Some(policy),
            consuming: false,
            close_token: CancellationToken::new(),
            fully_close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_batcher(
    mut policy: Policy,
    mut transactions: TransactionReceiver,
    out_tx: mpsc::Sender<Transaction>,
    close_token: CancellationToken,
    fully_close_token: CancellationToken,
    closed_token: CancellationToken,
) {
    let mut pending_ports: Vec<oneshot::Sender<Response>> = Vec::new();
    let mut running = true;

    while running {
        let mut flush = false;

        let until_timed_flush = policy.until_next();
        tokio::select! {
            biased;
            _ = close_token.cancelled() => {
                running = false;
                flush = true;
            }
            tran = transactions.recv() => match tran {
                Some(tran) => {
                    let (batch, port) = tran.into_inner();
                    for part in batch {
                        if policy.add(part) {
                            flush = true;
                        }
                    }
                    pending_ports.push(port);
                }
                None => {
                    // Upstream finished; emit whatever remains and stop.
                    running = false;
                    flush = true;
                }
            },
            _ = async {
                match until_timed_flush {
                    Some(remaining) => tokio::time::sleep(remaining).await,
                    None => std::future::pending().await,
                }
            } => {
                flush = true;
            }
        }

        if !flush {
            continue;
        }
        let Some(batch) = policy.flush() else {
            continue;
        };

        let (out_tran, response_port) = Transaction::new(batch);
        tokio::select! {
            _ = fully_close_token.cancelled() => break,
            sent = out_tx.send(out_tran) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        // Forward the child's single response to every contributor, off the
        // hot loop so batching continues while the child writes.
        let ports = std::mem::take(&mut pending_ports);
        let fully_close = fully_close_token.clone();
        tokio::spawn(async move {
            let response = tokio::select! {
                _ = fully_close.cancelled() => return,
                response = response_port => {
                    response.unwrap_or(Response::Error(Error::TypeClosed))
                }
            };
            for port in ports {
                let _ = port.send(response.clone());
            }
        });
    }

    // Dropping the only sender closes the child's input, letting it drain
    // and terminate on its own.
    drop(out_tx);
    closed_token.cancel();
    tracing::debug!("output batcher shut down");
}

#[async_trait]
impl<O> Closable for Batcher<O>
where
    O: Output + Send + 'static,
{
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        if !self.consuming {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        if tokio::time::timeout(timeout, self.closed_token.cancelled())
            .await
            .is_err()
        {
            self.fully_close_token.cancel();
            return Err(Error::Timeout);
        }
        self.child.close_async();
        self.child
            .wait_for_close(deadline.saturating_duration_since(Instant::now()))
            .await
    }
}

#[async_trait]
impl<O> Output for Batcher<O>
where
    O: Output + Send + 'static,
{
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        let policy = self.policy.take().ok_or(Error::AlreadyStarted)?;

        let (out_tx, out_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        self.child.consume(out_rx)?;
        self.consuming = true;

        tokio::spawn(run_batcher(
            policy,
            transactions,
            out_tx,
            self.close_token.clone(),
            self.fully_close_token.clone(),
            self.closed_token.clone(),
        ));
        Ok(())
    }

    fn connected(&self) -> bool {
        self.child.connected()
    }
}
