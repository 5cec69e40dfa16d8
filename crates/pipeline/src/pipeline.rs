//! The processor pipeline runner

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::component::execute_all;
use weir_protocol::{
    join_responses, Closable, Error, Pipeline as PipelineTrait, Processor, Response, Transaction,
    TransactionReceiver, DEFAULT_CHANNEL_CAPACITY,
};

/// A processing stage running a chain of processors
///
/// Consumes transactions from an upstream channel, applies every processor in
/// order, and emits the surviving batches downstream. The upstream response
/// is completed only once every emitted batch has been responded to; multiple
/// result batches join into a single response where the first error wins.
pub struct Pipeline {
    processors: Vec<Arc<dyn Processor>>,

    out_tx: Option<mpsc::Sender<Transaction>>,
    out_rx: Option<TransactionReceiver>,
    consuming: bool,

    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline around a processor chain
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            processors,
            out_tx: Some(out_tx),
            out_rx: Some(out_rx),
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }

    async fn run(
        processors: Vec<Arc<dyn Processor>>,
        mut transactions: TransactionReceiver,
        out_tx: mpsc::Sender<Transaction>,
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
            if Self::dispatch(&processors, tran, &out_tx, &close_token)
                .await
                .is_err()
            {
                break;
            }
        }
        drop(out_tx);
        closed_token.cancel();
        tracing::debug!("pipeline shut down");
    }

    /// Process one transaction and route its responses. Errors mean the
    /// stage should terminate.
    async fn dispatch(
        processors: &[Arc<dyn Processor>],
        tran: Transaction,
        out_tx: &mpsc::Sender<Transaction>,
        close_token: &CancellationToken,
    ) -> Result<(), Error> {
        let (batch, response_tx) = tran.into_inner();
        let (batches, terminated) = execute_all(processors, vec![batch]);

        if let Some(response) = terminated {
            // The chain dropped everything; complete the transaction now.
            let _ = response_tx.send(response);
            return Ok(());
        }

        let mut ports = Vec::with_capacity(batches.len());
        for batch in batches {
            let (out_tran, port) = Transaction::new(batch);
            tokio::select! {
                _ = close_token.cancelled() => return Err(Error::TypeClosed),
                sent = out_tx.send(out_tran) => {
                    sent.map_err(|_| Error::TypeClosed)?;
                }
            }
            ports.push(port);
        }

        let mut responses = Vec::with_capacity(ports.len());
        for port in ports {
            tokio::select! {
                _ = close_token.cancelled() => return Err(Error::TypeClosed),
                res = port => {
                    responses.push(res.unwrap_or(Response::Error(Error::TypeClosed)));
                }
            }
        }

        let _ = response_tx.send(join_responses(&responses));
        Ok(())
    }
}

#[async_trait]
impl Closable for Pipeline {
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
impl PipelineTrait for Pipeline {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        self.consuming = true;
        // The only sender moves into the task: when the stage terminates the
        // downstream channel closes, propagating shutdown.
        let out_tx = self.out_tx.take().ok_or(Error::AlreadyStarted)?;
        tokio::spawn(Self::run(
            self.processors.clone(),
            transactions,
            out_tx,
            self.close_token.clone(),
            self.closed_token.clone(),
        ));
        Ok(())
    }

    fn transaction_chan(&mut self) -> weir_protocol::Result<TransactionReceiver> {
        self.out_rx.take().ok_or(Error::AlreadyStarted)
    }
}
