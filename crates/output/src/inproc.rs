//! Inproc - output feeding a named in-process pipe

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use weir_manager::Manager;
use weir_protocol::{Closable, Error, Output, Response, TransactionReceiver};

/// How long to wait between pipe lookups while the matching input is absent
const PIPE_RETRY: Duration = Duration::from_millis(100);

/// Forwards transactions into a named pipe registered with the manager
///
/// Transactions pass through untouched, response ports included, so the
/// ultimate consumer of the pipe acknowledges directly to this output's
/// upstream. When the pipe is not yet bound (the matching inproc input has
/// not started) the output retries the lookup.
pub struct Inproc {
    name: String,
    manager: Arc<Manager>,
    consuming: bool,
    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl Inproc {
    /// Create an inproc output targeting a named pipe
    pub fn new(name: impl Into<String>, manager: Arc<Manager>) -> Self {
        Self {
            name: name.into(),
            manager,
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

async fn run_inproc(
    name: String,
    manager: Arc<Manager>,
    mut transactions: TransactionReceiver,
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

        // Look up the pipe fresh for every send: the matching input may not
        // have started yet, or may have been replaced.
        let mut tran = Some(tran);
        loop {
            let pipe = match manager.get_pipe(&name) {
                Ok(pipe) => pipe,
                Err(_) => {
                    tokio::select! {
                        _ = close_token.cancelled() => {
                            nack_closed(tran.take());
                            break 'outer;
                        }
                        _ = tokio::time::sleep(PIPE_RETRY) => continue,
                    }
                }
            };
            match pipe.send(tran.take().expect("transaction pending")).await {
                Ok(()) => break,
                Err(send_err) => {
                    // The input went away mid-send; recover the transaction
                    // and wait for a re-bind.
                    tran = Some(send_err.0);
                    tokio::select! {
                        _ = close_token.cancelled() => {
                            nack_closed(tran.take());
                            break 'outer;
                        }
                        _ = tokio::time::sleep(PIPE_RETRY) => {}
                    }
                }
            }
        }
    }
    closed_token.cancel();
    tracing::debug!(pipe = %name, "inproc output shut down");
}

fn nack_closed(tran: Option<weir_protocol::Transaction>) {
    if let Some(tran) = tran {
        let _ = tran.respond(Response::Error(Error::TypeClosed));
    }
}

#[async_trait]
impl Closable for Inproc {
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
impl Output for Inproc {
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        self.consuming = true;
        tokio::spawn(run_inproc(
            self.name.clone(),
            Arc::clone(&self.manager),
            transactions,
            self.close_token.clone(),
            self.closed_token.clone(),
        ));
        Ok(())
    }

    fn connected(&self) -> bool {
        self.manager.get_pipe(&self.name).is_ok()
    }
}
