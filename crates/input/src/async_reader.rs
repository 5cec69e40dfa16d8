//! Reader - connection lifecycle and ack tracking around a driver

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use weir_protocol::{
    AsyncReader as ReaderDriver, Closable, Error, Input, Response, Transaction,
    TransactionReceiver, DEFAULT_CHANNEL_CAPACITY,
};

use crate::common::{ReaderMetrics, ReaderMetricsSnapshot};

/// Initial reconnect backoff
const RECONNECT_BASE: Duration = Duration::from_millis(100);

/// Reconnect backoff ceiling
const RECONNECT_CAP: Duration = Duration::from_secs(10);

/// Configuration for the reader wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Component name used in log fields
    pub name: String,

    /// Allow consumers to skip acknowledgement, downgrading delivery for
    /// skipped reads to at-most-once. When disabled a skip is converted to a
    /// nack so the driver re-delivers.
    pub skip_ack: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            name: "reader".to_string(),
            skip_ack: true,
        }
    }
}

/// Wraps an async reader driver into a pipeline input
///
/// A single background task owns the driver: it connects (reconnecting with
/// capped exponential backoff on `NotConnected`), reads batches, and forwards
/// each as a transaction. Responses may arrive out of order across concurrent
/// reads; each read's ack function is invoked exactly once when its response
/// lands.
///
/// Shutdown is cooperative: `close_async` stops reading but outstanding acks
/// still propagate; a `wait_for_close` timeout escalates to a full stop that
/// abandons pending response forwarding.
pub struct Reader {
    out_rx: Option<TransactionReceiver>,
    connected: Arc<AtomicBool>,
    metrics: Arc<ReaderMetrics>,
    close_token: CancellationToken,
    fully_close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl Reader {
    /// Wrap a driver and start its background task
    pub fn new<R>(config: ReaderConfig, driver: R) -> Self
    where
        R: ReaderDriver + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(ReaderMetrics::new());
        let close_token = CancellationToken::new();
        let fully_close_token = CancellationToken::new();
        let closed_token = CancellationToken::new();

        tokio::spawn(run_reader(
            config,
            driver,
            out_tx,
            Arc::clone(&connected),
            Arc::clone(&metrics),
            close_token.clone(),
            fully_close_token.clone(),
            closed_token.clone(),
        ));

        Self {
            out_rx: Some(out_rx),
            connected,
            metrics,
            close_token,
            fully_close_token,
            closed_token,
        }
    }

    /// Get a point-in-time snapshot of the reader's counters
    pub fn metrics(&self) -> ReaderMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl Closable for Reader {
    fn close_async(&self) {
        self.close_token.cancel();
    }

    async fn wait_for_close(&self, timeout: Duration) -> weir_protocol::Result<()> {
        if tokio::time::timeout(timeout, self.closed_token.cancelled())
            .await
            .is_err()
        {
            // Escalate: cancel pending response forwarding.
            self.fully_close_token.cancel();
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl Input for Reader {
    fn transaction_chan(&mut self) -> weir_protocol::Result<TransactionReceiver> {
        self.out_rx.take().ok_or(Error::AlreadyStarted)
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reader<R>(
    config: ReaderConfig,
    mut driver: R,
    out_tx: mpsc::Sender<Transaction>,
    connected: Arc<AtomicBool>,
    metrics: Arc<ReaderMetrics>,
    close_token: CancellationToken,
    fully_close_token: CancellationToken,
    closed_token: CancellationToken,
) where
    R: ReaderDriver + 'static,
{
    let name = config.name.clone();
    let mut pending: JoinSet<()> = JoinSet::new();

    'outer: loop {
        // Establish the connection, backing off between attempts.
        let mut backoff = RECONNECT_BASE;
        loop {
            let result = tokio::select! {
                biased;
                _ = close_token.cancelled() => break 'outer,
                result = driver.connect() => result,
            };
            match result {
                Ok(()) => break,
                Err(Error::TypeClosed) => break 'outer,
                Err(err) => {
                    metrics.record_connection_error();
                    tracing::warn!(input = %name, error = %err, "failed to connect, retrying");
                    tokio::select! {
                        _ = close_token.cancelled() => break 'outer,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(RECONNECT_CAP);
                }
            }
        }
        connected.store(true, Ordering::Release);
        metrics.record_connection();
        tracing::debug!(input = %name, "connected");

        // Read until the connection drops or shutdown is requested.
        loop {
            let result = tokio::select! {
                biased;
                _ = close_token.cancelled() => break 'outer,
                result = driver.read() => result,
            };
            let (batch, ack) = match result {
                Ok(read) => read,
                Err(Error::NotConnected) => {
                    connected.store(false, Ordering::Release);
                    tracing::warn!(input = %name, "connection lost, reconnecting");
                    continue 'outer;
                }
                Err(Error::TypeClosed) => break 'outer,
                Err(Error::Timeout) => continue,
                Err(err) => {
                    metrics.record_read_error();
                    tracing::error!(input = %name, error = %err, "failed to read message");
                    tokio::select! {
                        _ = close_token.cancelled() => break 'outer,
                        _ = tokio::time::sleep(RECONNECT_BASE) => {}
                    }
                    continue;
                }
            };

            metrics.record_batch(batch.len() as u64);
            let (tran, port) = Transaction::new(batch);
            tokio::select! {
                biased;
                _ = close_token.cancelled() => break 'outer,
                sent = out_tx.send(tran) => {
                    if sent.is_err() {
                        break 'outer;
                    }
                }
            }

            // Forward the response to the driver's ack fn, out of band so
            // slow consumers do not block further reads.
            let allow_skip = config.skip_ack;
            let fully_close = fully_close_token.clone();
            let ack_name = name.clone();
            let ack_metrics = Arc::clone(&metrics);
            pending.spawn(async move {
                let response = tokio::select! {
                    _ = fully_close.cancelled() => return,
                    response = port => {
                        response.unwrap_or(Response::Error(Error::TypeClosed))
                    }
                };
                let response = if response.skip_ack() && !allow_skip {
                    // At-least-once: a skipped ack becomes a nack so the
                    // driver re-delivers.
                    Response::error(Error::runtime("message failed to reach a target destination"))
                } else {
                    response
                };
                ack_metrics.record_ack(response.err().is_none());
                if let Err(err) = ack(response).await {
                    tracing::error!(input = %ack_name, error = %err, "failed to acknowledge message");
                }
            });

            // Reap finished forwarders without blocking.
            while pending.try_join_next().is_some() {}
        }
    }

    connected.store(false, Ordering::Release);
    driver.close_async();
    if let Err(err) = driver.wait_for_close(Duration::from_secs(1)).await {
        tracing::warn!(input = %name, error = %err, "driver refused to close in time");
    }

    // Outstanding acks still propagate during a graceful drain; a full close
    // cancels them via the token each forwarder watches.
    while let Some(result) = pending.join_next().await {
        if let Err(err) = result {
            tracing::error!(input = %name, error = %err, "ack forwarder panicked");
        }
    }
    closed_token.cancel();
    tracing::debug!(input = %name, "input shut down");
}
