//! Writer - parallel sends and serialised reconnection around a driver

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use weir_protocol::{
    AsyncWriter as WriterDriver, Closable, Error, Output, Response, TransactionReceiver,
};

use crate::common::{WriterMetrics, WriterMetricsSnapshot};

/// Initial reconnect backoff
const RECONNECT_BASE: Duration = Duration::from_millis(100);

/// Reconnect backoff ceiling
const RECONNECT_CAP: Duration = Duration::from_secs(10);

/// Configuration for the writer wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Component name used in log fields
    pub name: String,

    /// Number of transactions written concurrently
    pub max_in_flight: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            name: "writer".to_string(),
            max_in_flight: 1,
        }
    }
}

/// Wraps an async writer driver into a pipeline output
///
/// `max_in_flight` workers pull transactions from the upstream channel and
/// write them through the shared driver. A `NotConnected` write triggers a
/// reconnect - serialised so only one worker dials while the rest await the
/// connected signal - and the same transaction is retried. Any other write
/// error answers the transaction with a nack; success answers with an ack.
pub struct Writer<W> {
    config: WriterConfig,
    driver: Arc<W>,
    connected: Arc<AtomicBool>,
    metrics: Arc<WriterMetrics>,
    consuming: bool,

    close_token: CancellationToken,
    closed_token: CancellationToken,
}

impl<W> Writer<W>
where
    W: WriterDriver + 'static,
{
    /// Wrap a driver
    pub fn new(config: WriterConfig, driver: W) -> Self {
        Self {
            config,
            driver: Arc::new(driver),
            connected: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(WriterMetrics::new()),
            consuming: false,
            close_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }

    /// Get a point-in-time snapshot of the writer's counters
    pub fn metrics(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}

struct Shared<W> {
    name: String,
    driver: Arc<W>,
    connected: Arc<AtomicBool>,
    metrics: Arc<WriterMetrics>,
    reconnect_lock: Mutex<()>,
    close_token: CancellationToken,
}

impl<W> Shared<W>
where
    W: WriterDriver,
{
    /// Re-establish the connection, one worker at a time. Workers that lose
    /// the race park on the lock and find the flag already set.
    async fn reconnect(&self) -> Result<(), Error> {
        let _guard = tokio::select! {
            _ = self.close_token.cancelled() => return Err(Error::TypeClosed),
            guard = self.reconnect_lock.lock() => guard,
        };
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut backoff = RECONNECT_BASE;
        loop {
            let result = tokio::select! {
                _ = self.close_token.cancelled() => return Err(Error::TypeClosed),
                result = self.driver.connect() => result,
            };
            match result {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    self.metrics.record_connection();
                    tracing::debug!(output = %self.name, "connected");
                    return Ok(());
                }
                Err(Error::TypeClosed) => return Err(Error::TypeClosed),
                Err(err) => {
                    self.metrics.record_connection_error();
                    tracing::warn!(output = %self.name, error = %err, "failed to connect, retrying");
                    tokio::select! {
                        _ = self.close_token.cancelled() => return Err(Error::TypeClosed),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(RECONNECT_CAP);
                }
            }
        }
    }
}

async fn run_worker<W>(
    shared: Arc<Shared<W>>,
    transactions: Arc<Mutex<TransactionReceiver>>,
) where
    W: WriterDriver,
{
    loop {
        let tran = {
            let mut rx = tokio::select! {
                _ = shared.close_token.cancelled() => return,
                rx = transactions.lock() => rx,
            };
            tokio::select! {
                _ = shared.close_token.cancelled() => return,
                tran = rx.recv() => tran,
            }
        };
        let Some(tran) = tran else {
            return;
        };

        let (batch, response_tx) = tran.into_inner();
        loop {
            if !shared.connected.load(Ordering::Acquire) {
                if shared.reconnect().await.is_err() {
                    let _ = response_tx.send(Response::Error(Error::TypeClosed));
                    return;
                }
            }
            let result = tokio::select! {
                _ = shared.close_token.cancelled() => {
                    let _ = response_tx.send(Response::Error(Error::TypeClosed));
                    return;
                }
                result = shared.driver.write(batch.shallow_copy()) => result,
            };
            match result {
                Ok(()) => {
                    shared
                        .metrics
                        .record_write(batch.len() as u64, batch.total_bytes() as u64);
                    let _ = response_tx.send(Response::Ack);
                    break;
                }
                Err(Error::NotConnected) => {
                    // Retry the same transaction once the connection is back.
                    shared.connected.store(false, Ordering::Release);
                    shared.metrics.record_write_retry();
                    tracing::warn!(output = %shared.name, "connection lost, reconnecting");
                }
                Err(err) => {
                    shared.metrics.record_write_error();
                    tracing::error!(output = %shared.name, error = %err, "failed to write message");
                    let _ = response_tx.send(Response::Error(err));
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<W> Closable for Writer<W>
where
    W: WriterDriver + 'static,
{
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
impl<W> Output for Writer<W>
where
    W: WriterDriver + 'static,
{
    fn consume(&mut self, transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        self.consuming = true;

        let shared = Arc::new(Shared {
            name: self.config.name.clone(),
            driver: Arc::clone(&self.driver),
            connected: Arc::clone(&self.connected),
            metrics: Arc::clone(&self.metrics),
            reconnect_lock: Mutex::new(()),
            close_token: self.close_token.clone(),
        });
        let transactions = Arc::new(Mutex::new(transactions));
        let workers = self.config.max_in_flight.max(1);
        let closed_token = self.closed_token.clone();

        tokio::spawn(async move {
            let mut set = JoinSet::new();
            for _ in 0..workers {
                set.spawn(run_worker(Arc::clone(&shared), Arc::clone(&transactions)));
            }
            while set.join_next().await.is_some() {}

            shared.driver.close_async();
            if let Err(err) = shared.driver.wait_for_close(Duration::from_secs(1)).await {
                tracing::warn!(output = %shared.name, error = %err, "driver refused to close in time");
            }
            shared.connected.store(false, Ordering::Release);
            closed_token.cancel();
            tracing::debug!(output = %shared.name, "output shut down");
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
