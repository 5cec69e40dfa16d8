//! Output batcher tests

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use weir_batch::{Policy, PolicyConfig};
use weir_protocol::{
    Batch, Closable, Error, Output, Response, Transaction, TransactionReceiver,
};

use crate::Batcher;

/// Child output that forwards every received transaction to the test
struct CaptureOutput {
    forward_tx: mpsc::Sender<Transaction>,
    consuming: bool,
    closed_token: CancellationToken,
}

fn capture() -> (CaptureOutput, mpsc::Receiver<Transaction>) {
    let (forward_tx, forward_rx) = mpsc::channel(8);
    (
        CaptureOutput {
            forward_tx,
            consuming: false,
            closed_token: CancellationToken::new(),
        },
        forward_rx,
    )
}

#[async_trait]
impl Closable for CaptureOutput {
    fn close_async(&self) {}

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
impl Output for CaptureOutput {
    fn consume(&mut self, mut transactions: TransactionReceiver) -> weir_protocol::Result<()> {
        if self.consuming {
            return Err(Error::AlreadyStarted);
        }
        self.consuming = true;
        let forward_tx = self.forward_tx.clone();
        let closed_token = self.closed_token.clone();
        tokio::spawn(async move {
            while let Some(tran) = transactions.recv().await {
                if forward_tx.send(tran).await.is_err() {
                    break;
                }
            }
            closed_token.cancel();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }
}

fn count_policy(count: usize) -> Policy {
    Policy::new(
        PolicyConfig {
            count,
            ..Default::default()
        },
        None,
        Vec::new(),
    )
    .unwrap()
}

async fn send(
    tx: &mpsc::Sender<Transaction>,
    content: &str,
) -> tokio::sync::oneshot::Receiver<Response> {
    let (tran, port) = Transaction::new(Batch::from_bytes(content.to_string()));
    tx.send(tran).await.unwrap();
    port
}

#[tokio::test]
async fn test_batcher_combines_and_acks_all() {
    let (child, mut captured) = capture();
    let mut batcher = Batcher::new(count_policy(2), child);

    let (tx, rx) = mpsc::channel(4);
    batcher.consume(rx).unwrap();

    let port_a = send(&tx, "a").await;
    let port_b = send(&tx, "b").await;

    let combined = captured.recv().await.expect("flushed batch");
    assert_eq!(combined.payload().len(), 2);
    combined.respond(Response::ack()).unwrap();

    assert_eq!(port_a.await.unwrap(), Response::Ack);
    assert_eq!(port_b.await.unwrap(), Response::Ack);

    batcher.close_async();
    batcher.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_batcher_nack_reaches_every_contributor() {
    let (child, mut captured) = capture();
    let mut batcher = Batcher::new(count_policy(2), child);

    let (tx, rx) = mpsc::channel(4);
    batcher.consume(rx).unwrap();

    let port_a = send(&tx, "a").await;
    let port_b = send(&tx, "b").await;

    let combined = captured.recv().await.unwrap();
    combined
        .respond(Response::error(Error::runtime("write refused")))
        .unwrap();

    for port in [port_a, port_b] {
        let response = port.await.unwrap();
        assert_eq!(response.err(), Some(&Error::runtime("write refused")));
    }

    batcher.close_async();
    batcher.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_batcher_period_flush() {
    let (child, mut captured) = capture();
    let policy = Policy::new(
        PolicyConfig {
            count: 0,
            period_ms: 20,
            ..Default::default()
        },
        None,
        Vec::new(),
    )
    .unwrap();
    let mut batcher = Batcher::new(policy, child);

    let (tx, rx) = mpsc::channel(4);
    batcher.consume(rx).unwrap();

    let port = send(&tx, "timed").await;

    let combined = timeout(Duration::from_millis(500), captured.recv())
        .await
        .expect("period must flush")
        .unwrap();
    assert_eq!(combined.payload().len(), 1);
    combined.respond(Response::ack()).unwrap();
    assert_eq!(port.await.unwrap(), Response::Ack);

    batcher.close_async();
    batcher.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_batcher_final_flush_on_close() {
    let (child, mut captured) = capture();
    let mut batcher = Batcher::new(count_policy(10), child);

    let (tx, rx) = mpsc::channel(4);
    batcher.consume(rx).unwrap();

    let port = send(&tx, "pending").await;
    batcher.close_async();

    // The partial batch is flushed during shutdown.
    let combined = timeout(Duration::from_secs(1), captured.recv())
        .await
        .expect("final flush")
        .unwrap();
    assert_eq!(combined.payload().len(), 1);
    combined.respond(Response::ack()).unwrap();
    assert_eq!(port.await.unwrap(), Response::Ack);

    batcher.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_batcher_upstream_close_final_flush() {
    let (child, mut captured) = capture();
    let mut batcher = Batcher::new(count_policy(10), child);

    let (tx, rx) = mpsc::channel(4);
    batcher.consume(rx).unwrap();

    let port = send(&tx, "tail").await;
    drop(tx);

    let combined = timeout(Duration::from_secs(1), captured.recv())
        .await
        .expect("final flush on upstream close")
        .unwrap();
    combined.respond(Response::ack()).unwrap();
    assert_eq!(port.await.unwrap(), Response::Ack);

    batcher.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_batcher_consume_twice_fails() {
    let (child, _captured) = capture();
    let mut batcher = Batcher::new(count_policy(2), child);

    let (_tx1, rx1) = mpsc::channel(1);
    let (_tx2, rx2) = mpsc::channel(1);
    batcher.consume(rx1).unwrap();
    assert!(matches!(batcher.consume(rx2), Err(Error::AlreadyStarted)));
}
