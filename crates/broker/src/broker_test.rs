//! Broker tests
//!
//! Delivery guarantees under acks, nacks, and shutdown for all four broker
//! flavours.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use weir_protocol::{
    Batch, Closable, Error, Output, Response, Transaction, TransactionReceiver,
};

use crate::{FanOut, FanOutSequential, Greedy, RoundRobin};

/// Child output handing every received transaction to the test
struct MockOutput {
    forward_tx: mpsc::Sender<Transaction>,
    consuming: bool,
    closed_token: CancellationToken,
}

fn mock_output(queue: usize) -> (Box<dyn Output>, mpsc::Receiver<Transaction>) {
    let (forward_tx, forward_rx) = mpsc::channel(queue);
    (
        Box::new(MockOutput {
            forward_tx,
            consuming: false,
            closed_token: CancellationToken::new(),
        }),
        forward_rx,
    )
}

#[async_trait]
impl Closable for MockOutput {
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
impl Output for MockOutput {
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

fn content(tran: &Transaction) -> String {
    String::from_utf8_lossy(tran.payload().get(0).unwrap().data()).into_owned()
}

async fn send(
    tx: &mpsc::Sender<Transaction>,
    content: &str,
) -> tokio::sync::oneshot::Receiver<Response> {
    let (tran, port) = Transaction::new(Batch::from_bytes(content.to_string()));
    tx.send(tran).await.unwrap();
    port
}

// ============================================================================
// FanOut
// ============================================================================

#[tokio::test]
async fn test_fan_out_delivers_copies_to_all() {
    let (child_a, mut rx_a) = mock_output(4);
    let (child_b, mut rx_b) = mock_output(4);
    let mut broker = FanOut::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();
    assert!(broker.connected());

    let port = send(&tx, "hello world").await;

    let tran_a = rx_a.recv().await.unwrap();
    let tran_b = rx_b.recv().await.unwrap();
    assert_eq!(content(&tran_a), "hello world");
    assert_eq!(content(&tran_b), "hello world");

    // Copies mutate independently of siblings.
    let mut tran_a = tran_a;
    tran_a.payload_mut().get_mut(0).unwrap().set_data("mutated");
    assert_eq!(content(&tran_b), "hello world");

    tran_a.respond(Response::ack()).unwrap();
    tran_b.respond(Response::ack()).unwrap();
    assert_eq!(port.await.unwrap(), Response::Ack);

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_fan_out_retries_only_nacking_target() {
    let (child_a, mut rx_a) = mock_output(4);
    let (child_b, mut rx_b) = mock_output(4);
    let mut broker = FanOut::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    let port = send(&tx, "once and again").await;

    // A acks, B nacks.
    rx_a.recv().await.unwrap().respond(Response::ack()).unwrap();
    rx_b.recv()
        .await
        .unwrap()
        .respond(Response::error(Error::runtime("b refused")))
        .unwrap();

    // Only B sees the redelivery; it acks this time.
    let retried = timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("b must be redelivered")
        .unwrap();
    assert_eq!(content(&retried), "once and again");
    retried.respond(Response::ack()).unwrap();

    // A received the batch exactly once.
    assert!(timeout(Duration::from_millis(100), rx_a.recv()).await.is_err());

    // Upstream sees a single ack.
    assert_eq!(port.await.unwrap(), Response::Ack);

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_fan_out_backpressure_blocks_producer() {
    let (child_a, rx_a) = mock_output(1);
    let mut broker = FanOut::new(vec![child_a]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    // Nobody responds downstream; a producer must stall almost immediately.
    let sent = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sent);
    let producer = tokio::spawn(async move {
        for i in 0..1000 {
            let (tran, _port) = Transaction::new(Batch::from_bytes(format!("{i}")));
            if tx.send(tran).await.is_err() {
                return;
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        sent.load(Ordering::SeqCst) < 10,
        "bounded queueing must stall the producer, sent {}",
        sent.load(Ordering::SeqCst)
    );

    producer.abort();
    drop(rx_a);
    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_fan_out_double_close() {
    let (child, _rx) = mock_output(1);
    let mut broker = FanOut::new(vec![child]);
    let (_tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    broker.close_async();
    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_fan_out_consume_twice_fails() {
    let (child, _rx) = mock_output(1);
    let mut broker = FanOut::new(vec![child]);
    let (_tx1, rx1) = mpsc::channel(1);
    let (_tx2, rx2) = mpsc::channel(1);
    broker.consume(rx1).unwrap();
    assert!(matches!(broker.consume(rx2), Err(Error::AlreadyStarted)));
}

// ============================================================================
// FanOutSequential
// ============================================================================

#[tokio::test]
async fn test_sequential_delivers_in_declared_order() {
    let (child_a, mut rx_a) = mock_output(4);
    let (child_b, mut rx_b) = mock_output(4);
    let mut broker = FanOutSequential::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    let port = send(&tx, "ordered").await;

    // B must not receive anything until A has acknowledged.
    let tran_a = rx_a.recv().await.unwrap();
    assert!(timeout(Duration::from_millis(100), rx_b.recv()).await.is_err());

    tran_a.respond(Response::ack()).unwrap();
    let tran_b = rx_b.recv().await.unwrap();
    tran_b.respond(Response::ack()).unwrap();

    assert_eq!(port.await.unwrap(), Response::Ack);

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_sequential_retries_target_until_ack() {
    let (child_a, mut rx_a) = mock_output(4);
    let (child_b, mut rx_b) = mock_output(4);
    let mut broker = FanOutSequential::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    let port = send(&tx, "persistent").await;

    rx_a.recv()
        .await
        .unwrap()
        .respond(Response::error(Error::runtime("not yet")))
        .unwrap();

    // A is retried before B sees anything.
    let retried = rx_a.recv().await.unwrap();
    assert!(timeout(Duration::from_millis(50), rx_b.recv()).await.is_err());
    retried.respond(Response::ack()).unwrap();

    rx_b.recv().await.unwrap().respond(Response::ack()).unwrap();
    assert_eq!(port.await.unwrap(), Response::Ack);

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

// ============================================================================
// RoundRobin
// ============================================================================

#[tokio::test]
async fn test_round_robin_strict_rotation() {
    let (child_a, mut rx_a) = mock_output(8);
    let (child_b, mut rx_b) = mock_output(8);
    let mut broker = RoundRobin::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    let mut ports = Vec::new();
    for i in 0..4 {
        ports.push(send(&tx, &format!("{i}")).await);
    }

    // K mod N = 0: each target receives exactly K/N, in rotation.
    for expected in ["0", "2"] {
        let tran = rx_a.recv().await.unwrap();
        assert_eq!(content(&tran), expected);
        tran.respond(Response::ack()).unwrap();
    }
    for expected in ["1", "3"] {
        let tran = rx_b.recv().await.unwrap();
        assert_eq!(content(&tran), expected);
        tran.respond(Response::ack()).unwrap();
    }

    // The chosen target owns the ack: every port resolves.
    for port in ports {
        assert_eq!(port.await.unwrap(), Response::Ack);
    }

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_round_robin_double_close() {
    let (child, _rx) = mock_output(1);
    let mut broker = RoundRobin::new(vec![child]);
    let (_tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    broker.close_async();
    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

// ============================================================================
// Greedy
// ============================================================================

#[tokio::test]
async fn test_greedy_delivers_to_ready_targets() {
    let (child_a, mut rx_a) = mock_output(8);
    let (child_b, mut rx_b) = mock_output(8);
    let mut broker = Greedy::new(vec![child_a, child_b]);

    let (tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    let mut ports = Vec::new();
    for i in 0..6 {
        ports.push(send(&tx, &format!("{i}")).await);
    }

    // Every transaction lands on some target and is acknowledged by it.
    let acker = |mut rx: mpsc::Receiver<Transaction>| async move {
        let mut seen = 0usize;
        while let Ok(Some(tran)) = timeout(Duration::from_millis(250), rx.recv()).await {
            tran.respond(Response::ack()).unwrap();
            seen += 1;
        }
        seen
    };
    let (seen_a, seen_b) = tokio::join!(
        tokio::spawn(acker(rx_a)),
        tokio::spawn(acker(rx_b)),
    );
    assert_eq!(seen_a.unwrap() + seen_b.unwrap(), 6);

    for port in ports {
        assert_eq!(port.await.unwrap(), Response::Ack);
    }

    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_greedy_double_close() {
    let (child, _rx) = mock_output(1);
    let mut broker = Greedy::new(vec![child]);
    let (_tx, rx) = mpsc::channel(1);
    broker.consume(rx).unwrap();

    broker.close_async();
    broker.close_async();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}
