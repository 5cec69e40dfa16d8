//! Reader wrapper tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use weir_protocol::{
    ack_fn, AckFn, AsyncReader as ReaderDriver, Batch, Closable, Error, Input, Response,
};

use crate::{Reader, ReaderConfig};

/// Scripted driver: connection outcomes pop from a queue, reads arrive over
/// a channel, and every ack is reported back to the test.
struct MockReader {
    connects: Arc<Mutex<VecDeque<Result<(), Error>>>>,
    reads: mpsc::Receiver<Result<Batch, Error>>,
    acks_tx: mpsc::UnboundedSender<Response>,
}

struct MockHandles {
    connects: Arc<Mutex<VecDeque<Result<(), Error>>>>,
    reads_tx: mpsc::Sender<Result<Batch, Error>>,
    acks_rx: mpsc::UnboundedReceiver<Response>,
}

fn mock_reader() -> (MockReader, MockHandles) {
    let connects = Arc::new(Mutex::new(VecDeque::new()));
    let (reads_tx, reads_rx) = mpsc::channel(16);
    let (acks_tx, acks_rx) = mpsc::unbounded_channel();
    (
        MockReader {
            connects: Arc::clone(&connects),
            reads: reads_rx,
            acks_tx,
        },
        MockHandles {
            connects,
            reads_tx,
            acks_rx,
        },
    )
}

#[async_trait]
impl ReaderDriver for MockReader {
    async fn connect(&mut self) -> weir_protocol::Result<()> {
        match self.connects.lock().pop_front() {
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn read(&mut self) -> weir_protocol::Result<(Batch, AckFn)> {
        match self.reads.recv().await {
            None => Err(Error::TypeClosed),
            Some(Err(err)) => Err(err),
            Some(Ok(batch)) => {
                let acks_tx = self.acks_tx.clone();
                Ok((
                    batch,
                    ack_fn(move |response| async move {
                        let _ = acks_tx.send(response);
                        Ok(())
                    }),
                ))
            }
        }
    }

    fn close_async(&mut self) {}

    async fn wait_for_close(&mut self, _timeout: Duration) -> weir_protocol::Result<()> {
        Ok(())
    }
}

fn config(skip_ack: bool) -> ReaderConfig {
    ReaderConfig {
        name: "test".to_string(),
        skip_ack,
    }
}

#[tokio::test]
async fn test_reader_cant_connect_still_closes() {
    let (driver, handles) = mock_reader();
    // Refuse every connection attempt the test will live through.
    for _ in 0..64 {
        handles.connects.lock().push_back(Err(Error::NotConnected));
    }

    let reader = Reader::new(config(true), driver);
    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_closed_driver_shuts_down() {
    let (driver, handles) = mock_reader();
    let reader = Reader::new(config(true), driver);

    // The driver reporting closure terminates the input without an explicit
    // close request.
    drop(handles.reads_tx);
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_happy_path() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles
        .reads_tx
        .send(Ok(Batch::from_bytes("hello world")))
        .await
        .unwrap();

    let tran = transactions.recv().await.expect("transaction forwarded");
    assert_eq!(tran.payload().get(0).unwrap().data().as_ref(), b"hello world");
    assert!(reader.connected());

    tran.respond(Response::ack()).unwrap();
    assert_eq!(handles.acks_rx.recv().await.unwrap(), Response::Ack);

    let snapshot = reader.metrics();
    assert_eq!(snapshot.connections, 1);
    assert_eq!(snapshot.batches_received, 1);
    assert_eq!(snapshot.parts_received, 1);
    assert_eq!(snapshot.acks_forwarded, 1);
    assert_eq!(snapshot.nacks_forwarded, 0);

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_sad_path_forwards_nack() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles
        .reads_tx
        .send(Ok(Batch::from_bytes("doc")))
        .await
        .unwrap();

    let tran = transactions.recv().await.unwrap();
    tran.respond(Response::error(Error::runtime("failed again"))).unwrap();

    let ack = handles.acks_rx.recv().await.unwrap();
    assert_eq!(ack.err(), Some(&Error::runtime("failed again")));

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_out_of_order_acks() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles.reads_tx.send(Ok(Batch::from_bytes("first"))).await.unwrap();
    let first = transactions.recv().await.unwrap();

    handles.reads_tx.send(Ok(Batch::from_bytes("second"))).await.unwrap();
    let second = transactions.recv().await.unwrap();

    // Respond in reverse order; each read's ack fires independently.
    second
        .respond(Response::error(Error::runtime("second failed")))
        .unwrap();
    let ack = handles.acks_rx.recv().await.unwrap();
    assert_eq!(ack.err(), Some(&Error::runtime("second failed")));

    first.respond(Response::ack()).unwrap();
    assert_eq!(handles.acks_rx.recv().await.unwrap(), Response::Ack);

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_reconnects_after_lost_connection() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles.reads_tx.send(Err(Error::NotConnected)).await.unwrap();
    handles.reads_tx.send(Ok(Batch::from_bytes("after"))).await.unwrap();

    let tran = timeout(Duration::from_secs(2), transactions.recv())
        .await
        .expect("reader must reconnect and read")
        .unwrap();
    assert_eq!(tran.payload().get(0).unwrap().data().as_ref(), b"after");
    tran.respond(Response::ack()).unwrap();
    handles.acks_rx.recv().await.unwrap();

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_skip_ack_allowed_is_at_most_once() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles.reads_tx.send(Ok(Batch::from_bytes("doc"))).await.unwrap();
    let tran = transactions.recv().await.unwrap();
    tran.respond(Response::unack()).unwrap();

    // The driver observes the skip sentinel untouched.
    assert_eq!(handles.acks_rx.recv().await.unwrap(), Response::Unack);

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_skip_ack_disallowed_is_at_least_once() {
    let (driver, mut handles) = mock_reader();
    let mut reader = Reader::new(config(false), driver);
    let mut transactions = reader.transaction_chan().unwrap();

    handles.reads_tx.send(Ok(Batch::from_bytes("doc"))).await.unwrap();
    let tran = transactions.recv().await.unwrap();
    tran.respond(Response::unack()).unwrap();

    // The skip is converted into a nack so the driver re-delivers.
    let ack = handles.acks_rx.recv().await.unwrap();
    assert!(ack.err().is_some());

    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_reader_transaction_chan_taken_once() {
    let (driver, _handles) = mock_reader();
    let mut reader = Reader::new(config(true), driver);
    assert!(reader.transaction_chan().is_ok());
    assert!(matches!(
        reader.transaction_chan(),
        Err(Error::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_reader_double_close_is_idempotent() {
    let (driver, _handles) = mock_reader();
    let reader = Reader::new(config(true), driver);

    reader.close_async();
    reader.close_async();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
    reader.wait_for_close(Duration::from_secs(1)).await.unwrap();
}
