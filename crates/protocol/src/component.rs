//! Component and driver contracts
//!
//! Every component that moves transactions implements the same channel-passing
//! shape: inputs expose a transaction channel, outputs consume one, pipelines
//! do both. Because the shape is uniform, components compose freely - a broker
//! is an output that feeds other outputs, a batcher is an output that wraps
//! another output.
//!
//! Cancellation follows async Rust convention: any pending future on these
//! traits may be dropped, and implementations must leave the component in a
//! recoverable state when that happens. Cooperative shutdown goes through
//! `close_async` / `wait_for_close`.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::message::Batch;
use crate::response::Response;
use crate::Result;

/// Sending half of a transaction channel
pub type TransactionSender = mpsc::Sender<crate::Transaction>;

/// Receiving half of a transaction channel
pub type TransactionReceiver = mpsc::Receiver<crate::Transaction>;

/// One-shot acknowledgement callable returned by an async read
///
/// Must be invoked exactly once per successful read, once the response for
/// the read batch is known.
pub type AckFn = Box<dyn FnOnce(Response) -> BoxFuture<'static, Result<()>> + Send>;

/// Cooperative shutdown contract shared by all components
///
/// Components are held behind shared references across tasks, so the
/// contract requires `Send + Sync`.
#[async_trait]
pub trait Closable: Send + Sync {
    /// Ask the component to drain and terminate. Idempotent: double-close
    /// must not panic.
    fn close_async(&self);

    /// Block until the component has terminated, up to `timeout`.
    ///
    /// Returns `Error::Timeout` when the shutdown has not completed in time;
    /// callers may escalate by calling again with a further timeout.
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// A source of transactions
#[async_trait]
pub trait Input: Closable {
    /// Take the receive end of this input's transaction channel.
    ///
    /// May be called at most once; a second call returns
    /// `Error::AlreadyStarted`.
    fn transaction_chan(&mut self) -> Result<TransactionReceiver>;

    /// Whether the input is connected to its upstream source
    fn connected(&self) -> bool;
}

/// A destination for transactions
#[async_trait]
pub trait Output: Closable {
    /// Start consuming transactions from the given channel.
    ///
    /// May be called at most once; a second call returns
    /// `Error::AlreadyStarted`.
    fn consume(&mut self, transactions: TransactionReceiver) -> Result<()>;

    /// Whether the output is connected to its downstream target
    fn connected(&self) -> bool;
}

/// A processing stage: consumes transactions, emits transactions
#[async_trait]
pub trait Pipeline: Closable {
    /// Start consuming transactions from the given channel.
    fn consume(&mut self, transactions: TransactionReceiver) -> Result<()>;

    /// Take the receive end of the stage's outgoing transaction channel.
    fn transaction_chan(&mut self) -> Result<TransactionReceiver>;
}

/// The result of running a processor over a batch
///
/// Batches with no response means continuation; a response with no batches
/// means the processor terminated the transaction (filter-style drop).
pub type ProcessorResult = (Vec<Batch>, Option<Response>);

/// A single transformation applied to message batches
///
/// Processors that cannot handle an individual part without failing the whole
/// batch mark that part's fail flag rather than returning an error.
pub trait Processor: Send + Sync {
    /// Process a batch, returning zero or more result batches
    fn process(&self, batch: Batch) -> ProcessorResult;
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Processor")
    }
}

/// A predicate over a message batch
pub trait Condition: Send + Sync {
    /// Whether the batch matches the condition
    fn check(&self, batch: &Batch) -> bool;
}

impl std::fmt::Debug for dyn Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Condition")
    }
}

/// A key/value cache driver
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a cached value
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store a value, overwriting any existing entry
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Store a value only when the key is vacant, failing with
    /// `Error::KeyAlreadyExists` otherwise
    async fn add(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a key
    async fn delete(&self, key: &str) -> Result<()>;
}

impl std::fmt::Debug for dyn Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Cache")
    }
}

/// A rate limit driver
#[async_trait]
pub trait RateLimit: Send + Sync {
    /// Request access to the limited resource.
    ///
    /// A zero duration grants access immediately; a positive duration
    /// requires the caller to wait that long before retrying.
    async fn access(&self) -> Result<Duration>;
}

impl std::fmt::Debug for dyn RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RateLimit")
    }
}

/// Driver side of an async input: produces batches with ack callables
///
/// The wrapper owns the driver from a single background task, so read state
/// may live in `&mut self`.
#[async_trait]
pub trait AsyncReader: Send {
    /// Establish the upstream connection
    async fn connect(&mut self) -> Result<()>;

    /// Read the next batch along with its acknowledgement callable.
    ///
    /// `Error::NotConnected` asks the wrapper to reconnect;
    /// `Error::TypeClosed` asks it to shut down cleanly.
    async fn read(&mut self) -> Result<(Batch, AckFn)>;

    /// Ask the driver to terminate
    fn close_async(&mut self);

    /// Block until the driver has terminated, up to `timeout`
    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

/// Driver side of an async output: writes batches
///
/// Multiple writer workers may call `write` concurrently, so implementations
/// carry interior mutability for connection state.
#[async_trait]
pub trait AsyncWriter: Send + Sync {
    /// Establish the downstream connection
    async fn connect(&self) -> Result<()>;

    /// Write a batch to the downstream target.
    ///
    /// `Error::NotConnected` asks the wrapper to reconnect and retry the same
    /// batch; any other error is propagated as a nack.
    async fn write(&self, batch: Batch) -> Result<()>;

    /// Ask the driver to terminate
    fn close_async(&self);

    /// Block until the driver has terminated, up to `timeout`
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

#[async_trait]
impl<T: AsyncReader + ?Sized> AsyncReader for Box<T> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn read(&mut self) -> Result<(Batch, AckFn)> {
        (**self).read().await
    }

    fn close_async(&mut self) {
        (**self).close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        (**self).wait_for_close(timeout).await
    }
}

/// Convenience: build an ack function from a plain async closure
pub fn ack_fn<F, Fut>(f: F) -> AckFn
where
    F: FnOnce(Response) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |res| Box::pin(f(res)))
}

/// Convenience: an ack function that discards the response
pub fn noop_ack() -> AckFn {
    ack_fn(|_| async { Ok(()) })
}

/// Run a chain of processors over a set of batches.
///
/// Each processor consumes every batch produced by the previous one. When the
/// chain drops everything (filter-style), the first terminating response is
/// returned so the caller can complete the transaction; otherwise the
/// surviving batches are returned with no response.
pub fn execute_all(
    processors: &[std::sync::Arc<dyn Processor>],
    batches: Vec<Batch>,
) -> (Vec<Batch>, Option<Response>) {
    let mut current = batches;
    let mut terminated = None;
    for processor in processors {
        let mut next = Vec::with_capacity(current.len());
        for batch in current {
            let (produced, response) = processor.process(batch);
            if produced.is_empty() {
                if terminated.is_none() {
                    terminated = response;
                }
            } else {
                next.extend(produced);
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    if current.is_empty() {
        (Vec::new(), terminated.or(Some(Response::Ack)))
    } else {
        (current, None)
    }
}

/// Join a set of forked responses into the single upstream response.
///
/// The first nack wins; otherwise a skip from any fork downgrades the result
/// to skip; otherwise ack.
pub fn join_responses(responses: &[Response]) -> Response {
    let mut joined = Response::Ack;
    for res in responses {
        match res {
            Response::Error(e) => return Response::Error(e.clone()),
            Response::Unack => joined = Response::Unack,
            Response::Ack => {}
        }
    }
    joined
}
