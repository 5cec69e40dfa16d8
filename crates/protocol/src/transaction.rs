//! Transaction - a batch coupled with its response port
//!
//! Transactions are the unit of flow between components. The response port is
//! a one-shot channel: whoever ultimately consumes the batch delivers exactly
//! one `Response` back to the transaction's creator.

use tokio::sync::oneshot;

use crate::error::Error;
use crate::message::Batch;
use crate::response::Response;
use crate::Result;

/// Receiving end of a transaction's response port
pub type ResponsePort = oneshot::Receiver<Response>;

/// A message batch paired with a one-shot response port
#[derive(Debug)]
pub struct Transaction {
    payload: Batch,
    response_tx: oneshot::Sender<Response>,
}

impl Transaction {
    /// Create a transaction, returning the receive end of its response port
    pub fn new(payload: Batch) -> (Self, ResponsePort) {
        let (response_tx, response_rx) = oneshot::channel();
        (
            Self {
                payload,
                response_tx,
            },
            response_rx,
        )
    }

    /// Rebuild a transaction around an existing response port sender
    ///
    /// Used by components that forward a downstream batch while retaining the
    /// upstream port, e.g. a pipeline emitting processed results.
    pub fn with_port(payload: Batch, response_tx: oneshot::Sender<Response>) -> Self {
        Self {
            payload,
            response_tx,
        }
    }

    /// The batch traveling in this transaction
    #[inline]
    pub fn payload(&self) -> &Batch {
        &self.payload
    }

    /// Mutable access to the traveling batch
    #[inline]
    pub fn payload_mut(&mut self) -> &mut Batch {
        &mut self.payload
    }

    /// Split into the batch and the raw response sender
    pub fn into_inner(self) -> (Batch, oneshot::Sender<Response>) {
        (self.payload, self.response_tx)
    }

    /// Deliver the response, consuming the transaction
    ///
    /// Fails with `TypeClosed` when the transaction's creator has gone away
    /// without waiting for the response.
    pub fn respond(self, response: Response) -> Result<()> {
        self.response_tx
            .send(response)
            .map_err(|_| Error::TypeClosed)
    }
}
