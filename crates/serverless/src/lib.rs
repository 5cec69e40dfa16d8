//! Weir Serverless - request/response execution
//!
//! A [`Handler`] hosts a pipeline → output chain and exposes it as a
//! request/response function: each request is wrapped as a one-part batch
//! with a roundtrip result store attached, dispatched as a transaction, and
//! answered once the response arrives. Outputs that write into the result
//! store (see `weir_output::roundtrip::Writer`) provide the response
//! payload.
//!
//! Result shaping: a single one-part batch collapses to its JSON value, a
//! single many-part batch becomes an array, and multiple batches become an
//! array of arrays. When no output stored anything, a plain success object
//! is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error as ThisError;
use tokio::sync::mpsc;

use weir_pipeline::Pipeline;
use weir_protocol::roundtrip::{add_result_store, ResultStore};
use weir_protocol::{
    Batch, Closable, Error as ProtocolError, Output, Part, Pipeline as PipelineTrait, Processor,
    Transaction,
};

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;

/// Errors surfaced to the invoker
#[derive(Debug, ThisError)]
pub enum HandlerError {
    /// The handler is shutting down and cannot accept requests.
    #[error("request cancelled")]
    Cancelled,

    /// The pipeline answered the request with a nack.
    #[error("request failed: {0}")]
    Nack(ProtocolError),

    /// The request or a result part was not valid JSON.
    #[error("failed to marshal json response: {0}")]
    Json(String),

    /// Building the pipeline/output chain failed.
    #[error("failed to create stream chain: {0}")]
    Build(ProtocolError),
}

/// A live pipeline wrapped in an invoke handler
pub struct Handler {
    transaction_tx: mpsc::Sender<Transaction>,
    pipeline: Pipeline,
    output: Box<dyn Output>,
}

impl Handler {
    /// Build the pipeline and output layers and wire them together
    pub fn new(
        processors: Vec<Arc<dyn Processor>>,
        mut output: Box<dyn Output>,
    ) -> Result<Self, HandlerError> {
        let mut pipeline = Pipeline::new(processors);
        let (transaction_tx, transaction_rx) = mpsc::channel(1);

        pipeline.consume(transaction_rx).map_err(HandlerError::Build)?;
        let pipeline_out = pipeline.transaction_chan().map_err(HandlerError::Build)?;
        output.consume(pipeline_out).map_err(HandlerError::Build)?;

        Ok(Self {
            transaction_tx,
            pipeline,
            output,
        })
    }

    /// Inject a request payload into the pipeline and collect its results
    pub async fn handle(&self, request: Value) -> Result<Value, HandlerError> {
        let part = Part::try_from(request).map_err(|e| HandlerError::Json(e.to_string()))?;
        let mut batch = Batch::from_parts(vec![part]);

        let store = ResultStore::new();
        add_result_store(&mut batch, &store);

        let (tran, port) = Transaction::new(batch);
        self.transaction_tx
            .send(tran)
            .await
            .map_err(|_| HandlerError::Cancelled)?;

        let response = port.await.map_err(|_| HandlerError::Cancelled)?;
        if let Some(err) = response.err() {
            return Err(HandlerError::Nack(err.clone()));
        }

        let mut result_batches = store.get();
        if result_batches.is_empty() {
            return Ok(json!({"message": "request successful"}));
        }

        let mut shaped: Vec<Vec<Value>> = Vec::with_capacity(result_batches.len());
        for batch in result_batches.iter_mut() {
            let mut values = Vec::with_capacity(batch.len());
            for part in batch.iter_mut() {
                let value = part
                    .json()
                    .map_err(|e| HandlerError::Json(e.to_string()))?;
                values.push(value.clone());
            }
            shaped.push(values);
        }

        if shaped.len() == 1 {
            let mut only = shaped.pop().expect("one batch");
            if only.len() == 1 {
                return Ok(only.pop().expect("one value"));
            }
            return Ok(Value::Array(only));
        }
        Ok(Value::Array(
            shaped.into_iter().map(Value::Array).collect(),
        ))
    }

    /// Shut down the pipeline and output layers in order
    ///
    /// Layers that refuse to close within the timeout surface as an error.
    pub async fn close(&self, timeout: Duration) -> Result<(), ProtocolError> {
        let deadline = Instant::now() + timeout;

        self.pipeline.close_async();
        self.output.close_async();

        self.output.wait_for_close(timeout).await?;
        self.pipeline
            .wait_for_close(deadline.saturating_duration_since(Instant::now()))
            .await?;
        Ok(())
    }
}
