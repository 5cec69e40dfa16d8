//! Batcher - adapt a single-message driver to a batch policy

use std::time::Duration;

use async_trait::async_trait;

use weir_batch::{Policy, PolicyConfig};
use weir_protocol::{ack_fn, AckFn, AsyncReader as ReaderDriver, Batch, Error, Response};

/// Wraps a non-batching reader driver with a batch policy
///
/// Reads are fed to the policy until it fires, at which point the
/// accumulated batch is returned with a composite acknowledgement that
/// forwards the eventual response to every contributing ack in order. A
/// period trigger flushes whatever has accumulated; empty flushes are
/// swallowed. Read errors propagate immediately without discarding partial
/// accumulation.
pub struct Batcher<R> {
    child: R,
    policy: Policy,
    pending_acks: Vec<AckFn>,
}

impl<R> Batcher<R>
where
    R: ReaderDriver,
{
    /// Wrap a driver with a policy
    pub fn new(child: R, policy: Policy) -> Self {
        Self {
            child,
            policy,
            pending_acks: Vec::new(),
        }
    }

    fn composite_ack(&mut self) -> AckFn {
        let acks = std::mem::take(&mut self.pending_acks);
        ack_fn(move |response: Response| async move {
            for ack in acks {
                ack(response.clone()).await?;
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> Option<(Batch, AckFn)> {
        let batch = self.policy.flush()?;
        Some((batch, self.composite_ack()))
    }
}

#[async_trait]
impl<R> ReaderDriver for Batcher<R>
where
    R: ReaderDriver,
{
    async fn connect(&mut self) -> weir_protocol::Result<()> {
        self.child.connect().await
    }

    async fn read(&mut self) -> weir_protocol::Result<(Batch, AckFn)> {
        loop {
            let read = match self.policy.until_next() {
                Some(remaining) => {
                    match tokio::time::timeout(remaining, self.child.read()).await {
                        Ok(read) => read,
                        Err(_) => {
                            // Period fired; emit what we have, or keep
                            // waiting when nothing has accumulated.
                            match self.flush() {
                                Some(flushed) => return Ok(flushed),
                                None => continue,
                            }
                        }
                    }
                }
                None => self.child.read().await,
            };

            match read {
                Ok((batch, ack)) => {
                    self.pending_acks.push(ack);
                    let mut due = false;
                    for part in batch {
                        if self.policy.add(part) {
                            due = true;
                        }
                    }
                    if due {
                        if let Some(flushed) = self.flush() {
                            return Ok(flushed);
                        }
                    }
                }
                Err(Error::TypeClosed) => {
                    // Drain the partial batch before reporting closure.
                    if self.policy.count() > 0 {
                        if let Some(flushed) = self.flush() {
                            return Ok(flushed);
                        }
                    }
                    return Err(Error::TypeClosed);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn close_async(&mut self) {
        self.child.close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> weir_protocol::Result<()> {
        self.child.wait_for_close(timeout).await
    }
}

/// Wrap a driver with a batch policy, bypassing the batcher entirely when
/// the policy is a no-op
pub fn batched<R>(
    child: R,
    config: PolicyConfig,
    check: Option<std::sync::Arc<dyn weir_protocol::Condition>>,
    processors: Vec<std::sync::Arc<dyn weir_protocol::Processor>>,
) -> Result<Box<dyn ReaderDriver>, weir_batch::PolicyError>
where
    R: ReaderDriver + 'static,
{
    if config.is_noop() && check.is_none() {
        return Ok(Box::new(child));
    }
    let policy = Policy::new(config, check, processors)?;
    Ok(Box::new(Batcher::new(child, policy)))
}
