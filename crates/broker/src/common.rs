//! Shared broker plumbing

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weir_protocol::{Error, Output, Transaction, DEFAULT_CHANNEL_CAPACITY};

/// Delay between redelivery attempts to a nacking target
pub(crate) const RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Wire every child output to its own transaction channel, returning the
/// send ends in declared order
pub(crate) fn wire_children(
    children: &mut [Box<dyn Output>],
) -> weir_protocol::Result<Vec<mpsc::Sender<Transaction>>> {
    let mut senders = Vec::with_capacity(children.len());
    for child in children.iter_mut() {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        child.consume(rx)?;
        senders.push(tx);
    }
    Ok(senders)
}

/// Close every child and wait for each within the shared deadline
pub(crate) async fn close_children(
    children: &[Box<dyn Output>],
    timeout: Duration,
) -> weir_protocol::Result<()> {
    let deadline = std::time::Instant::now() + timeout;
    for child in children {
        child.close_async();
    }
    for child in children {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        child.wait_for_close(remaining).await?;
    }
    Ok(())
}

/// Await the broker loop's termination, then shut the children down with
/// whatever budget remains
pub(crate) async fn wait_broker_closed(
    consuming: bool,
    closed_token: &CancellationToken,
    children: &[Box<dyn Output>],
    timeout: Duration,
) -> weir_protocol::Result<()> {
    if !consuming {
        return Ok(());
    }
    let deadline = std::time::Instant::now() + timeout;
    if tokio::time::timeout(timeout, closed_token.cancelled())
        .await
        .is_err()
    {
        return Err(Error::Timeout);
    }
    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
    close_children(children, remaining).await
}
