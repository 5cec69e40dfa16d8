//! Inproc input tests

use std::sync::Arc;
use std::time::Duration;

use weir_manager::Manager;
use weir_protocol::{Batch, Closable, Error, Input, Response, Transaction};

use crate::Inproc;

#[tokio::test]
async fn test_inproc_round_trip() {
    let manager = Arc::new(Manager::empty());
    let mut input = Inproc::new("foo", Arc::clone(&manager));
    let mut transactions = input.transaction_chan().unwrap();

    // A producer (an inproc output) finds the pipe and sends through it.
    let pipe = manager.get_pipe("foo").unwrap();
    let (tran, response_rx) = Transaction::new(Batch::from_bytes("through the pipe"));
    pipe.send(tran).await.unwrap();

    let received = transactions.recv().await.unwrap();
    assert_eq!(
        received.payload().get(0).unwrap().data().as_ref(),
        b"through the pipe"
    );

    // The response port travels end-to-end.
    received.respond(Response::ack()).unwrap();
    assert_eq!(response_rx.await.unwrap(), Response::Ack);

    input.close_async();
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(manager.get_pipe("foo").unwrap_err(), Error::PipeNotFound);
}

#[tokio::test]
async fn test_inproc_rebind_replaces_pipe() {
    let manager = Arc::new(Manager::empty());
    let first = Inproc::new("shared", Arc::clone(&manager));

    // A replacement input takes over the name.
    let second = Inproc::new("shared", Arc::clone(&manager));

    // Closing the first input must not unbind the replacement.
    first.close_async();
    assert!(manager.get_pipe("shared").is_ok());

    second.close_async();
    assert_eq!(
        manager.get_pipe("shared").unwrap_err(),
        Error::PipeNotFound
    );
}
