//! Transaction and response tests

use std::sync::Arc;

use crate::component::join_responses;
use crate::error::Error;
use crate::message::Batch;
use crate::response::Response;
use crate::roundtrip::{add_result_store, result_store, ResultStore};
use crate::transaction::Transaction;

#[tokio::test]
async fn test_transaction_delivers_one_response() {
    let (tran, response_rx) = Transaction::new(Batch::from_bytes("payload"));
    assert_eq!(tran.payload().len(), 1);

    tran.respond(Response::ack()).unwrap();
    assert_eq!(response_rx.await.unwrap(), Response::Ack);
}

#[tokio::test]
async fn test_respond_after_creator_gone() {
    let (tran, response_rx) = Transaction::new(Batch::new());
    drop(response_rx);

    assert_eq!(tran.respond(Response::ack()), Err(Error::TypeClosed));
}

#[test]
fn test_response_accessors() {
    assert!(Response::ack().is_ack());
    assert!(Response::unack().skip_ack());

    let nack = Response::error(Error::NotConnected);
    assert_eq!(nack.err(), Some(&Error::NotConnected));
    assert!(!nack.is_ack());
    assert!(!nack.skip_ack());
}

#[test]
fn test_join_responses_first_error_wins() {
    let joined = join_responses(&[
        Response::ack(),
        Response::error(Error::runtime("boom")),
        Response::error(Error::NotConnected),
    ]);
    assert_eq!(joined.err(), Some(&Error::runtime("boom")));
}

#[test]
fn test_join_responses_skip_downgrades_ack() {
    let joined = join_responses(&[Response::ack(), Response::unack(), Response::ack()]);
    assert!(joined.skip_ack());

    assert!(join_responses(&[Response::ack(), Response::ack()]).is_ack());
    assert!(join_responses(&[]).is_ack());
}

// ============================================================================
// Roundtrip result store
// ============================================================================

#[test]
fn test_result_store_travels_with_parts() {
    let store = ResultStore::new();
    let mut batch = Batch::from_bytes("request");
    add_result_store(&mut batch, &store);

    let part = batch.get(0).unwrap();
    let attached = result_store(part).expect("store must be attached");
    attached.add(Batch::from_bytes("result"));

    assert_eq!(store.get().len(), 1);
    assert_eq!(store.get()[0].get(0).unwrap().data().as_ref(), b"result");

    store.clear();
    assert!(store.get().is_empty());
}

#[test]
fn test_result_store_survives_deep_copy() {
    let store = ResultStore::new();
    let mut batch = Batch::from_bytes("request");
    add_result_store(&mut batch, &store);

    let copy = batch.deep_copy();
    let attached = result_store(copy.get(0).unwrap()).expect("store attached to copy");
    attached.add(Batch::new());

    assert_eq!(store.get().len(), 1);
    assert!(Arc::ptr_eq(&attached, &store));
}
