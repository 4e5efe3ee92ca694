//! End-to-end exercises of the endpoint contract within one process:
//! two endpoints on the same segment, real listener threads, real wakes.

use std::sync::mpsc;
use std::time::Duration;

use memhatch::{AccessMode, Endpoint, HatchConfig, HatchError};

fn test_name(tag: &str) -> String {
    format!("{}_{}", tag, std::process::id())
}

fn config(name: &str, capacity: usize) -> HatchConfig {
    HatchConfig {
        capacity,
        auto_clear: true,
        ..HatchConfig::new(name)
    }
}

#[test]
fn hello_reaches_the_attacher_exactly_once() {
    let name = test_name("it_hello");
    let owner = Endpoint::create(config(&name, 1024)).unwrap();
    let attacher = Endpoint::attach(config(&name, 1024)).unwrap();

    let (tx, rx) = mpsc::channel();
    attacher
        .on_message(move |payload, info| {
            tx.send((payload.to_vec(), info.name.clone(), info.is_owner))
                .unwrap();
        })
        .unwrap();

    owner.write(b"Hello from Client!").unwrap();

    let (payload, receiver_name, receiver_is_owner) =
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(payload, b"Hello from Client!");
    assert_eq!(String::from_utf8(payload).unwrap(), "Hello from Client!");
    assert_eq!(receiver_name, name);
    assert!(!receiver_is_owner);

    // One write, one wake, one delivery.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn messages_flow_in_both_directions() {
    // One hatch per direction, the duplex pattern for a single-slot
    // transport: on each hatch only the receiving side registers a callback,
    // so the wake always lands on the listener that wants it.
    let up = test_name("it_bidi_up");
    let down = test_name("it_bidi_down");

    let up_owner = Endpoint::create(config(&up, 256)).unwrap();
    let up_attacher = Endpoint::attach(config(&up, 256)).unwrap();
    let down_owner = Endpoint::create(config(&down, 256)).unwrap();
    let down_attacher = Endpoint::attach(config(&down, 256)).unwrap();

    let (to_owner_tx, to_owner_rx) = mpsc::channel();
    up_owner
        .on_message(move |payload, info| {
            to_owner_tx.send((payload.to_vec(), info.is_owner)).unwrap()
        })
        .unwrap();

    let (to_attacher_tx, to_attacher_rx) = mpsc::channel();
    down_attacher
        .on_message(move |payload, info| {
            to_attacher_tx.send((payload.to_vec(), info.is_owner)).unwrap()
        })
        .unwrap();

    up_attacher.write(b"upstream").unwrap();
    let (payload, receiver_is_owner) = to_owner_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(payload, b"upstream");
    assert!(receiver_is_owner);

    down_owner.write(b"downstream").unwrap();
    let (payload, receiver_is_owner) =
        to_attacher_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(payload, b"downstream");
    assert!(!receiver_is_owner);
}

#[test]
fn capacity_boundary_is_exact() {
    let name = test_name("it_boundary");
    let owner = Endpoint::create(config(&name, 8)).unwrap();
    let attacher = Endpoint::attach(config(&name, 8)).unwrap();

    let (tx, rx) = mpsc::channel();
    attacher
        .on_message(move |payload, _| tx.send(payload.to_vec()).unwrap())
        .unwrap();

    owner.write(b"12345678").unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        b"12345678"
    );

    let err = owner.write(b"123456789").unwrap_err();
    assert!(matches!(
        err,
        HatchError::PayloadTooLarge {
            capacity: 8,
            got: 9
        }
    ));

    // The rejected write left the transport fully usable.
    owner.write(b"after").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"after");
}

#[test]
fn owner_and_attacher_report_the_same_geometry() {
    let name = test_name("it_geometry");
    let owner = Endpoint::create(config(&name, 512)).unwrap();

    // The attacher asks for a different capacity; the descriptor wins.
    let attacher = Endpoint::attach(config(&name, 16)).unwrap();

    assert_eq!(owner.capacity(), 512);
    assert_eq!(attacher.capacity(), 512);
    assert_eq!(owner.total_mapped_size(), attacher.total_mapped_size());
    assert!(owner.is_owner());
    assert!(!attacher.is_owner());
    assert_eq!(owner.name(), name);
    assert_eq!(attacher.name(), name);
}

#[test]
fn dispose_is_idempotent_across_the_pair() {
    let name = test_name("it_dispose");
    let mut owner = Endpoint::create(config(&name, 64)).unwrap();
    let mut attacher = Endpoint::attach(config(&name, 64)).unwrap();

    attacher.dispose();
    attacher.dispose();
    owner.dispose();

    // Drop after explicit dispose must be a no-op.
    drop(attacher);
    drop(owner);
}

#[test]
fn attaching_to_a_missing_name_fails_fast() {
    let err = Endpoint::attach(config(&test_name("it_missing"), 64)).err().unwrap();
    assert!(matches!(err, HatchError::SegmentNotFound { .. }));
}

#[test]
fn duplicate_create_is_rejected() {
    let name = test_name("it_duplicate");
    let _owner = Endpoint::create(config(&name, 64)).unwrap();

    let err = Endpoint::create(config(&name, 64)).err().unwrap();
    assert!(matches!(err, HatchError::SegmentAlreadyExists { .. }));
}

#[test]
fn read_only_attacher_receives_but_cannot_send() {
    let name = test_name("it_readonly");
    let owner = Endpoint::create(config(&name, 64)).unwrap();
    let attacher = Endpoint::attach(HatchConfig {
        capacity: 64,
        access: AccessMode::ReadOnly,
        ..HatchConfig::new(name)
    })
    .unwrap();

    let (tx, rx) = mpsc::channel();
    attacher
        .on_message(move |payload, _| tx.send(payload.to_vec()).unwrap())
        .unwrap();

    owner.write(b"one way").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"one way");

    assert!(matches!(
        attacher.write(b"no"),
        Err(HatchError::ReadOnly { .. })
    ));
}
