//! End-to-end channel scenarios on a worker-thread queue.
//!
//! Each test stands up a real [`ThreadQueue`], runs a full
//! produce/consume/close lifecycle, and observes completions through the
//! promise chain, the way application code would.

use futures_lite::future::block_on;
use handoff::{
    Channel, ChannelClosed, Failure, Promise, PromiseChannel, QueueConfig, QueueHandle,
    ThreadQueue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("test failure")]
struct TestError;

fn queue() -> QueueHandle {
    handoff::test_utils::init_test_logging();
    ThreadQueue::spawn(QueueConfig {
        name: "scenario".to_string(),
        workers: 1,
    })
}

#[test]
fn unit_channel_drains_then_closes() {
    let queue = queue();
    handoff::test_phase!("unit_channel_drains_then_closes");

    let ch = Channel::<()>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    for _ in 0..4 {
        let accepted = writable.send(());
        handoff::assert_with_log!(accepted, "unit send accepted", true, accepted);
    }
    writable.close();

    for _ in 0..4 {
        block_on(readable.receive()).expect("buffered unit");
    }
    let failure = block_on(readable.receive()).expect_err("fifth receive");
    handoff::assert_with_log!(
        failure.is::<ChannelClosed>(),
        "closed after four units",
        true,
        failure.is::<ChannelClosed>()
    );
    handoff::test_complete!("unit_channel_drains_then_closes");
}

#[test]
fn two_values_arrive_in_order_through_a_promise_chain() {
    let queue = queue();
    handoff::test_phase!("two_values_arrive_in_order_through_a_promise_chain");

    let ch = Channel::<i32>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    writable.send(17);
    writable.send(4711);
    writable.close();

    let next = readable.clone();
    let after = readable.clone();
    let chain = readable
        .receive()
        .then_promise(move |value| {
            assert_eq!(value, 17);
            next.receive()
        })
        .then_promise(move |value| {
            assert_eq!(value, 4711);
            after.receive()
        })
        .then(|_value: i32| -> i32 { unreachable!("no third element") })
        .fail(|_: &ChannelClosed| -1);

    let recovered = block_on(chain).expect("chain recovers from the close");
    handoff::assert_with_log!(recovered == -1, "close reached the chain", -1, recovered);
    handoff::test_complete!("two_values_arrive_in_order_through_a_promise_chain");
}

#[test]
fn tuple_elements_travel_together() {
    let queue = queue();
    handoff::test_phase!("tuple_elements_travel_together");

    let ch = Channel::<(i32, String)>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    writable.send((17, "hello".to_string()));
    writable.send((4711, "world".to_string()));
    writable.close();

    let first = block_on(readable.receive()).expect("first tuple");
    handoff::assert_with_log!(
        first == (17, "hello".to_string()),
        "first tuple",
        (17, "hello"),
        first
    );
    let second = block_on(readable.receive()).expect("second tuple");
    handoff::assert_with_log!(
        second == (4711, "world".to_string()),
        "second tuple",
        (4711, "world"),
        second
    );
    let failure = block_on(readable.receive()).expect_err("then closed");
    handoff::assert_with_log!(
        failure.is::<ChannelClosed>(),
        "closed after tuples",
        true,
        failure.is::<ChannelClosed>()
    );
    handoff::test_complete!("tuple_elements_travel_together");
}

#[test]
fn endpoint_drops_close_the_channel() {
    let queue = queue();
    handoff::test_phase!("endpoint_drops_close_the_channel");

    // Dropping the only writable: the pending receive observes the close.
    let ch = Channel::<i32>::new(&queue, 5);
    let readable = ch.readable();
    drop(ch.writable());
    let failure = block_on(readable.receive()).expect_err("no producer remains");
    handoff::assert_with_log!(
        failure.is::<ChannelClosed>(),
        "receive after writable drop",
        true,
        failure.is::<ChannelClosed>()
    );

    // Dropping the only readable: the surviving writable refuses sends.
    let ch = Channel::<i32>::new(&queue, 5);
    let writable = ch.writable();
    drop(ch.readable());
    let accepted = writable.send(17);
    handoff::assert_with_log!(!accepted, "send refused", false, accepted);
    let refused = writable.ensure_send(17);
    handoff::assert_with_log!(
        refused == Err(ChannelClosed),
        "ensure_send refused",
        Err::<(), _>(ChannelClosed),
        refused
    );
    handoff::test_complete!("endpoint_drops_close_the_channel");
}

#[test]
fn promise_elements_flatten_with_a_rejection_in_the_middle() {
    let queue = queue();
    handoff::test_phase!("promise_elements_flatten_with_a_rejection_in_the_middle");

    let ch = PromiseChannel::<i32>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    writable.send(Promise::fulfilled(&queue, 5));
    writable.send(Promise::run(&queue, || Err(Failure::new(TestError))));
    writable.send(Promise::fulfilled(&queue, 17));
    writable.close();

    let first = block_on(readable.receive()).expect("first inner value");
    handoff::assert_with_log!(first == 5, "first", 5, first);

    let failure = block_on(readable.receive()).expect_err("middle rejection");
    handoff::assert_with_log!(
        failure.is::<TestError>(),
        "inner rejection token",
        true,
        failure.is::<TestError>()
    );

    let third = block_on(readable.receive()).expect("value after the rejection");
    handoff::assert_with_log!(third == 17, "third", 17, third);

    let terminal = block_on(readable.receive()).expect_err("then closed");
    handoff::assert_with_log!(
        terminal.is::<ChannelClosed>(),
        "closed after drain",
        true,
        terminal.is::<ChannelClosed>()
    );
    handoff::test_complete!("promise_elements_flatten_with_a_rejection_in_the_middle");
}

#[test]
fn fast_path_callback_failure_closes_the_channel() {
    let queue = queue();
    handoff::test_phase!("fast_path_callback_failure_closes_the_channel");

    let ch = Channel::<i32>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    writable.send(17);
    writable.send(4711);
    writable.close();

    let counter = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&counter);
    let done = readable.receive_with(
        move |value| {
            assert_eq!(value, 17);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        || unreachable!("values remain buffered"),
    );
    block_on(done).expect("first fast receive");

    let seen = Arc::clone(&counter);
    let done = readable.receive_with(
        move |value| {
            assert_eq!(value, 4711);
            seen.fetch_add(1, Ordering::SeqCst);
            Err(Failure::new(TestError))
        },
        || unreachable!("a value remains buffered"),
    );
    let failure = block_on(done).expect_err("callback failure");
    handoff::assert_with_log!(
        failure.is::<TestError>(),
        "returned promise carries the failure",
        true,
        failure.is::<TestError>()
    );

    let calls = counter.load(Ordering::SeqCst);
    handoff::assert_with_log!(calls == 2, "both values observed", 2, calls);
    let closed = readable.is_closed();
    handoff::assert_with_log!(closed, "channel closed by the failure", true, closed);
    handoff::test_complete!("fast_path_callback_failure_closes_the_channel");
}

#[test]
fn fast_path_observes_a_close_with_error_after_the_tail() {
    let queue = queue();
    handoff::test_phase!("fast_path_observes_a_close_with_error_after_the_tail");

    let ch = Channel::<i32>::new(&queue, 5);
    let writable = ch.writable();
    let readable = ch.readable();

    writable.send(17);
    writable.send(4711);
    writable.close_with(Failure::new(TestError));

    for expected in [17, 4711] {
        let done = readable.receive_with(
            move |value| {
                assert_eq!(value, expected);
                Ok(())
            },
            || unreachable!("buffered values drain first"),
        );
        block_on(done).expect("buffered value");
    }

    // The terminal is a failure, not a normal close: neither callback runs.
    let done = readable.receive_with(
        |_value| unreachable!("buffer is drained"),
        || unreachable!("terminal is a failure"),
    );
    let failure = block_on(done).expect_err("terminal failure");
    handoff::assert_with_log!(
        failure.is::<TestError>(),
        "terminal token",
        true,
        failure.is::<TestError>()
    );
    handoff::test_complete!("fast_path_observes_a_close_with_error_after_the_tail");
}
