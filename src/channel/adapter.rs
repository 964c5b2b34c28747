//! Delivery adapters: how a sent element becomes a received outcome.
//!
//! The channel core is written once; what varies is the hop from a buffered
//! element to the value a receiver observes. [`Direct`] hands the element
//! over as-is. [`Flatten`] unwraps promise elements, so a channel of
//! promises yields inner values and `receive` has the same shape no matter
//! how values entered the channel.
//!
//! A [`Delivery`] is the one-shot completion handle an adapter must
//! eventually resolve; it feeds either the receive promise or a fast-path
//! callback pair.

use crate::error::Failure;
use crate::outcome::Outcome;
use crate::promise::{Promise, Resolver, SharedPromise};
use crate::queue::QueueHandle;

/// Strategy for converting a sent element into a received value.
///
/// `deliver` is called outside the channel lock with the element and the
/// pending delivery; it must resolve the delivery exactly once, possibly
/// later (the flatten adapters resolve when the inner promise settles).
pub trait Deliver<T: Send + 'static>: 'static {
    /// What `receive` yields.
    type Output: Send + 'static;

    /// Routes one element into one pending delivery.
    fn deliver(element: T, delivery: Delivery<Self::Output>);
}

/// Identity adapter: receivers observe exactly what was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl<T: Send + 'static> Deliver<T> for Direct {
    type Output = T;

    fn deliver(element: T, delivery: Delivery<T>) {
        delivery.fulfill(element);
    }
}

/// Flattening adapter for channels of promises.
///
/// The receive promise settles with the inner outcome: an inner rejection
/// rejects the receive, an inner value fulfills it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl<U: Send + 'static> Deliver<Promise<U>> for Flatten {
    type Output = U;

    fn deliver(element: Promise<U>, delivery: Delivery<U>) {
        element.on_outcome(move |outcome| delivery.settle(outcome));
    }
}

impl<U: Clone + Send + 'static> Deliver<SharedPromise<U>> for Flatten {
    type Output = U;

    fn deliver(element: SharedPromise<U>, delivery: Delivery<U>) {
        element.on_outcome(move |outcome| delivery.settle(outcome));
    }
}

/// A pending receive, waiting for an element or the terminal.
pub(crate) enum Waiter<Out: Send + 'static> {
    /// A plain `receive`: resolves the element promise.
    Promise(Resolver<Out>),
    /// A fast-path `receive_with`: resolves into user callbacks.
    Fast(FastWaiter<Out>),
}

impl<Out: Send + 'static> Waiter<Out> {
    /// Completes this waiter with a delivered outcome.
    pub(crate) fn settle(self, outcome: Outcome<Out>) {
        match self {
            Self::Promise(resolver) => resolver.settle(outcome),
            Self::Fast(fast) => fast.settle(outcome),
        }
    }

    /// Completes this waiter with the channel terminal.
    pub(crate) fn terminated(self, terminal: Option<Failure>) {
        match self {
            Self::Promise(resolver) => {
                resolver.reject(terminal.unwrap_or_else(Failure::closed));
            }
            Self::Fast(fast) => fast.terminated(terminal),
        }
    }
}

/// Callback pair of a fast-path receive, plus its completion promise.
pub(crate) struct FastWaiter<Out: Send + 'static> {
    pub(crate) on_value: Box<dyn FnOnce(Out) -> Result<(), Failure> + Send>,
    pub(crate) on_closed: Box<dyn FnOnce() + Send>,
    pub(crate) done: Resolver<()>,
    /// Closes the channel when `on_value` fails.
    pub(crate) close_hook: Box<dyn FnOnce(Failure) + Send>,
    pub(crate) queue: QueueHandle,
}

impl<Out: Send + 'static> FastWaiter<Out> {
    fn settle(self, outcome: Outcome<Out>) {
        let Self {
            on_value,
            done,
            close_hook,
            queue,
            ..
        } = self;
        match outcome {
            Outcome::Value(value) => {
                // The callback runs as a queue task, never under a lock.
                queue.post(Box::new(move || match on_value(value) {
                    Ok(()) => done.fulfill(()),
                    Err(failure) => {
                        close_hook(failure.clone());
                        done.reject(failure);
                    }
                }));
            }
            // Inner failure of a flattened element: surfaces on the
            // returned promise, the callbacks are not consulted.
            Outcome::Failed(failure) => done.reject(failure),
        }
    }

    fn terminated(self, terminal: Option<Failure>) {
        let Self {
            on_closed,
            done,
            queue,
            ..
        } = self;
        match terminal {
            Some(failure) => done.reject(failure),
            None => {
                queue.post(Box::new(move || {
                    on_closed();
                    done.fulfill(());
                }));
            }
        }
    }
}

/// One-shot completion handle handed to a [`Deliver`] implementation.
pub struct Delivery<Out: Send + 'static> {
    waiter: Waiter<Out>,
}

impl<Out: Send + 'static> Delivery<Out> {
    pub(crate) fn new(waiter: Waiter<Out>) -> Self {
        Self { waiter }
    }

    /// Delivers a value.
    pub fn fulfill(self, value: Out) {
        self.waiter.settle(Outcome::Value(value));
    }

    /// Delivers a failure.
    pub fn reject(self, failure: Failure) {
        self.waiter.settle(Outcome::Failed(failure.or_invalid()));
    }

    /// Delivers a ready outcome.
    pub fn settle(self, outcome: Outcome<Out>) {
        self.waiter.settle(outcome);
    }
}
