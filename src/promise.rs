//! Single-assignment promises with queue-scheduled continuations.
//!
//! A [`Promise`] settles exactly once, with an [`Outcome`]: a value or a
//! failure token. Continuations attached with [`then`] / [`fail`] never run
//! synchronously, not even when the promise is already settled; each one is
//! posted as a separate task to the queue the promise was bound to at
//! construction. That invariant is what lets channel back-pressure ride on
//! plain promise chains without re-entrancy surprises.
//!
//! ```text
//!   Resolver                       Promise
//!     │                              │
//!     │── fulfill(v) ──► settle ─────┤ stored continuations are posted,
//!     │                              │ in registration order, one task each
//!     │── reject(e)  ──► settle ─────┤
//!     │                              │
//!   (drop) ──► settle(BrokenPromise) │
//! ```
//!
//! Ownership is split: the [`Resolver`] is the producer side and is one-shot;
//! the `Promise` is move-only and single-consumer. [`SharedPromise`] is the
//! clonable view for fan-out, where every clone observes the same outcome.
//!
//! [`then`]: Promise::then
//! [`fail`]: Promise::fail
//!
//! # Example
//!
//! ```ignore
//! use handoff::{promise, Failure};
//!
//! let (resolver, p) = promise::<i32>(&queue);
//! let chained = p
//!     .then(|v| v * 2)
//!     .fail(|_: &std::io::Error| 0);
//! resolver.fulfill(21);
//! // `chained` fulfills with 42 once the queue runs the continuations.
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::error::{BrokenPromise, Failure};
use crate::outcome::Outcome;
use crate::queue::{QueueHandle, Task};

/// A continuation waiting for the outcome.
///
/// `Owned` moves the outcome out (single-consumer path). `Cloning` builds
/// its task from a borrowed outcome, cloning what it needs (shared path);
/// the builder runs under the state lock, the built task runs on the queue.
enum Continuation<T> {
    Owned(Box<dyn FnOnce(Outcome<T>) + Send>),
    Cloning(Box<dyn FnOnce(&Outcome<T>) -> Task + Send>),
}

struct PromiseState<T> {
    /// True once the resolver has settled. Monotone.
    settled: bool,
    /// The outcome, present from settlement until the single consumer
    /// takes it. Stays present forever on the shared path.
    outcome: Option<Outcome<T>>,
    /// Continuations registered before settlement.
    continuations: Vec<Continuation<T>>,
    /// Waker from the awaitable view.
    waker: Option<Waker>,
}

struct PromiseShared<T> {
    queue: QueueHandle,
    state: Mutex<PromiseState<T>>,
}

impl<T> PromiseShared<T> {
    fn new(queue: QueueHandle) -> Arc<Self> {
        Arc::new(Self {
            queue,
            state: Mutex::new(PromiseState {
                settled: false,
                outcome: None,
                continuations: Vec::new(),
                waker: None,
            }),
        })
    }
}

fn settle_shared<T: Send + 'static>(shared: &PromiseShared<T>, outcome: Outcome<T>) {
    let (tasks, waker) = {
        let mut state = shared.state.lock().expect("promise lock poisoned");
        debug_assert!(!state.settled, "promise settled twice");
        state.settled = true;

        let continuations = std::mem::take(&mut state.continuations);
        let mut outcome = Some(outcome);
        let mut tasks: Vec<Task> = Vec::with_capacity(continuations.len());
        for continuation in continuations {
            match continuation {
                Continuation::Owned(f) => {
                    let outcome = outcome.take().expect("single consumer already took outcome");
                    tasks.push(Box::new(move || f(outcome)));
                }
                Continuation::Cloning(build) => {
                    let borrowed = outcome.as_ref().expect("outcome available for shared view");
                    tasks.push(build(borrowed));
                }
            }
        }
        state.outcome = outcome;
        (tasks, state.waker.take())
    };

    for task in tasks {
        shared.queue.post(task);
    }
    if let Some(waker) = waker {
        waker.wake();
    }
}

fn register<T: Send + 'static>(shared: &PromiseShared<T>, continuation: Continuation<T>) {
    let task = {
        let mut state = shared.state.lock().expect("promise lock poisoned");
        if state.settled {
            match continuation {
                Continuation::Owned(f) => {
                    let outcome = state
                        .outcome
                        .take()
                        .expect("promise outcome already consumed");
                    Some(Box::new(move || f(outcome)) as Task)
                }
                Continuation::Cloning(build) => {
                    let borrowed = state
                        .outcome
                        .as_ref()
                        .expect("promise outcome already consumed");
                    Some(build(borrowed))
                }
            }
        } else {
            state.continuations.push(continuation);
            None
        }
    };
    if let Some(task) = task {
        shared.queue.post(task);
    }
}

/// Creates a promise bound to `queue`, returning the producer and consumer
/// halves.
#[must_use]
pub fn promise<T: Send + 'static>(queue: &QueueHandle) -> (Resolver<T>, Promise<T>) {
    let shared = PromiseShared::new(Arc::clone(queue));
    (
        Resolver {
            shared: Some(Arc::clone(&shared)),
        },
        Promise { shared },
    )
}

/// The producer side of a promise. One-shot.
///
/// Dropping a resolver without settling rejects the promise with
/// [`BrokenPromise`], so a lost producer never strands a consumer.
pub struct Resolver<T: Send + 'static> {
    shared: Option<Arc<PromiseShared<T>>>,
}

impl<T: Send + 'static> Resolver<T> {
    /// Fulfills the promise with a value.
    pub fn fulfill(self, value: T) {
        self.settle(Outcome::Value(value));
    }

    /// Rejects the promise with a failure token.
    ///
    /// An empty token is a programmer error and is converted into an
    /// [`EmptyFailure`](crate::error::EmptyFailure) rejection.
    pub fn reject(self, failure: Failure) {
        self.settle(Outcome::Failed(failure.or_invalid()));
    }

    /// Settles the promise with a ready outcome.
    pub fn settle(mut self, outcome: Outcome<T>) {
        if let Some(shared) = self.shared.take() {
            settle_shared(&shared, outcome);
        }
    }
}

impl<T: Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            settle_shared(&shared, Outcome::Failed(Failure::new(BrokenPromise)));
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("armed", &self.shared.is_some())
            .finish()
    }
}

/// A move-only, single-consumer promise.
///
/// Consuming combinators ([`then`], [`fail`], ...) take `self`; a promise
/// is observed exactly once. For fan-out, convert with [`share`].
///
/// The promise is also a [`Future`] yielding `Result<T, Failure>`;
/// completion through the future view still observes the same settlement.
///
/// [`then`]: Promise::then
/// [`fail`]: Promise::fail
/// [`share`]: Promise::share
pub struct Promise<T> {
    shared: Arc<PromiseShared<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// A promise already fulfilled with `value`.
    #[must_use]
    pub fn fulfilled(queue: &QueueHandle, value: T) -> Self {
        let (resolver, p) = promise(queue);
        resolver.fulfill(value);
        p
    }

    /// A promise already rejected with `failure`.
    #[must_use]
    pub fn rejected(queue: &QueueHandle, failure: Failure) -> Self {
        let (resolver, p) = promise(queue);
        resolver.reject(failure);
        p
    }

    /// Schedules `f` on `queue` and settles the promise with its result.
    pub fn run<F>(queue: &QueueHandle, f: F) -> Self
    where
        F: FnOnce() -> Result<T, Failure> + Send + 'static,
    {
        let (resolver, p) = promise(queue);
        queue.post(Box::new(move || resolver.settle(f().into())));
        p
    }

    /// Registers the final continuation, consuming the promise.
    ///
    /// `f` is posted to the owning queue with the outcome; it never runs
    /// inside this call, even if the promise is already settled. This is
    /// the primitive every combinator is built on.
    pub fn on_outcome<F>(self, f: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        register(&self.shared, Continuation::Owned(Box::new(f)));
    }

    /// Settles `resolver` with this promise's outcome once it arrives.
    pub fn pipe(self, resolver: Resolver<T>) {
        self.on_outcome(move |outcome| resolver.settle(outcome));
    }

    /// Maps the value through `f`, producing a new promise.
    ///
    /// Rejections bypass `f` and carry the same failure token.
    pub fn then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => resolver.fulfill(f(value)),
            Outcome::Failed(failure) => resolver.reject(failure),
        });
        next
    }

    /// Chains a promise-returning `f`, flattening the result.
    pub fn then_promise<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => f(value).pipe(resolver),
            Outcome::Failed(failure) => resolver.reject(failure),
        });
        next
    }

    /// Handles rejections whose token downcasts to `E`.
    ///
    /// Fulfilled outcomes and non-matching rejections pass through
    /// untouched; a matching rejection is replaced by `h`'s value.
    pub fn fail<E, H>(self, h: H) -> Self
    where
        E: StdError + Send + Sync + 'static,
        H: FnOnce(&E) -> T + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => resolver.fulfill(value),
            Outcome::Failed(failure) => match failure.downcast_ref::<E>() {
                Some(error) => resolver.fulfill(h(error)),
                None => resolver.reject(failure),
            },
        });
        next
    }

    /// Like [`fail`](Promise::fail), with a promise-returning handler.
    pub fn fail_promise<E, H>(self, h: H) -> Self
    where
        E: StdError + Send + Sync + 'static,
        H: FnOnce(&E) -> Promise<T> + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => resolver.fulfill(value),
            Outcome::Failed(failure) => match failure.downcast_ref::<E>() {
                Some(error) => h(error).pipe(resolver),
                None => resolver.reject(failure),
            },
        });
        next
    }

    /// Handles any rejection, regardless of the carried type.
    pub fn fail_any<H>(self, h: H) -> Self
    where
        H: FnOnce(Failure) -> T + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => resolver.fulfill(value),
            Outcome::Failed(failure) => resolver.fulfill(h(failure)),
        });
        next
    }

    /// Like [`fail_any`](Promise::fail_any), with a promise-returning
    /// handler.
    pub fn fail_any_promise<H>(self, h: H) -> Self
    where
        H: FnOnce(Failure) -> Promise<T> + Send + 'static,
    {
        let queue = Arc::clone(&self.shared.queue);
        let (resolver, next) = promise(&queue);
        self.on_outcome(move |outcome| match outcome {
            Outcome::Value(value) => resolver.fulfill(value),
            Outcome::Failed(failure) => h(failure).pipe(resolver),
        });
        next
    }

    /// Converts into a clonable [`SharedPromise`].
    #[must_use]
    pub fn share(self) -> SharedPromise<T> {
        SharedPromise {
            shared: self.shared,
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().expect("promise lock poisoned");
        f.debug_struct("Promise")
            .field("settled", &state.settled)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Future for Promise<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock().expect("promise lock poisoned");
        if state.settled {
            let outcome = state
                .outcome
                .take()
                .expect("promise polled after completion");
            Poll::Ready(outcome.into_result())
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// A clonable handle to a settled-once promise.
///
/// All clones observe the same outcome; each registered continuation gets
/// its own clone of the value. Created with [`Promise::share`].
pub struct SharedPromise<T> {
    shared: Arc<PromiseShared<T>>,
}

impl<T> Clone for SharedPromise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> SharedPromise<T> {
    /// Registers a continuation without consuming the handle.
    ///
    /// Continuations across all clones run in registration order, each as
    /// its own queue task, with its own clone of the outcome.
    pub fn on_outcome<F>(&self, f: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        register(
            &self.shared,
            Continuation::Cloning(Box::new(move |outcome| {
                let outcome = outcome.clone();
                Box::new(move || f(outcome))
            })),
        );
    }

    /// Mints a fresh single-consumer promise observing the same outcome.
    #[must_use]
    pub fn promise(&self) -> Promise<T> {
        let (resolver, p) = promise(&self.shared.queue);
        self.on_outcome(move |outcome| resolver.settle(outcome));
        p
    }

    /// See [`Promise::then`].
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.promise().then(f)
    }

    /// See [`Promise::then_promise`].
    pub fn then_promise<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.promise().then_promise(f)
    }

    /// See [`Promise::fail`].
    pub fn fail<E, H>(&self, h: H) -> Promise<T>
    where
        E: StdError + Send + Sync + 'static,
        H: FnOnce(&E) -> T + Send + 'static,
    {
        self.promise().fail(h)
    }

    /// See [`Promise::fail_any`].
    pub fn fail_any<H>(&self, h: H) -> Promise<T>
    where
        H: FnOnce(Failure) -> T + Send + 'static,
    {
        self.promise().fail_any(h)
    }
}

impl<T> fmt::Debug for SharedPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().expect("promise lock poisoned");
        f.debug_struct("SharedPromise")
            .field("settled", &state.settled)
            .finish_non_exhaustive()
    }
}
