//! Bounded multi-producer/multi-consumer hand-off channel.
//!
//! The channel is a single mutex-guarded state machine:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        CHANNEL CORE                              │
//! │                                                                  │
//! │  Writable ──► send ──┬── pending waiter? ──► deliver directly    │
//! │                      ├── room in buffer? ──► push, report true   │
//! │                      └── buffer full?    ──► push, report false  │
//! │                                                                  │
//! │  Readable ──► receive ──┬── buffered head ──► fulfill promise    │
//! │                         ├── closed        ──► reject (terminal)  │
//! │                         └── otherwise     ──► enqueue waiter     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `capacity` is an advisory back-pressure threshold, not a hard admission
//! bound: a send against a full buffer still buffers the element and
//! reports `false`, and the producer decides whether to await a
//! back-pressure probe ([`Writable::ready`]) before sending more.
//!
//! Lifecycle: endpoints refcount the core. Dropping the last readable
//! closes the channel and discards the buffer (no reader remains); dropping
//! the last writable closes it with the buffered tail still deliverable. A
//! terminal failure recorded by [`Writable::close_with`] is observed only
//! after the buffer has drained.
//!
//! Every state decision happens under the core lock; every user-visible
//! completion (promise continuation, fast-path callback) is posted to the
//! owning queue after the lock is released.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::channel::adapter::{Deliver, Delivery, Direct, FastWaiter, Waiter};
use crate::error::{ChannelClosed, Failure};
use crate::promise::{promise, Promise, Resolver};
use crate::queue::QueueHandle;

/// What happened to a sent element.
enum SendStatus {
    /// Delivered to a waiter or buffered within capacity.
    Accepted,
    /// Buffered, but the buffer is now at or past capacity.
    Saturated,
    /// The channel is closed; the element was dropped.
    Refused,
}

struct ChannelInner<T: Send + 'static, D: Deliver<T>> {
    /// Buffered elements, FIFO.
    buffer: VecDeque<T>,
    /// Advisory back-pressure threshold.
    capacity: usize,
    /// Pending receives, FIFO. Never non-empty while `buffer` is.
    waiters: VecDeque<Waiter<D::Output>>,
    /// Pending back-pressure probes, FIFO.
    back_pressure: VecDeque<Resolver<()>>,
    /// Monotone: once true, stays true.
    closed: bool,
    /// Failure recorded at close, observed after the buffer drains.
    terminal: Option<Failure>,
    /// Live readable endpoints.
    readable_count: usize,
    /// Live writable endpoints.
    writable_count: usize,
}

struct ChannelShared<T: Send + 'static, D: Deliver<T>> {
    queue: QueueHandle,
    inner: Mutex<ChannelInner<T, D>>,
}

impl<T: Send + 'static, D: Deliver<T>> ChannelShared<T, D> {
    fn push(&self, element: T) -> SendStatus {
        let waiter = {
            let mut inner = self.inner.lock().expect("channel lock poisoned");
            if inner.closed {
                return SendStatus::Refused;
            }
            if let Some(waiter) = inner.waiters.pop_front() {
                waiter
            } else {
                inner.buffer.push_back(element);
                return if inner.buffer.len() <= inner.capacity {
                    SendStatus::Accepted
                } else {
                    SendStatus::Saturated
                };
            }
        };
        D::deliver(element, Delivery::new(waiter));
        SendStatus::Accepted
    }

    fn receive(self: &Arc<Self>) -> Promise<D::Output> {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if let Some(element) = inner.buffer.pop_front() {
            let probe = self.pop_probe(&mut inner);
            drop(inner);
            if let Some(probe) = probe {
                probe.fulfill(());
            }
            let (resolver, p) = promise(&self.queue);
            D::deliver(element, Delivery::new(Waiter::Promise(resolver)));
            p
        } else if inner.closed {
            let terminal = inner.terminal.clone();
            drop(inner);
            Promise::rejected(&self.queue, terminal.unwrap_or_else(Failure::closed))
        } else {
            let (resolver, p) = promise(&self.queue);
            inner.waiters.push_back(Waiter::Promise(resolver));
            p
        }
    }

    fn receive_with<V, C>(self: &Arc<Self>, on_value: V, on_closed: C) -> Promise<()>
    where
        V: FnOnce(D::Output) -> Result<(), Failure> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let (done, done_promise) = promise::<()>(&self.queue);
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if let Some(element) = inner.buffer.pop_front() {
            let probe = self.pop_probe(&mut inner);
            drop(inner);
            if let Some(probe) = probe {
                probe.fulfill(());
            }
            D::deliver(
                element,
                Delivery::new(Waiter::Fast(self.fast_waiter(on_value, on_closed, done))),
            );
        } else if inner.closed {
            let terminal = inner.terminal.clone();
            drop(inner);
            match terminal {
                Some(failure) => done.reject(failure),
                None => {
                    self.queue.post(Box::new(move || {
                        on_closed();
                        done.fulfill(());
                    }));
                }
            }
        } else {
            inner
                .waiters
                .push_back(Waiter::Fast(self.fast_waiter(on_value, on_closed, done)));
        }
        done_promise
    }

    fn fast_waiter<V, C>(
        self: &Arc<Self>,
        on_value: V,
        on_closed: C,
        done: Resolver<()>,
    ) -> FastWaiter<D::Output>
    where
        V: FnOnce(D::Output) -> Result<(), Failure> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        FastWaiter {
            on_value: Box::new(on_value),
            on_closed: Box::new(on_closed),
            done,
            close_hook: Box::new(move |failure| {
                if let Some(shared) = weak.upgrade() {
                    shared.close(Some(failure));
                }
            }),
            queue: Arc::clone(&self.queue),
        }
    }

    /// Pops one back-pressure probe if the buffer just went below capacity.
    fn pop_probe(&self, inner: &mut ChannelInner<T, D>) -> Option<Resolver<()>> {
        if inner.buffer.len() < inner.capacity {
            inner.back_pressure.pop_front()
        } else {
            None
        }
    }

    fn ready(self: &Arc<Self>) -> Promise<()> {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if inner.closed || inner.buffer.len() < inner.capacity {
            drop(inner);
            Promise::fulfilled(&self.queue, ())
        } else {
            let (resolver, p) = promise(&self.queue);
            inner.back_pressure.push_back(resolver);
            p
        }
    }

    fn close(&self, terminal: Option<Failure>) {
        let (waiters, probes, terminal) = {
            let mut inner = self.inner.lock().expect("channel lock poisoned");
            if inner.closed {
                // First close wins; the terminal is never overwritten.
                return;
            }
            inner.closed = true;
            inner.terminal = terminal;
            (
                std::mem::take(&mut inner.waiters),
                std::mem::take(&mut inner.back_pressure),
                inner.terminal.clone(),
            )
        };
        tracing::trace!(with_error = terminal.is_some(), "channel closed");
        for waiter in waiters {
            waiter.terminated(terminal.clone());
        }
        for probe in probes {
            probe.fulfill(());
        }
    }

    fn add_readable(&self) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        inner.readable_count += 1;
    }

    fn remove_readable(&self) {
        let drained = {
            let mut inner = self.inner.lock().expect("channel lock poisoned");
            inner.readable_count -= 1;
            if inner.readable_count > 0 {
                return;
            }
            // No reader remains: nothing buffered can ever be observed.
            let discarded = inner.buffer.len();
            inner.buffer.clear();
            if inner.closed {
                None
            } else {
                inner.closed = true;
                Some((
                    discarded,
                    std::mem::take(&mut inner.waiters),
                    std::mem::take(&mut inner.back_pressure),
                ))
            }
        };
        if let Some((discarded, waiters, probes)) = drained {
            tracing::trace!(discarded, "last readable dropped, channel closed");
            for waiter in waiters {
                waiter.terminated(None);
            }
            for probe in probes {
                probe.fulfill(());
            }
        }
    }

    fn add_writable(&self) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        inner.writable_count += 1;
    }

    fn remove_writable(&self) {
        let should_close = {
            let mut inner = self.inner.lock().expect("channel lock poisoned");
            inner.writable_count -= 1;
            inner.writable_count == 0 && !inner.closed
        };
        if should_close {
            tracing::trace!("last writable dropped, channel closing");
            self.close(None);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().expect("channel lock poisoned").closed
    }
}

/// A bounded promise-returning channel.
///
/// `Channel` is the factory for the two endpoint kinds; it holds no
/// endpoint reference itself, so channel lifetime is governed entirely by
/// the endpoints minted from it.
///
/// The second type parameter selects the delivery adapter; see the
/// [`adapter`](crate::channel::adapter) module and the
/// [`PromiseChannel`](crate::channel::PromiseChannel) /
/// [`SharedPromiseChannel`](crate::channel::SharedPromiseChannel) aliases.
pub struct Channel<T: Send + 'static, D: Deliver<T> = Direct> {
    shared: Arc<ChannelShared<T, D>>,
}

impl<T: Send + 'static, D: Deliver<T>> Channel<T, D> {
    /// Creates a channel bound to `queue` with the given back-pressure
    /// threshold.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(queue: &QueueHandle, capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be non-zero");
        Self {
            shared: Arc::new(ChannelShared {
                queue: Arc::clone(queue),
                inner: Mutex::new(ChannelInner {
                    buffer: VecDeque::new(),
                    capacity,
                    waiters: VecDeque::new(),
                    back_pressure: VecDeque::new(),
                    closed: false,
                    terminal: None,
                    readable_count: 0,
                    writable_count: 0,
                }),
            }),
        }
    }

    /// Mints a writable endpoint.
    #[must_use]
    pub fn writable(&self) -> Writable<T, D> {
        self.shared.add_writable();
        Writable {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Mints a readable endpoint.
    #[must_use]
    pub fn readable(&self) -> Readable<T, D> {
        self.shared.add_readable();
        Readable {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The queue all continuations and callbacks are posted to.
    #[must_use]
    pub fn queue(&self) -> &QueueHandle {
        &self.shared.queue
    }
}

impl<T: Send + 'static, D: Deliver<T>> fmt::Debug for Channel<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock().expect("channel lock poisoned");
        f.debug_struct("Channel")
            .field("buffered", &inner.buffer.len())
            .field("capacity", &inner.capacity)
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

/// The producer endpoint.
///
/// Cheaply clonable; the channel closes when the last writable is dropped
/// (buffered elements remain deliverable).
pub struct Writable<T: Send + 'static, D: Deliver<T> = Direct> {
    shared: Arc<ChannelShared<T, D>>,
}

impl<T: Send + 'static, D: Deliver<T>> Writable<T, D> {
    /// Hands one element to the channel.
    ///
    /// Returns `false` if the channel is closed (the element is dropped)
    /// or if the element was buffered past the capacity threshold — in the
    /// latter case the element is still delivered later, and the producer
    /// should await [`ready`](Writable::ready) before sending more.
    pub fn send(&self, element: T) -> bool {
        matches!(self.shared.push(element), SendStatus::Accepted)
    }

    /// Like [`send`](Writable::send), but a closed channel is an error.
    ///
    /// A send past the capacity threshold is still `Ok`: the element was
    /// accepted, only the back-pressure hint is lost.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if the channel refuses the element.
    pub fn ensure_send(&self, element: T) -> Result<(), ChannelClosed> {
        match self.shared.push(element) {
            SendStatus::Accepted | SendStatus::Saturated => Ok(()),
            SendStatus::Refused => Err(ChannelClosed),
        }
    }

    /// A back-pressure probe: fulfills once the buffer is below capacity
    /// (or the channel closes, so a stalled producer always wakes).
    ///
    /// Probes resolve in FIFO order, one per buffer slot freed.
    #[must_use]
    pub fn ready(&self) -> Promise<()> {
        self.shared.ready()
    }

    /// Returns true if a send would be accepted within capacity right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let inner = self.shared.inner.lock().expect("channel lock poisoned");
        !inner.closed && inner.buffer.len() < inner.capacity
    }

    /// The advisory capacity threshold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared
            .inner
            .lock()
            .expect("channel lock poisoned")
            .capacity
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) {
        self.shared.close(None);
    }

    /// Closes the channel with a terminal failure.
    ///
    /// Consumers observe `failure` once the buffered tail has drained. An
    /// empty token is converted into an
    /// [`EmptyFailure`](crate::error::EmptyFailure) terminal.
    pub fn close_with(&self, failure: Failure) {
        self.shared.close(Some(failure.or_invalid()));
    }

    /// Returns true once the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<T: Send + 'static, D: Deliver<T>> Clone for Writable<T, D> {
    fn clone(&self) -> Self {
        self.shared.add_writable();
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static, D: Deliver<T>> Drop for Writable<T, D> {
    fn drop(&mut self) {
        self.shared.remove_writable();
    }
}

impl<T: Send + 'static, D: Deliver<T>> fmt::Debug for Writable<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writable")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The consumer endpoint.
///
/// Cheaply clonable; dropping the last readable closes the channel and
/// discards anything still buffered, since no reader remains to observe it.
pub struct Readable<T: Send + 'static, D: Deliver<T> = Direct> {
    shared: Arc<ChannelShared<T, D>>,
}

impl<T: Send + 'static, D: Deliver<T>> Readable<T, D> {
    /// The next element, as a promise.
    ///
    /// Fulfills with the buffered head, rejects with the terminal once the
    /// channel is closed and drained, or parks a waiter to be completed by
    /// a later send. Waiters complete in registration order.
    #[must_use]
    pub fn receive(&self) -> Promise<D::Output> {
        self.shared.receive()
    }

    /// Fast-path receive: resolves into the given callbacks without an
    /// intermediate element promise.
    ///
    /// `on_value` runs with the next element; returning `Err` rejects the
    /// returned promise *and* closes the channel with that failure.
    /// `on_closed` runs instead when the channel closed normally. A
    /// terminal failure rejects the returned promise without invoking
    /// either callback. Callbacks run as tasks on the owning queue.
    pub fn receive_with<V, C>(&self, on_value: V, on_closed: C) -> Promise<()>
    where
        V: FnOnce(D::Output) -> Result<(), Failure> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.shared.receive_with(on_value, on_closed)
    }

    /// Returns true once the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of buffered elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .inner
            .lock()
            .expect("channel lock poisoned")
            .buffer
            .len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static, D: Deliver<T>> Clone for Readable<T, D> {
    fn clone(&self) -> Self {
        self.shared.add_readable();
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static, D: Deliver<T>> Drop for Readable<T, D> {
    fn drop(&mut self) {
        self.shared.remove_readable();
    }
}

impl<T: Send + 'static, D: Deliver<T>> fmt::Debug for Readable<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readable")
            .field("buffered", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
