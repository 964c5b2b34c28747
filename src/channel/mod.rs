//! Bounded, promise-returning hand-off channels.
//!
//! A channel is a multi-producer/multi-consumer hand-off whose `receive`
//! returns a promise and whose back-pressure rides on the same promise
//! chain: producers learn from [`Writable::send`]'s return value whether
//! they outran the capacity threshold, and await [`Writable::ready`] for
//! drainage.
//!
//! The element-to-receiver hop is pluggable (see [`adapter`]): the default
//! [`Direct`] adapter hands elements over unchanged, while [`Flatten`]
//! unwraps promise elements so a [`PromiseChannel`] yields inner values.
//!
//! # Example
//!
//! ```ignore
//! use handoff::channel::Channel;
//!
//! let ch = Channel::<i32>::new(&queue, 5);
//! let writable = ch.writable();
//! let readable = ch.readable();
//!
//! writable.send(17);
//! writable.close();
//!
//! readable.receive().then(|value| {
//!     assert_eq!(value, 17);
//! });
//! ```
//!
//! # Module Contents
//!
//! - [`bounded`]: the channel core and its endpoints
//! - [`adapter`]: delivery strategies, including promise flattening

pub mod adapter;
pub mod bounded;

pub use adapter::{Deliver, Delivery, Direct, Flatten};
pub use bounded::{Channel, Readable, Writable};

use crate::promise::{Promise, SharedPromise};

/// A channel of promises: `receive` flattens to the inner value.
pub type PromiseChannel<U> = Channel<Promise<U>, Flatten>;

/// A channel of shared promises: `receive` flattens to the inner value.
pub type SharedPromiseChannel<U> = Channel<SharedPromise<U>, Flatten>;
