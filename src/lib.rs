//! Handoff: promise-chained, back-pressured hand-off channels.
//!
//! # Overview
//!
//! Handoff is a small asynchronous toolkit built around three tightly
//! coupled abstractions: a [`Promise`] (a single-assignment future with
//! continuation chaining), a [`Channel`] (a bounded, typed hand-off between
//! producers and consumers), and an [`Outcome`] (a value-or-failure carrier
//! used both in buffers and to complete promises). Everything is bound to
//! an execution queue supplied at construction; the toolkit never owns an
//! event loop of its own.
//!
//! # Core Guarantees
//!
//! - **Nothing runs synchronously**: continuations and channel callbacks
//!   are posted to the owning queue, never invoked inside `send`,
//!   `receive`, `then` or `fail` — even on an already-settled promise
//! - **FIFO everywhere**: elements, parked receives, and back-pressure
//!   probes all complete in registration order
//! - **No callback under a lock**: every state decision happens under the
//!   core mutex, every completion after it is released
//! - **Closure is a protocol**: close-with-error carries a failure through
//!   the buffered tail; dropping the last endpoint of either side closes
//!   the channel deterministically
//!
//! # Module Structure
//!
//! - [`error`]: the type-erased [`Failure`] token and terminal error types
//! - [`outcome`]: the value-or-failure carrier
//! - [`queue`]: the execution-queue trait and the two shipped queues
//! - [`promise`]: promises, shared promises, resolvers
//! - [`channel`]: the bounded channel, endpoints, delivery adapters
//! - [`test_utils`]: logging setup and assertion helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod error;
pub mod outcome;
pub mod promise;
pub mod queue;
pub mod test_utils;

pub use channel::{
    Channel, Deliver, Delivery, Direct, Flatten, PromiseChannel, Readable, SharedPromiseChannel,
    Writable,
};
pub use error::{BrokenPromise, ChannelClosed, EmptyFailure, Failure};
pub use outcome::Outcome;
pub use promise::{promise, Promise, Resolver, SharedPromise};
pub use queue::{LabQueue, QueueConfig, QueueHandle, Task, TaskQueue, ThreadQueue};
