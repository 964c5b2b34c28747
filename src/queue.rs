//! Execution queues that promise continuations and channel callbacks run on.
//!
//! The core never invokes user code synchronously: every continuation and
//! channel callback is posted to the queue the promise or channel was bound
//! to at construction. The queue contract is a single operation, [`post`];
//! ordering of tasks posted to one queue is the queue's business.
//!
//! Two implementations ship with the crate:
//!
//! - [`ThreadQueue`]: one or more worker threads draining a FIFO. The
//!   production choice.
//! - [`LabQueue`]: a deterministic queue drained manually by the test
//!   driving it. Nothing runs until the test says so, which makes
//!   continuation ordering observable.
//!
//! [`post`]: TaskQueue::post
//!
//! # Example
//!
//! ```ignore
//! use handoff::queue::{QueueConfig, ThreadQueue};
//!
//! let queue = ThreadQueue::spawn(QueueConfig::default());
//! queue.post(Box::new(|| println!("ran on a worker")));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

/// A nullary task posted to an execution queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The execution-queue contract: schedule a task to run later on some
/// thread serviced by the queue.
///
/// Implementations must be safe to post to from any thread. Tasks posted to
/// the same queue from the same thread run in post order on the queues this
/// crate ships; the channel core relies only on `post` existing, not on any
/// queue-internal ordering.
pub trait TaskQueue: Send + Sync {
    /// Schedules `task` to run later.
    fn post(&self, task: Task);
}

/// Shared handle to an execution queue.
pub type QueueHandle = Arc<dyn TaskQueue>;

/// Configuration for a [`ThreadQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Thread name prefix for the workers.
    pub name: String,
    /// Number of worker threads draining the queue.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "handoff-queue".to_string(),
            workers: 1,
        }
    }
}

struct ThreadQueueState {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct ThreadQueueInner {
    name: String,
    state: Mutex<ThreadQueueState>,
    available: Condvar,
}

impl ThreadQueueInner {
    fn worker_loop(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        loop {
            if let Some(task) = state.tasks.pop_front() {
                drop(state);
                task();
                state = self.state.lock().expect("queue lock poisoned");
                continue;
            }
            if state.shutdown {
                break;
            }
            state = self
                .available
                .wait(state)
                .expect("queue lock poisoned");
        }
        tracing::trace!(queue = %self.name, "worker exiting");
    }
}

/// A worker-thread-backed execution queue.
///
/// Tasks are drained in FIFO order. With a single worker the queue is
/// serial; with more it is a small pool. Dropping the last handle drains
/// the remaining tasks and joins the workers.
pub struct ThreadQueue {
    inner: Arc<ThreadQueueInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadQueue {
    /// Spawns the worker threads and returns a shared queue handle.
    ///
    /// # Panics
    ///
    /// Panics if `config.workers` is 0 or a worker thread cannot be spawned.
    #[must_use]
    pub fn spawn(config: QueueConfig) -> Arc<Self> {
        assert!(config.workers > 0, "queue must have at least one worker");

        let inner = Arc::new(ThreadQueueInner {
            name: config.name.clone(),
            state: Mutex::new(ThreadQueueState {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let workers = (0..config.workers)
            .map(|index| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("{}-{index}", config.name))
                    .spawn(move || inner.worker_loop())
                    .expect("failed to spawn queue worker")
            })
            .collect();

        tracing::debug!(queue = %config.name, workers = config.workers, "queue started");

        Arc::new(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }
}

impl TaskQueue for ThreadQueue {
    fn post(&self, task: Task) {
        {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.tasks.push_back(task);
        }
        self.inner.available.notify_one();
    }
}

impl fmt::Debug for ThreadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .inner
            .state
            .lock()
            .map(|state| state.tasks.len())
            .unwrap_or(0);
        f.debug_struct("ThreadQueue")
            .field("name", &self.inner.name)
            .field("pending", &pending)
            .finish_non_exhaustive()
    }
}

impl Drop for ThreadQueue {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.shutdown = true;
        }
        self.inner.available.notify_all();

        let workers = {
            let mut guard = self.workers.lock().expect("queue lock poisoned");
            std::mem::take(&mut *guard)
        };
        let current = thread::current().id();
        for worker in workers {
            // A worker dropping the last handle must not join itself.
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}

/// A deterministic, manually drained execution queue for tests.
///
/// Posting never runs anything; the test drives execution with
/// [`run_one`] / [`run_all`]. This makes "continuations are scheduled,
/// never invoked synchronously" directly observable.
///
/// [`run_one`]: LabQueue::run_one
/// [`run_all`]: LabQueue::run_all
#[derive(Default)]
pub struct LabQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl LabQueue {
    /// Creates an empty lab queue.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs the oldest pending task. Returns false if none was pending.
    pub fn run_one(&self) -> bool {
        let task = {
            let mut tasks = self.tasks.lock().expect("queue lock poisoned");
            tasks.pop_front()
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks posted while
    /// draining. Returns the number of tasks run.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Returns the number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().expect("queue lock poisoned").len()
    }

    /// Returns true if no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for LabQueue {
    fn post(&self, task: Task) {
        let mut tasks = self.tasks.lock().expect("queue lock poisoned");
        tasks.push_back(task);
    }
}

impl fmt::Debug for LabQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabQueue")
            .field("pending", &self.len())
            .finish()
    }
}
