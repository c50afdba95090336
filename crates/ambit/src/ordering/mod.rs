//! Ordered draining of concurrently running computations.
//!
//! [`OrderedTasks`] takes N computations that are already running (or starts
//! them itself) and hands out one [`OrderedHandle`] per computation, in
//! submission order, no matter which computation finishes first.
//!
//! Every computation gets a watcher task that fires on completion. Watchers and
//! requests meet in a single mutex-guarded buffer:
//! - a completion with a waiting (parked) request resolves that request,
//!   otherwise it is queued as unclaimed;
//! - a request with a matching unclaimed completion is resolved immediately,
//!   otherwise it is parked.
//!
//! # Usage
//! ```ignore
//! let tasks = OrderedTasks::spawn_all([
//!     || async { slow().await },
//!     || async { fast().await },
//! ])?;
//! for handle in tasks {
//!     println!("{:?}", handle.await);
//! }
//! ```

mod handle;

pub use handle::{OrderedHandle, Outcome, Panic, TaskError};

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::oneshot;
use futures_util::stream::{self, Stream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::ambient;

/// Which outcome a handle receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOrder {
    /// Handle `k` resolves with the outcome of the `k`-th submitted computation.
    #[default]
    Submission,
    /// Handle `k` resolves with the `k`-th computation to finish.
    Completion,
}

/// Error returned when an [`OrderedTasks`] cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// The constructor input cannot be used. Nothing was started.
    Argument(String),
}

impl std::fmt::Display for OrderingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderingError::Argument(reason) => write!(f, "invalid argument: {}", reason),
        }
    }
}

impl std::error::Error for OrderingError {}

// --- Buffer ---

struct Buffer<T> {
    order: DeliveryOrder,
    total: usize,
    /// Handles handed out so far; also the ordinal of the next request.
    issued: usize,
    pending: HashSet<usize>,
    unclaimed: VecDeque<(usize, Outcome<T>)>,
    parked: VecDeque<(usize, oneshot::Sender<Outcome<T>>)>,
}

impl<T> Buffer<T> {
    fn new(order: DeliveryOrder, total: usize) -> Self {
        Self {
            order,
            total,
            issued: 0,
            pending: (0..total).collect(),
            unclaimed: VecDeque::new(),
            parked: VecDeque::new(),
        }
    }

    /// Index of the queue entry that pairs with `ordinal`.
    fn position<E>(order: DeliveryOrder, queue: &VecDeque<(usize, E)>, ordinal: usize) -> Option<usize> {
        match order {
            DeliveryOrder::Submission => queue.iter().position(|(candidate, _)| *candidate == ordinal),
            DeliveryOrder::Completion => (!queue.is_empty()).then_some(0),
        }
    }

    fn complete(&mut self, ordinal: usize, outcome: Outcome<T>) {
        self.pending.remove(&ordinal);
        let parked = Self::position(self.order, &self.parked, ordinal)
            .and_then(|index| self.parked.remove(index));
        match parked {
            Some((request, sender)) => {
                log::trace!("computation {} resolves parked request {}", ordinal, request);
                if sender.send(outcome).is_err() {
                    log::debug!("handle {} was dropped before computation {} completed", request, ordinal);
                }
            }
            None => {
                log::trace!("computation {} completed unclaimed", ordinal);
                self.unclaimed.push_back((ordinal, outcome));
            }
        }
    }

    fn request(&mut self) -> Option<OrderedHandle<T>> {
        if self.issued == self.total {
            return None;
        }
        let ordinal = self.issued;
        self.issued += 1;

        let unclaimed = Self::position(self.order, &self.unclaimed, ordinal)
            .and_then(|index| self.unclaimed.remove(index));
        match unclaimed {
            Some((_, outcome)) => Some(OrderedHandle::ready(ordinal, outcome)),
            None => {
                let (sender, receiver) = oneshot::channel();
                self.parked.push_back((ordinal, sender));
                Some(OrderedHandle::parked(ordinal, receiver))
            }
        }
    }
}

// --- OrderedTasks ---

/// A fixed set of concurrent computations drained one handle at a time.
///
/// Iterating yields exactly one [`OrderedHandle`] per computation and then
/// ends. With [`DeliveryOrder::Submission`] (the default) the handle at
/// position `k` resolves with the outcome of the `k`-th computation, so the
/// value order always equals the submission order. A computation that panics
/// or is cancelled surfaces that at its own position without holding up or
/// skipping any other position. Nothing is retried.
pub struct OrderedTasks<T> {
    shared: Arc<Mutex<Buffer<T>>>,
}

impl<T: Send + 'static> OrderedTasks<T> {
    /// Drain already-started tasks in the order given.
    ///
    /// Tasks started with a bare `tokio::spawn` run outside any ambient
    /// branch; use [`spawn_all`](Self::spawn_all) or wrap them in
    /// [`ambient::fork`] to carry the caller's ambient values.
    pub fn new<I>(handles: I) -> Result<Self, OrderingError>
    where
        I: IntoIterator<Item = JoinHandle<T>>,
    {
        Self::with_order(handles, DeliveryOrder::default())
    }

    pub fn with_order<I>(handles: I, order: DeliveryOrder) -> Result<Self, OrderingError>
    where
        I: IntoIterator<Item = JoinHandle<T>>,
    {
        let runtime = current_runtime()?;
        Ok(Self::watch_all(&runtime, handles.into_iter().collect(), order))
    }

    /// Start every computation now, each in its own forked ambient branch,
    /// and drain them in the order given.
    pub fn spawn_all<I, F, Fut>(starts: I) -> Result<Self, OrderingError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::spawn_all_with_order(starts, DeliveryOrder::default())
    }

    pub fn spawn_all_with_order<I, F, Fut>(starts: I, order: DeliveryOrder) -> Result<Self, OrderingError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let runtime = current_runtime()?;
        let handles = starts
            .into_iter()
            .map(|start| runtime.spawn(ambient::fork(async move { start().await })))
            .collect();
        Ok(Self::watch_all(&runtime, handles, order))
    }

    fn watch_all(runtime: &Handle, handles: Vec<JoinHandle<T>>, order: DeliveryOrder) -> Self {
        log::debug!("ordering {} computations by {:?}", handles.len(), order);
        let shared = Arc::new(Mutex::new(Buffer::new(order, handles.len())));
        for (ordinal, handle) in handles.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            runtime.spawn(async move {
                let outcome = handle.await.map_err(TaskError::from_join);
                lock(&shared).complete(ordinal, outcome);
            });
        }
        Self { shared }
    }
}

impl<T> OrderedTasks<T> {
    /// Request the next handle, or `None` once every computation has one.
    ///
    /// Takes `&self` so several consumers may share one buffer; handles are
    /// still issued strictly in sequence.
    pub fn next_handle(&self) -> Option<OrderedHandle<T>> {
        lock(&self.shared).request()
    }

    /// Number of computations in the buffer.
    pub fn len(&self) -> usize {
        lock(&self.shared).total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles not yet issued.
    pub fn remaining(&self) -> usize {
        let buffer = lock(&self.shared);
        buffer.total - buffer.issued
    }

    /// Computations that have not finished yet.
    pub fn pending(&self) -> usize {
        lock(&self.shared).pending.len()
    }

    pub fn order(&self) -> DeliveryOrder {
        lock(&self.shared).order
    }

    /// Await each handle in turn, yielding outcomes in delivery order.
    pub fn into_stream(self) -> impl Stream<Item = Outcome<T>> {
        stream::unfold(self, |tasks| async move {
            let handle = tasks.next_handle()?;
            let outcome = handle.await;
            Some((outcome, tasks))
        })
    }
}

impl<T> Iterator for OrderedTasks<T> {
    type Item = OrderedHandle<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_handle()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for OrderedTasks<T> {}

impl<T> std::fmt::Debug for OrderedTasks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = lock(&self.shared);
        f.debug_struct("OrderedTasks")
            .field("order", &buffer.order)
            .field("total", &buffer.total)
            .field("issued", &buffer.issued)
            .field("pending", &buffer.pending.len())
            .field("unclaimed", &buffer.unclaimed.len())
            .field("parked", &buffer.parked.len())
            .finish()
    }
}

// Watchers never panic while holding the lock; a poisoned buffer is still consistent.
fn lock<T>(shared: &Mutex<Buffer<T>>) -> MutexGuard<'_, Buffer<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_runtime() -> Result<Handle, OrderingError> {
    Handle::try_current().map_err(|error| {
        OrderingError::Argument(format!(
            "ordered tasks need a Tokio runtime to attach completions to: {}",
            error
        ))
    })
}
