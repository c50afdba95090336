//! Result handles issued by [`OrderedTasks`](super::OrderedTasks).

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_channel::oneshot;
use tokio::task::JoinError;

/// What one computation produced: its value, or why it has none.
pub type Outcome<T> = Result<T, TaskError>;

/// Failure of a single computation, delivered at that computation's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The computation panicked.
    Panicked(Panic),
    /// The computation was aborted, or its result can no longer arrive.
    Cancelled,
}

impl TaskError {
    pub(crate) fn from_join(error: JoinError) -> Self {
        if error.is_cancelled() {
            return TaskError::Cancelled;
        }
        match error.try_into_panic() {
            Ok(payload) => TaskError::Panicked(Panic::from_payload(payload)),
            Err(_) => TaskError::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }

    pub fn panic(&self) -> Option<&Panic> {
        match self {
            TaskError::Panicked(panic) => Some(panic),
            TaskError::Cancelled => None,
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Panicked(panic) => write!(f, "computation panicked: {}", panic.message()),
            TaskError::Cancelled => write!(f, "computation was cancelled"),
        }
    }
}

impl std::error::Error for TaskError {}

// --- Panic ---

/// A captured panic: its message, plus the original payload for callers that
/// want to downcast it or resume unwinding with it.
///
/// Clones share one payload slot, so the payload can be taken once. Equality
/// compares messages only.
#[derive(Clone)]
pub struct Panic {
    message: String,
    payload: Arc<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl Panic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message,
            payload: Arc::new(Mutex::new(Some(payload))),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The value passed to `panic!`/`panic_any`, if no clone took it already.
    /// Hand it to `std::panic::resume_unwind` to re-raise the panic.
    pub fn take_payload(&self) -> Option<Box<dyn Any + Send>> {
        self.payload.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl From<String> for Panic {
    fn from(message: String) -> Self {
        Self::from_payload(Box::new(message))
    }
}

impl From<&str> for Panic {
    fn from(message: &str) -> Self {
        Self::from(message.to_string())
    }
}

impl PartialEq for Panic {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl Eq for Panic {}

impl std::fmt::Debug for Panic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Panic").field(&self.message).finish()
    }
}

// --- OrderedHandle ---

enum HandleState<T> {
    /// The outcome was already waiting when the handle was requested.
    Ready(Option<Outcome<T>>),
    /// Parked until the matching computation completes.
    Parked(oneshot::Receiver<Outcome<T>>),
}

/// Future resolving to the outcome delivered at one ordinal slot.
///
/// Handles are issued in request order; `ordinal()` is the position of the
/// handle in that sequence. A handle resolves exactly once.
pub struct OrderedHandle<T> {
    ordinal: usize,
    state: HandleState<T>,
}

impl<T> OrderedHandle<T> {
    pub(crate) fn ready(ordinal: usize, outcome: Outcome<T>) -> Self {
        Self {
            ordinal,
            state: HandleState::Ready(Some(outcome)),
        }
    }

    pub(crate) fn parked(ordinal: usize, receiver: oneshot::Receiver<Outcome<T>>) -> Self {
        Self {
            ordinal,
            state: HandleState::Parked(receiver),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// True if the outcome was available when the handle was issued.
    pub fn was_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }
}

// The outcome is only ever moved out by value, never pinned in place.
impl<T> Unpin for OrderedHandle<T> {}

impl<T> Future for OrderedHandle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(outcome) => Poll::Ready(
                outcome
                    .take()
                    .expect("OrderedHandle polled after completion"),
            ),
            // Sender dropped: the buffer went away before this slot completed.
            HandleState::Parked(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(TaskError::Cancelled))),
        }
    }
}

impl<T> std::fmt::Debug for OrderedHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedHandle")
            .field("ordinal", &self.ordinal)
            .field("ready", &self.was_ready())
            .finish()
    }
}
