//! Branch-local slot tables and the primitives that fork them.
//!
//! The table of the branch currently running on a thread lives in a
//! thread-local cell. A [`Branched`] future owns its branch's table and swaps
//! it into that cell for the duration of each poll, so whichever worker thread
//! polls it sees exactly that branch. Forking is a clone of the table: slot
//! payloads are immutable `Arc<[u8]>`, so a fork copies pointers, not values.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::registry::SlotKey;

thread_local! {
    /// Table of the branch being run on this thread. `None` outside any
    /// branch: a bare `tokio::spawn` task or a plain thread has no table.
    static CURRENT: RefCell<Option<SlotTable>> = const { RefCell::new(None) };
}

#[derive(Clone, Default, Debug)]
pub(crate) struct SlotTable {
    slots: HashMap<SlotKey, Arc<[u8]>>,
}

impl SlotTable {
    pub(crate) fn get(&self, key: SlotKey) -> Option<Arc<[u8]>> {
        self.slots.get(&key).cloned()
    }

    pub(crate) fn insert(&mut self, key: SlotKey, payload: Arc<[u8]>) {
        self.slots.insert(key, payload);
    }

    pub(crate) fn remove(&mut self, key: SlotKey) -> bool {
        self.slots.remove(&key).is_some()
    }

    pub(crate) fn contains(&self, key: SlotKey) -> bool {
        self.slots.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) fn with_current<R>(f: impl FnOnce(Option<&SlotTable>) -> R) -> R {
    CURRENT.with(|current| f(current.borrow().as_ref()))
}

/// `None` when no branch is active on this thread.
pub(crate) fn with_current_mut<R>(f: impl FnOnce(&mut SlotTable) -> R) -> Option<R> {
    CURRENT.with(|current| current.borrow_mut().as_mut().map(f))
}

/// True while a branch is being polled or entered on this thread.
pub fn in_branch() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

// --- Entered ---

/// Installs a branch table for as long as it lives, then hands the (possibly
/// written) table back to its owner and restores whatever was there before.
/// Restoring happens in `Drop`, so it also runs if the branch panics.
struct Entered<'a> {
    home: &'a mut Option<SlotTable>,
    previous: Option<SlotTable>,
}

impl<'a> Entered<'a> {
    fn new(home: &'a mut Option<SlotTable>) -> Self {
        let table = home.take().unwrap_or_default();
        let previous = CURRENT.with(|current| current.replace(Some(table)));
        Self { home, previous }
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        let table = CURRENT.with(|current| current.replace(self.previous.take()));
        *self.home = table;
    }
}

// --- Snapshot ---

/// Immutable copy of a branch's slot table, taken at one instant.
///
/// A snapshot is the explicit handle for carrying ambient context into work
/// started by other means than [`fork`]/[`spawn`]: every [`enter`](Self::enter)
/// or [`scope`](Self::scope) runs in a fresh child branch of the captured
/// state, and nothing written there leaks back into the snapshot.
#[derive(Clone, Default, Debug)]
pub struct Snapshot {
    table: SlotTable,
}

/// Capture the current branch's table; empty outside any branch.
pub fn capture() -> Snapshot {
    Snapshot {
        table: with_current(|table| table.cloned().unwrap_or_default()),
    }
}

impl Snapshot {
    /// A snapshot with no slots set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub(crate) fn with_slot(mut self, key: SlotKey, payload: Arc<[u8]>) -> Self {
        self.table.insert(key, payload);
        self
    }

    /// Run `f` synchronously in a child branch of this snapshot.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut table = Some(self.table.clone());
        let _entered = Entered::new(&mut table);
        f()
    }

    /// Wrap `future` so it runs in a child branch of this snapshot.
    pub fn scope<F: Future>(&self, future: F) -> Branched<F> {
        Branched {
            inner: future,
            table: Some(self.table.clone()),
        }
    }
}

// --- Branched ---

/// A future running in its own ambient branch.
#[pin_project::pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Branched<F> {
    #[pin]
    inner: F,
    table: Option<SlotTable>,
}

impl<F: Future> Future for Branched<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _entered = Entered::new(this.table);
        this.inner.poll(cx)
    }
}

impl<F> std::fmt::Debug for Branched<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branched")
            .field("slots", &self.table.as_ref().map_or(0, SlotTable::len))
            .finish()
    }
}

/// Wrap `future` in a child branch forked from the current one, now.
pub fn fork<F: Future>(future: F) -> Branched<F> {
    capture().scope(future)
}

/// `tokio::spawn` in a child branch forked from the current one.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fork(future))
}

/// `tokio::task::spawn_blocking` in a child branch forked from the current one.
pub fn spawn_blocking<F, R>(f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let snapshot = capture();
    tokio::task::spawn_blocking(move || snapshot.enter(f))
}

/// `std::thread::spawn` in a child branch forked from the current one.
pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let snapshot = capture();
    std::thread::spawn(move || snapshot.enter(f))
}
