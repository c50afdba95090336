//! Branch-scoped ambient context.
//!
//! Values are keyed by their Rust type and stored as serialized snapshots in
//! the table of the current *branch*. A branch is one path of async execution:
//! the root of a thread, a [`fork`]ed future, a task started with [`spawn`],
//! or code run inside [`Snapshot::enter`].
//!
//! Forking copies the parent's table at that instant. Afterwards the two sides
//! are independent: a child sees everything its ancestors had set before the
//! fork, and nothing a parent or sibling writes later.
//!
//! ```ignore
//! ambient::set(&RequestUser("ana".into()))?;
//! let child = ambient::spawn(async {
//!     ambient::get::<RequestUser>() // Some("ana")
//! });
//! ambient::set(&RequestUser("bo".into()))?; // not seen by `child`
//! ```
//!
//! Code outside every branch (a bare `tokio::spawn` task, a plain thread) has
//! no table at all: [`get`] reads nothing there, and [`set`] and [`clear`]
//! fail with [`AmbientError::Unscoped`]. Wrap such work in [`fork`] or
//! [`Snapshot::scope`] to give it a branch.

mod branch;
mod registry;

pub use branch::{Branched, Snapshot, capture, fork, in_branch, spawn, spawn_blocking, spawn_thread};
pub use registry::{SlotKey, SlotRegistry, registry};

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::convert::{self, ConversionError};

/// Marker for types that may be stored in the ambient context.
///
/// Implement it explicitly for each type you want to carry. Only marked types
/// are accepted by [`set`], [`get`] and friends.
pub trait AmbientValue: Serialize + DeserializeOwned + 'static {}

/// Error storing or loading an ambient value.
#[derive(Debug)]
pub enum AmbientError {
    /// The value could not be serialized into a snapshot.
    Store {
        type_name: &'static str,
        source: ConversionError,
    },
    /// The stored snapshot could not be turned back into the value type.
    Load {
        type_name: &'static str,
        source: ConversionError,
    },
    /// A write was attempted with no ambient branch active on this thread.
    Unscoped { type_name: &'static str },
}

impl AmbientError {
    pub fn type_name(&self) -> &'static str {
        match self {
            AmbientError::Store { type_name, .. }
            | AmbientError::Load { type_name, .. }
            | AmbientError::Unscoped { type_name } => type_name,
        }
    }
}

impl std::fmt::Display for AmbientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmbientError::Store { type_name, source } => {
                write!(f, "cannot store ambient value of type {}: {}", type_name, source)
            }
            AmbientError::Load { type_name, source } => {
                write!(f, "cannot load ambient value of type {}: {}", type_name, source)
            }
            AmbientError::Unscoped { type_name } => write!(
                f,
                "no ambient branch is active for {}; run the work inside ambient::fork, ambient::spawn or Snapshot::scope",
                type_name
            ),
        }
    }
}

impl std::error::Error for AmbientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AmbientError::Store { source, .. } | AmbientError::Load { source, .. } => Some(source),
            AmbientError::Unscoped { .. } => None,
        }
    }
}

fn encode<V: AmbientValue>(value: &V) -> Result<Arc<[u8]>, AmbientError> {
    convert::object_to_bytes(value)
        .map(Arc::from)
        .map_err(|source| AmbientError::Store {
            type_name: type_name::<V>(),
            source,
        })
}

fn decode<V: AmbientValue>(payload: &[u8]) -> Result<V, AmbientError> {
    convert::bytes_to_object(payload).map_err(|source| AmbientError::Load {
        type_name: type_name::<V>(),
        source,
    })
}

fn unscoped<V>() -> AmbientError {
    AmbientError::Unscoped {
        type_name: type_name::<V>(),
    }
}

/// Store a snapshot of `value` in the current branch.
///
/// Visible to this branch and to branches forked from it afterwards; never to
/// the parent or to siblings. Later changes to `value` do not affect the
/// stored snapshot.
pub fn set<V: AmbientValue>(value: &V) -> Result<(), AmbientError> {
    let payload = encode(value)?;
    let key = registry().intern::<V>();
    branch::with_current_mut(|table| table.insert(key, payload)).ok_or_else(unscoped::<V>)
}

/// A fresh copy of the most recent `V` visible in the current branch.
pub fn get<V: AmbientValue>() -> Result<Option<V>, AmbientError> {
    let Some(key) = registry().lookup::<V>() else {
        return Ok(None);
    };
    // Clone the Arc out so no borrow of the cell is held while decoding.
    match branch::with_current(|table| table.and_then(|table| table.get(key))) {
        Some(payload) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

/// Remove `V` from the current branch and from branches forked afterwards.
pub fn clear<V: AmbientValue>() -> Result<(), AmbientError> {
    let key = registry().lookup::<V>();
    branch::with_current_mut(|table| {
        if let Some(key) = key {
            table.remove(key);
        }
    })
    .ok_or_else(unscoped::<V>)
}

pub fn contains<V: AmbientValue>() -> bool {
    registry().lookup::<V>().is_some_and(|key| {
        branch::with_current(|table| table.is_some_and(|table| table.contains(key)))
    })
}

/// Replace `V` in the current branch with `f(current)`.
///
/// This is the in-place form: the caller's own branch changes. Use
/// [`isolate`] to run work with a different `V` without touching it.
pub fn update<V: AmbientValue>(f: impl FnOnce(Option<V>) -> V) -> Result<(), AmbientError> {
    let current = get::<V>()?;
    set(&f(current))
}

/// Wrap `future` in a branch forked from the current one with `V` replaced
/// by `value`. The current branch keeps its own `V`.
pub fn isolate<V, F>(value: &V, future: F) -> Result<Branched<F>, AmbientError>
where
    V: AmbientValue,
    F: Future,
{
    let payload = encode(value)?;
    let key = registry().intern::<V>();
    log::trace!("isolating branch with {}", type_name::<V>());
    Ok(capture().with_slot(key, payload).scope(future))
}
