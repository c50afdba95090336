//! Ordered draining of concurrent computations and branch-scoped ambient
//! context for Tokio applications.
//!
//! - [`ordering`]: run N computations in parallel, read their outcomes back in
//!   the order they were submitted.
//! - [`ambient`]: typed values that flow into every task forked from the
//!   branch that set them, and never sideways into siblings.
//! - [`tracking`]: call-chain identity carried in the ambient context.
//! - [`convert`] and [`switch`]: small helpers the above are built from.

pub mod ambient;
pub mod convert;
pub mod ordering;
pub mod switch;
pub mod tracking;

pub use ambient::{AmbientError, AmbientValue};
pub use ordering::{DeliveryOrder, OrderedHandle, OrderedTasks, OrderingError, Outcome, Panic, TaskError};
pub use tracking::TrackingContext;
