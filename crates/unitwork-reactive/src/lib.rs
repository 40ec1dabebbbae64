#![forbid(unsafe_code)]

//! Reactive primitives for unitwork.
//!
//! This crate provides the minimal push-based vocabulary the action core is
//! built on:
//!
//! - [`Observable`]: A shared, version-tracked value with change
//!   notification. [`ReadOnly`] is its read-side handle.
//! - [`Computed`]: A value derived from one or two observables, always
//!   pulled fresh and pushed to subscribers when the result changes.
//! - [`Producer`]: A cold stream. Nothing happens until it is started, and
//!   each start is an independent run with its own [`Disposable`].
//! - [`Signal`]: A hot broadcast stream fed by a [`SignalSender`]. Late
//!   observers miss earlier occurrences.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//!
//! # Architecture
//!
//! Everything is `Send + Sync`. Shared state lives behind `Arc<Mutex<..>>`
//! and every callback is invoked with no internal state lock held, so a
//! callback may freely read (or write) other reactive values. Subscribers
//! are stored as `Weak` function pointers and pruned lazily.
//!
//! # Invariants
//!
//! 1. A stream delivers values in order and at most one terminal
//!    occurrence ([`Event::Failed`] or [`Event::Completed`]).
//! 2. A [`Disposable`] runs each registered cleanup exactly once, even when
//!    disposal races with natural termination.
//! 3. Observable versions increase by exactly 1 per value-changing mutation.
//! 4. Dropping a [`Subscription`] stops delivery before the next
//!    notification cycle.

pub mod computed;
pub mod disposable;
pub mod event;
pub mod observable;
pub mod producer;
pub mod signal;
pub mod subscription;

pub use computed::Computed;
pub use disposable::Disposable;
pub use event::Event;
pub use observable::{Observable, ReadOnly, Watchable};
pub use producer::{Producer, Sink};
pub use signal::{Signal, SignalSender};
pub use subscription::Subscription;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking callback poisoned it.
///
/// No state guarded here is left half-written by a panic: every critical
/// section either completes its mutation or performs none.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
