#![forbid(unsafe_code)]

//! RAII subscriber guard shared by observables and signals.

use std::any::Any;

/// RAII guard for a subscriber callback.
///
/// Dropping the `Subscription` causes the associated callback to become
/// unreachable (the strong `Arc` is dropped, so the `Weak` in the source's
/// subscriber list will fail to upgrade on the next notification cycle).
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    /// Type-erased strong reference keeping the callback `Arc` alive.
    _guard: Box<dyn Any + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(guard: impl Any + Send + Sync) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
