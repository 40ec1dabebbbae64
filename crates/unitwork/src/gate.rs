#![forbid(unsafe_code)]

//! Execution gate: the atomic permission check behind every action run.
//!
//! # Design
//!
//! The gate tracks a single `executing` flag in an [`Observable<bool>`] and
//! reads a caller-supplied enablement source. A run may begin only when the
//! source is `true` and nothing is executing. The check and the
//! `false → true` transition happen inside one [`Observable::modify`]
//! critical section, so racing callers cannot both be granted.
//!
//! The flag is a ticket, not a held lock: the work a grant authorises runs
//! outside any lock for as long as it likes. [`Permit`] is the RAII form of
//! a grant and releases the gate when dropped.
//!
//! # Invariants
//!
//! 1. At most one grant is outstanding at any instant.
//! 2. `executing` goes `false → true` only in a granting [`Gate::try_begin`]
//!    and `true → false` only in [`Gate::end`].
//! 3. [`Gate::is_enabled`] equals `source && !executing` whenever read.
//! 4. A denial changes no state.

use std::sync::Arc;

use tracing::{debug, warn};
use unitwork_reactive::{Computed, Observable, ReadOnly, Watchable};

type EnabledFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Atomic permission/state tracker for a single unit of work.
pub struct Gate {
    executing: Observable<bool>,
    user_enabled: EnabledFn,
    enabled: Computed<bool>,
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("executing", &self.executing.get())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}

impl Gate {
    /// Create an idle gate guarded by `user_enabled`.
    pub fn new<S>(user_enabled: S) -> Self
    where
        S: Watchable<bool> + Clone + Send + Sync + 'static,
    {
        let executing = Observable::new(false);
        let enabled = Computed::combine(&user_enabled, &executing, |user: &bool, busy: &bool| {
            *user && !*busy
        });
        Self {
            executing,
            user_enabled: Box::new(move || user_enabled.current()),
            enabled,
        }
    }

    /// A gate whose enablement source is always `true`.
    #[must_use]
    pub fn always_enabled() -> Self {
        Self::new(ReadOnly::constant(true))
    }

    /// Atomically check enablement and, if enabled, mark executing.
    ///
    /// Returns `true` on grant. Every grant must be matched by exactly one
    /// [`end`](Self::end).
    pub fn try_begin(&self) -> bool {
        let user_enabled = &self.user_enabled;
        self.executing.modify(|executing| {
            if *executing || !user_enabled() {
                false
            } else {
                *executing = true;
                true
            }
        })
    }

    /// Mark the current run finished.
    pub fn end(&self) {
        let was_executing = self.executing.modify(|executing| std::mem::replace(executing, false));
        if !was_executing {
            warn!("gate released without an outstanding grant");
        }
    }

    /// Try to obtain a [`Permit`]; `None` on denial.
    pub fn permit(self: &Arc<Self>) -> Option<Permit> {
        if self.try_begin() {
            debug!("gate granted");
            Some(Permit {
                gate: Arc::clone(self),
            })
        } else {
            debug!("gate denied");
            None
        }
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_executing(&self) -> ReadOnly<bool> {
        self.executing.read_only()
    }

    /// Derived `source && !executing`.
    #[must_use]
    pub fn is_enabled(&self) -> Computed<bool> {
        self.enabled.clone()
    }
}

/// A granted run. Releases its [`Gate`] exactly once, on drop.
#[must_use = "dropping a Permit releases the gate immediately"]
pub struct Permit {
    gate: Arc<Gate>,
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.end();
        debug!("gate released");
    }
}
