#![forbid(unsafe_code)]

//! Cleanup bag with exactly-once disposal.
//!
//! # Invariants
//!
//! 1. Every cleanup registered with [`Disposable::add`] runs exactly once.
//! 2. Cleanups registered before disposal run in registration order on the
//!    thread that wins the disposal.
//! 3. A cleanup registered after disposal runs immediately on the
//!    registering thread.
//! 4. Concurrent `dispose()` calls are safe; only the first does any work.

use std::sync::{Arc, Mutex};

use crate::lock;

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct DisposableState {
    disposed: bool,
    cleanups: Vec<Cleanup>,
}

/// Handle to a run's lifetime. Disposing it tears the run down.
///
/// Cloning yields another handle to the same bag.
#[derive(Clone, Default)]
pub struct Disposable {
    state: Arc<Mutex<DisposableState>>,
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Disposable")
            .field("disposed", &state.disposed)
            .field("pending", &state.cleanups.len())
            .finish()
    }
}

impl Disposable {
    /// Create an empty, live bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup. Runs it immediately if already disposed.
    pub fn add(&self, cleanup: impl FnOnce() + Send + 'static) {
        let mut state = lock(&self.state);
        if state.disposed {
            drop(state);
            cleanup();
        } else {
            state.cleanups.push(Box::new(cleanup));
        }
    }

    /// Run every registered cleanup. Later calls are no-ops.
    pub fn dispose(&self) {
        let cleanups = {
            let mut state = lock(&self.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.cleanups)
        };
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }
}
