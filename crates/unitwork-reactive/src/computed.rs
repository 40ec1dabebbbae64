#![forbid(unsafe_code)]

//! Derived values that track their [`Watchable`] dependencies.
//!
//! # Design
//!
//! [`Computed<T>`] holds a compute function over its sources and an internal
//! [`Observable`] carrying the last published result. Reads are pull-based:
//! [`get()`](Computed::get) always evaluates the compute function against
//! the sources' current values, so it can never be stale. Pushes are
//! change-driven: whenever a source changes, the result is recomputed and
//! published, and subscribers are notified only if it differs from the last
//! published value.
//!
//! # Invariants
//!
//! 1. `get()` is consistent with the current state of every dependency.
//! 2. Subscribers see each distinct result at most once per change.
//! 3. Version increments by exactly 1 per published change.
//! 4. Publishing is serialised: once every writer has returned, the last
//!    pushed value equals `get()`, however many threads changed sources.
//!
//! # Failure Modes
//!
//! - **Reentrant write**: a subscriber that writes a source while being
//!   notified does not recurse; the change is picked up by the refresh
//!   already in progress once the subscriber returns.
//! - **Dependency dropped**: sources are held by the compute function, so a
//!   dependency lives as long as the `Computed` does.

use std::sync::{Arc, Mutex, Weak};

use crate::lock;
use crate::observable::{Observable, Watchable};
use crate::subscription::Subscription;

type ComputeFn<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    compute: ComputeFn<T>,
    /// Last published result; subscribers hang off this.
    published: Observable<T>,
    refresh: Mutex<RefreshState>,
}

#[derive(Debug, Default)]
struct RefreshState {
    /// A source changed since the last compute started.
    pending: bool,
    /// Some thread is recomputing and publishing.
    draining: bool,
}

/// Clears `draining` if a compute function or subscriber panics mid-refresh.
struct Draining<'a>(&'a Mutex<RefreshState>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> ComputedInner<T> {
    /// Recompute and publish after a source change.
    ///
    /// Only one thread publishes at a time. A change arriving while another
    /// thread is publishing marks the result pending and returns; the
    /// publishing thread recomputes until no change is pending, so the value
    /// published last is always computed after the last change.
    fn refresh(&self) {
        {
            let mut state = lock(&self.refresh);
            state.pending = true;
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let _draining = Draining(&self.refresh);
        loop {
            {
                let mut state = lock(&self.refresh);
                if !state.pending {
                    state.draining = false;
                    return;
                }
                state.pending = false;
            }
            self.published.set((self.compute)());
        }
    }
}

/// A value derived from one or two [`Watchable`] dependencies.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
    /// Dependency subscriptions. Shared so clones keep them alive too.
    _subscriptions: Arc<Vec<Subscription>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _subscriptions: Arc::clone(&self._subscriptions),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("published", &self.inner.published)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Computed<T> {
    /// Derive a value from a single source.
    pub fn map<S, W>(source: &W, map: impl Fn(&S) -> T + Send + Sync + 'static) -> Self
    where
        S: 'static,
        W: Watchable<S> + Clone + Send + Sync + 'static,
    {
        let src = source.clone();
        let compute: ComputeFn<T> = Box::new(move || map(&src.current()));
        Self::build(compute, |hook| vec![source.watch(Box::new(move |_: &S| hook()))])
    }

    /// Derive a value from two sources.
    pub fn combine<S1, S2, W1, W2>(
        s1: &W1,
        s2: &W2,
        map: impl Fn(&S1, &S2) -> T + Send + Sync + 'static,
    ) -> Self
    where
        S1: 'static,
        S2: 'static,
        W1: Watchable<S1> + Clone + Send + Sync + 'static,
        W2: Watchable<S2> + Clone + Send + Sync + 'static,
    {
        let (src1, src2) = (s1.clone(), s2.clone());
        let compute: ComputeFn<T> = Box::new(move || map(&src1.current(), &src2.current()));
        Self::build(compute, |hook| {
            let hook2 = Arc::clone(&hook);
            vec![
                s1.watch(Box::new(move |_: &S1| hook())),
                s2.watch(Box::new(move |_: &S2| hook2())),
            ]
        })
    }

    fn build(
        compute: ComputeFn<T>,
        subscribe: impl FnOnce(Arc<dyn Fn() + Send + Sync>) -> Vec<Subscription>,
    ) -> Self {
        let published = Observable::new(compute());
        let inner = Arc::new(ComputedInner {
            compute,
            published,
            refresh: Mutex::new(RefreshState::default()),
        });

        let weak: Weak<ComputedInner<T>> = Arc::downgrade(&inner);
        let hook: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(strong) = weak.upgrade() {
                strong.refresh();
            }
        });
        let subscriptions = subscribe(hook);

        Self {
            inner,
            _subscriptions: Arc::new(subscriptions),
        }
    }

    /// Evaluate against the dependencies' current values.
    #[must_use]
    pub fn get(&self) -> T {
        (self.inner.compute)()
    }

    /// Subscribe to changes of the derived value.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.published.subscribe(callback)
    }

    /// Number of published changes since construction.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.published.version()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Watchable<T> for Computed<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subscribe(callback)
    }
}
