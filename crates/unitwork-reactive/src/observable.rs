#![forbid(unsafe_code)]

//! Observable value wrapper with change notification and version tracking.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, thread-safe storage
//! (`Arc<Mutex<..>>`). When the value changes (determined by `PartialEq`),
//! all live subscribers are notified in registration order.
//!
//! [`ReadOnly<T>`] is a handle onto the same storage that can read and
//! subscribe but never write. Components that merely consume a value (for
//! example an enablement flag) take a `ReadOnly`.
//!
//! # Performance
//!
//! | Operation     | Complexity                 |
//! |---------------|----------------------------|
//! | `get()`       | O(1) + clone               |
//! | `set()`       | O(S) where S = subscribers |
//! | `subscribe()` | O(1) amortized             |
//!
//! # Failure Modes
//!
//! - **Closure touches another observable inside `modify`**: `modify` runs
//!   its closure under this observable's lock. Reading other observables
//!   there is fine; writing one whose subscribers write back here deadlocks.
//! - **Concurrent writers**: notifications from two racing writers may reach
//!   a subscriber in either order. `get()` always returns the latest value.
//! - **Subscriber leak**: If `Subscription` guards are stored indefinitely
//!   without being dropped, callbacks accumulate. Dead weak references are
//!   cleaned lazily during notification.

use std::sync::{Arc, Mutex, Weak};

use crate::lock;
use crate::subscription::Subscription;

type CallbackArc<T> = Arc<dyn Fn(&T) + Send + Sync>;
type CallbackWeak<T> = Weak<dyn Fn(&T) + Send + Sync>;

/// Shared interior for [`Observable<T>`].
struct ObservableInner<T> {
    value: T,
    version: u64,
    /// Subscribers stored as weak references. Dead entries are pruned on notify.
    subscribers: Vec<CallbackWeak<T>>,
}

/// Anything that holds a current value and reports changes to it.
///
/// Implemented by [`Observable`], [`ReadOnly`] and
/// [`Computed`](crate::Computed), so derived values can be built from any of
/// them.
pub trait Watchable<T> {
    /// The current value.
    fn current(&self) -> T;

    /// Register a change callback.
    fn watch(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription;
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** inner state;
/// both handles see the same value and share subscribers.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing mutation.
/// 2. `set(v)` where `v == current` is a no-op.
/// 3. Subscribers are notified in registration order.
/// 4. Dead subscribers (dropped [`Subscription`] guards) are pruned lazily.
pub struct Observable<T> {
    inner: Arc<Mutex<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// The lock is held while `f` runs; keep it short.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.inner).value)
    }

    /// Set a new value. If the new value differs from the current value
    /// (by `PartialEq`), the version is incremented and all live subscribers
    /// are notified.
    pub fn set(&self, value: T) {
        self.modify(move |current| *current = value);
    }

    /// Modify the value in place via a closure. If the value changes
    /// (compared by `PartialEq` against a snapshot), the version is
    /// incremented and subscribers are notified.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.modify(f);
    }

    /// Atomically read-modify-write the value and return the closure's
    /// result.
    ///
    /// The closure runs under the observable's lock, so check-then-set
    /// sequences inside it cannot interleave with other writers.
    /// Subscribers are notified after the lock is released, and only if the
    /// value changed.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, changed) = {
            let mut inner = lock(&self.inner);
            let old = inner.value.clone();
            let result = f(&mut inner.value);
            let changed = inner.value != old;
            if changed {
                inner.version += 1;
            }
            (result, changed)
        };
        if changed {
            self.notify();
        }
        result
    }

    /// Subscribe to value changes. The callback is invoked with a reference
    /// to the new value each time it changes.
    ///
    /// Returns a [`Subscription`] guard. Dropping the guard unsubscribes
    /// the callback (it will not be called after drop, though it may still
    /// be in the subscriber list until the next notification prunes it).
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let strong: CallbackArc<T> = Arc::new(callback);
        lock(&self.inner).subscribers.push(Arc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Current version number. Increments by 1 on each value-changing
    /// mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        lock(&self.inner).version
    }

    /// Number of currently registered subscribers (including dead ones
    /// not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// A read-only handle onto this observable.
    #[must_use]
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly {
            source: self.clone(),
        }
    }

    /// Notify live subscribers and prune dead ones.
    fn notify(&self) {
        // Collect live callbacks and the value to publish, then release the
        // lock before calling out.
        let (callbacks, value) = {
            let mut inner = lock(&self.inner);
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let callbacks: Vec<CallbackArc<T>> = inner
                .subscribers
                .iter()
                .filter_map(|w| w.upgrade())
                .collect();
            (callbacks, inner.value.clone())
        };

        for cb in &callbacks {
            cb(&value);
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Watchable<T> for Observable<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subscribe(callback)
    }
}

/// Read-only view of an [`Observable`].
///
/// Shares state with the observable it was made from; writes through the
/// original are visible here.
pub struct ReadOnly<T> {
    source: Observable<T>,
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.source).finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> ReadOnly<T> {
    /// A value that never changes.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Observable::new(value).read_only()
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.source.get()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.with(f)
    }

    /// Subscribe to value changes. See [`Observable::subscribe`].
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.source.subscribe(callback)
    }

    /// Current version number of the underlying observable.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.source.version()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Watchable<T> for ReadOnly<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subscribe(callback)
    }
}

impl<T: Clone + PartialEq + Send + 'static> From<Observable<T>> for ReadOnly<T> {
    fn from(source: Observable<T>) -> Self {
        Self { source }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::thread;

    fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        (Arc::clone(&count), count)
    }

    #[test]
    fn get_set_basic() {
        let obs = Observable::new(42);
        assert_eq!(obs.get(), 42);
        assert_eq!(obs.version(), 0);

        obs.set(99);
        assert_eq!(obs.get(), 99);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn no_change_no_version_bump() {
        let obs = Observable::new(42);
        obs.set(42);
        assert_eq!(obs.version(), 0);
    }

    #[test]
    fn update_mutates_in_place() {
        let obs = Observable::new(vec![1, 2, 3]);
        obs.update(|v| v.push(4));
        assert_eq!(obs.get(), vec![1, 2, 3, 4]);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn modify_returns_closure_result() {
        let obs = Observable::new(false);
        let won = obs.modify(|flag| {
            if *flag {
                false
            } else {
                *flag = true;
                true
            }
        });
        assert!(won);
        assert!(obs.get());

        let won_again = obs.modify(|flag| !std::mem::replace(flag, true));
        assert!(!won_again);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn change_notification() {
        let obs = Observable::new(0);
        let (seen, count) = counter();

        let _sub = obs.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        obs.set(1);
        obs.set(2);
        obs.set(2); // Same value, no notification.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscriber_receives_new_value() {
        let obs = Observable::new(0u32);
        let (last_clone, last_seen) = counter();

        let _sub = obs.subscribe(move |val| last_clone.store(*val, Ordering::SeqCst));

        obs.set(42);
        assert_eq!(last_seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let obs = Observable::new(0);
        let (seen, count) = counter();

        let sub = obs.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        obs.set(1);
        drop(sub);
        obs.set(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_count_prunes_lazily() {
        let obs = Observable::new(0);
        let _s1 = obs.subscribe(|_| {});
        let s2 = obs.subscribe(|_| {});
        assert_eq!(obs.subscriber_count(), 2);

        drop(s2);
        // Dead subscriber not yet pruned.
        assert_eq!(obs.subscriber_count(), 2);

        obs.set(1);
        assert_eq!(obs.subscriber_count(), 1);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let obs = Observable::new(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = ['A', 'B', 'C']
            .into_iter()
            .map(|tag| {
                let log = Arc::clone(&log);
                obs.subscribe(move |_| log.lock().unwrap().push(tag))
            })
            .collect();

        obs.set(1);
        assert_eq!(*log.lock().unwrap(), vec!['A', 'B', 'C']);
        drop(subs);
    }

    #[test]
    fn subscriber_may_write_back() {
        // Callbacks run without the lock held, so writing from one is legal.
        let obs = Observable::new(0);
        let writer = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v == 1 {
                writer.set(2);
            }
        });
        obs.set(1);
        assert_eq!(obs.get(), 2);
        assert_eq!(obs.version(), 2);
    }

    #[test]
    fn read_only_tracks_source() {
        let obs = Observable::new(1);
        let ro = obs.read_only();
        let (seen, count) = counter();
        let _sub = ro.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        obs.set(5);
        assert_eq!(ro.get(), 5);
        assert_eq!(ro.version(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constant_never_changes() {
        let ro = ReadOnly::constant(true);
        assert!(ro.get());
        assert_eq!(ro.version(), 0);
    }

    #[test]
    fn debug_format() {
        let obs = Observable::new(42);
        let dbg = format!("{obs:?}");
        assert!(dbg.contains("Observable"));
        assert!(dbg.contains("42"));
        assert!(dbg.contains("version"));
    }

    #[test]
    fn concurrent_modify_is_atomic() {
        // Exactly one of many racing check-then-set attempts may win.
        let obs = Observable::new(false);
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let obs = obs.clone();
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    let won = obs.modify(|taken| !std::mem::replace(taken, true));
                    if won {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn many_set_calls_version_monotonic() {
        let obs = Observable::new(0);
        for i in 1..=100 {
            obs.set(i);
        }
        assert_eq!(obs.version(), 100);
        assert_eq!(obs.get(), 100);
    }
}
