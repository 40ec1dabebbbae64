#![forbid(unsafe_code)]

//! Cold streams.
//!
//! # Design
//!
//! A [`Producer<T, E>`] is a recipe: a start closure that, given a
//! [`Sink`], begins emitting occurrences into it. Nothing runs until
//! [`Producer::start`] is called, and every call is an independent run with
//! its own sink and its own [`Disposable`] lifetime.
//!
//! The start closure may emit synchronously, hand the sink to another thread,
//! or stash it anywhere; the sink is `Send` and cheap to clone.
//!
//! # Invariants
//!
//! 1. Values reach the observer in the order they were sent.
//! 2. At most one terminal occurrence reaches the observer; anything sent
//!    after a terminal occurrence or after disposal is dropped.
//! 3. On a terminal occurrence the run's lifetime is disposed (running every
//!    cleanup) *before* the terminal occurrence is delivered, so an observer
//!    reacting to termination sees the run fully torn down.
//! 4. Disposal runs the cleanups exactly once, whether it comes from the
//!    consumer, from a terminal occurrence, or from both racing.
//!
//! # Failure Modes
//!
//! - **Re-entrant value send**: sending a value into a sink from inside that
//!   same sink's observer deadlocks (deliveries to one observer are
//!   serialised by a lock). Terminal sends from the observer are fine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::disposable::Disposable;
use crate::event::Event;
use crate::lock;

type ObserverFn<T, E> = Box<dyn FnMut(Event<T, E>) + Send>;
type StartFn<T, E> = dyn Fn(Sink<T, E>) + Send + Sync;

struct SinkInner<T, E> {
    observer: Mutex<Option<ObserverFn<T, E>>>,
    terminated: AtomicBool,
    lifetime: Disposable,
}

/// Producer-side handle for emitting into one run of a [`Producer`].
pub struct Sink<T, E> {
    inner: Arc<SinkInner<T, E>>,
}

impl<T, E> Clone for Sink<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> std::fmt::Debug for Sink<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("terminated", &self.inner.terminated.load(Ordering::Acquire))
            .field("lifetime", &self.inner.lifetime)
            .finish()
    }
}

impl<T: Send + 'static, E: Send + 'static> Sink<T, E> {
    fn new(observer: ObserverFn<T, E>, lifetime: Disposable) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                observer: Mutex::new(Some(observer)),
                terminated: AtomicBool::new(false),
                lifetime,
            }),
        }
    }

    /// Deliver an occurrence to the observer.
    pub fn send(&self, event: Event<T, E>) {
        if event.is_terminal() {
            if self.inner.terminated.swap(true, Ordering::AcqRel)
                || self.inner.lifetime.is_disposed()
            {
                trace!(kind = event.kind(), "dropping terminal after end of run");
                return;
            }
            self.inner.lifetime.dispose();
            // Waits for any in-flight value delivery, then takes the
            // observer so nothing can follow the terminal occurrence.
            let observer = lock(&self.inner.observer).take();
            if let Some(mut observer) = observer {
                observer(event);
            }
        } else {
            if self.is_disposed() {
                trace!("dropping value after end of run");
                return;
            }
            let mut observer = lock(&self.inner.observer);
            if let Some(observer) = observer.as_mut() {
                observer(event);
            }
        }
    }

    /// Deliver a value.
    pub fn send_value(&self, value: T) {
        self.send(Event::Value(value));
    }

    /// Terminate with an error.
    pub fn send_failed(&self, error: E) {
        self.send(Event::Failed(error));
    }

    /// Terminate successfully.
    pub fn send_completed(&self) {
        self.send(Event::Completed);
    }

    /// Register a cleanup to run when the run ends (terminal occurrence or
    /// consumer disposal). Runs immediately if the run already ended.
    pub fn on_dispose(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.inner.lifetime.add(cleanup);
    }

    /// Whether the run has ended. Producers doing long work should poll
    /// this and stop early.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire) || self.inner.lifetime.is_disposed()
    }
}

/// A cold stream of `T` values that may fail with `E`.
///
/// Cloning is cheap and yields the same recipe.
pub struct Producer<T, E> {
    start: Arc<StartFn<T, E>>,
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            start: Arc::clone(&self.start),
        }
    }
}

impl<T, E> std::fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer").finish_non_exhaustive()
    }
}

impl<T: Send + 'static, E: Send + 'static> Producer<T, E> {
    /// Build a producer from its start closure.
    pub fn new(start: impl Fn(Sink<T, E>) + Send + Sync + 'static) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// A producer that never emits and never terminates.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_| {})
    }

    /// A producer that completes immediately without values.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|sink| sink.send_completed())
    }

    /// Start a new run. The observer receives every occurrence of this run;
    /// the returned handle cancels it.
    pub fn start(&self, observer: impl FnMut(Event<T, E>) + Send + 'static) -> Disposable {
        let lifetime = Disposable::new();
        let sink = Sink::new(Box::new(observer), lifetime.clone());
        (self.start)(sink);
        lifetime
    }

    /// Transform every value.
    #[must_use]
    pub fn map<U: Send + 'static>(&self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Producer<U, E> {
        let source = self.clone();
        let f = Arc::new(f);
        Producer::new(move |sink: Sink<U, E>| {
            let f = Arc::clone(&f);
            let downstream = sink.clone();
            let upstream = source.start(move |event| downstream.send(event.map(|v| f(v))));
            sink.on_dispose(move || upstream.dispose());
        })
    }

    /// Transform the error.
    #[must_use]
    pub fn map_err<F: Send + 'static>(
        &self,
        f: impl Fn(E) -> F + Send + Sync + 'static,
    ) -> Producer<T, F> {
        let source = self.clone();
        let f = Arc::new(f);
        Producer::new(move |sink: Sink<T, F>| {
            let f = Arc::clone(&f);
            let downstream = sink.clone();
            let upstream = source.start(move |event| downstream.send(event.map_err(|e| f(e))));
            sink.on_dispose(move || upstream.dispose());
        })
    }

    /// Observe every occurrence as it passes through, without altering it.
    #[must_use]
    pub fn on_event(&self, f: impl Fn(&Event<T, E>) + Send + Sync + 'static) -> Self {
        let source = self.clone();
        let f = Arc::new(f);
        Producer::new(move |sink: Sink<T, E>| {
            let f = Arc::clone(&f);
            let downstream = sink.clone();
            let upstream = source.start(move |event| {
                f(&event);
                downstream.send(event);
            });
            sink.on_dispose(move || upstream.dispose());
        })
    }
}

impl<T: Clone + Send + Sync + 'static, E: Send + 'static> Producer<T, E> {
    /// A producer that emits one value and completes.
    #[must_use]
    pub fn value(value: T) -> Self {
        Self::new(move |sink| {
            sink.send_value(value.clone());
            sink.send_completed();
        })
    }

    /// A producer that emits each value in order and completes.
    #[must_use]
    pub fn from_values(values: Vec<T>) -> Self {
        Self::new(move |sink| {
            for value in &values {
                if sink.is_disposed() {
                    return;
                }
                sink.send_value(value.clone());
            }
            sink.send_completed();
        })
    }
}

impl<T: Send + 'static, E: Clone + Send + Sync + 'static> Producer<T, E> {
    /// A producer that fails immediately.
    #[must_use]
    pub fn failed(error: E) -> Self {
        Self::new(move |sink| sink.send_failed(error.clone()))
    }
}
