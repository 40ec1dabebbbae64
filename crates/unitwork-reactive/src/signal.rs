#![forbid(unsafe_code)]

//! Hot broadcast streams.
//!
//! # Design
//!
//! A [`Signal<T, E>`] is the receiving end of a fan-out channel; its
//! [`SignalSender`] is the single writing end. Every occurrence sent is
//! delivered by reference to every observer live at that moment. Nothing is
//! buffered: an observer registered later never sees earlier values.
//!
//! The sender exclusively owns the right to close the signal. A terminal
//! occurrence (or dropping the sender, which sends [`Event::Completed`])
//! closes it exactly once; observers registered after closure receive the
//! terminal occurrence immediately.
//!
//! # Invariants
//!
//! 1. Observers are invoked in registration order, with no internal lock
//!    held.
//! 2. At most one terminal occurrence is ever delivered to any observer.
//! 3. Dropping a [`Subscription`] stops delivery to that observer before the
//!    next occurrence.

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::event::Event;
use crate::lock;
use crate::subscription::Subscription;

type ObserverArc<T, E> = Arc<dyn Fn(&Event<T, E>) + Send + Sync>;
type ObserverWeak<T, E> = Weak<dyn Fn(&Event<T, E>) + Send + Sync>;

struct SignalState<T, E> {
    observers: Vec<ObserverWeak<T, E>>,
    /// Set once, when the signal closes.
    terminal: Option<Arc<Event<T, E>>>,
}

/// Receiving end of a hot broadcast stream.
///
/// Cloning yields another handle onto the same stream.
pub struct Signal<T, E> {
    state: Arc<Mutex<SignalState<T, E>>>,
}

impl<T, E> Clone for Signal<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> std::fmt::Debug for Signal<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Signal")
            .field("observer_count", &state.observers.len())
            .field("closed", &state.terminal.is_some())
            .finish()
    }
}

/// Writing end of a [`Signal`]. Closes the signal with
/// [`Event::Completed`] when dropped.
pub struct SignalSender<T, E> {
    state: Arc<Mutex<SignalState<T, E>>>,
}

impl<T, E> std::fmt::Debug for SignalSender<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSender").finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
    /// Create a connected signal and sender.
    #[must_use]
    pub fn pipe() -> (Self, SignalSender<T, E>) {
        let state = Arc::new(Mutex::new(SignalState {
            observers: Vec::new(),
            terminal: None,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            SignalSender { state },
        )
    }

    /// Observe every occurrence from now on.
    ///
    /// If the signal is already closed, the callback receives the terminal
    /// occurrence before this returns.
    pub fn observe(&self, callback: impl Fn(&Event<T, E>) + Send + Sync + 'static) -> Subscription {
        let strong: ObserverArc<T, E> = Arc::new(callback);
        let terminal = {
            let mut state = lock(&self.state);
            let terminal = state.terminal.clone();
            if terminal.is_none() {
                state.observers.push(Arc::downgrade(&strong));
            }
            terminal
        };
        if let Some(terminal) = terminal {
            strong(&*terminal);
        }
        Subscription::new(strong)
    }

    /// Observe values only.
    pub fn observe_values(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.observe(move |event| {
            if let Event::Value(value) = event {
                callback(value);
            }
        })
    }

    /// Whether the signal has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).terminal.is_some()
    }

    /// Number of registered observers (including dropped ones not yet
    /// pruned).
    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock(&self.state).observers.len()
    }
}

impl<T, E> SignalSender<T, E> {
    /// Broadcast an occurrence to every live observer.
    ///
    /// A terminal occurrence closes the signal; anything sent afterwards is
    /// dropped.
    pub fn send(&self, event: Event<T, E>) {
        let (observers, terminal) = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                trace!(kind = event.kind(), "dropping occurrence on closed signal");
                return;
            }
            state.observers.retain(|w| w.strong_count() > 0);
            let observers: Vec<ObserverArc<T, E>> =
                state.observers.iter().filter_map(|w| w.upgrade()).collect();
            if event.is_terminal() {
                let terminal = Arc::new(event);
                state.terminal = Some(Arc::clone(&terminal));
                state.observers.clear();
                (observers, Ok(terminal))
            } else {
                (observers, Err(event))
            }
        };

        match terminal {
            Ok(terminal) => {
                for observer in &observers {
                    observer(&*terminal);
                }
            }
            Err(event) => {
                for observer in &observers {
                    observer(&event);
                }
            }
        }
    }

    /// Broadcast a value.
    pub fn send_value(&self, value: T) {
        self.send(Event::Value(value));
    }

    /// Close the signal with an error.
    pub fn send_failed(&self, error: E) {
        self.send(Event::Failed(error));
    }

    /// Close the signal successfully.
    pub fn send_completed(&self) {
        self.send(Event::Completed);
    }
}

impl<T, E> Drop for SignalSender<T, E> {
    fn drop(&mut self) {
        self.send(Event::Completed);
    }
}
