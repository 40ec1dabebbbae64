#![forbid(unsafe_code)]

//! Guarded actions: serialised execution with broadcast outlets.
//!
//! # Design
//!
//! A [`GuardedAction`] pairs an executor (`Input → Producer<Output, E>`)
//! with a [`Gate`]. [`apply`](GuardedAction::apply) returns a cold
//! producer; starting it asks the gate for a [`Permit`](crate::Permit):
//!
//! - **Denied**: the consumer receives a single
//!   `Failed(ActionError::Disabled)` and nothing else happens.
//! - **Granted**: the executor's producer is started. Each of its
//!   occurrences is first published, unwrapped, on the action's outlets
//!   ([`events`](GuardedAction::events) and the matching projection), then
//!   relayed to the consumer with errors wrapped as
//!   [`ActionError::Failed`]. The permit is registered on the consumer's
//!   run lifetime, so the gate is released exactly once whether the run
//!   completes, fails, or is disposed by the consumer.
//!
//! Outlets are hot: they buffer nothing and belong to the action, not to any
//! run. They close (with `Completed`) exactly once, when the action is
//! dropped.
//!
//! # Invariants
//!
//! 1. At most one executor run is in flight per action.
//! 2. Calling `apply` without starting the result has no side effects.
//! 3. Every occurrence a granted run delivers reaches the outlets exactly
//!    once, before it reaches the consumer.
//! 4. Outlets never carry `Disabled`.
//! 5. `is_executing` reads `true` for as long as the executor's run is
//!    live, including while it is being torn down.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Span, debug, debug_span, trace};
use unitwork_reactive::{
    Computed, Disposable, Event, Producer, ReadOnly, Signal, SignalSender, Sink, Watchable,
};

use crate::config::ActionConfig;
use crate::error::ActionError;
use crate::gate::{Gate, Permit};

type ExecuteFn<I, O, E> = dyn Fn(I) -> Producer<O, E> + Send + Sync;

/// Sending halves of the broadcast outlets, owned by the action.
struct Outlets<O, E> {
    events: SignalSender<Event<O, E>, Infallible>,
    values: SignalSender<O, Infallible>,
    errors: SignalSender<E, Infallible>,
    completed: SignalSender<(), Infallible>,
}

impl<O: Clone, E: Clone> Outlets<O, E> {
    fn publish(&self, event: &Event<O, E>) {
        self.events.send_value(event.clone());
        match event {
            Event::Value(value) => self.values.send_value(value.clone()),
            Event::Failed(error) => self.errors.send_value(error.clone()),
            Event::Completed => self.completed.send_value(()),
        }
    }
}

impl<O, E> Outlets<O, E> {
    fn close(&self) {
        self.events.send_completed();
        self.values.send_completed();
        self.errors.send_completed();
        self.completed.send_completed();
    }
}

/// Holds a run's gate permit until the executor's run has been torn down.
struct RunGuard {
    state: Mutex<RunState>,
}

struct RunState {
    permit: Option<Permit>,
    /// The executor's run, once `start` has returned.
    run: Option<Disposable>,
    /// The run delivered its terminal occurrence and has torn itself down.
    finished: bool,
    /// The consumer's lifetime has ended.
    ended: bool,
}

impl RunGuard {
    fn new(permit: Permit) -> Self {
        Self {
            state: Mutex::new(RunState {
                permit: Some(permit),
                run: None,
                finished: false,
                ended: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_finished(&self) {
        self.lock().finished = true;
    }

    /// The consumer's lifetime ended: dispose the run, then release the gate.
    ///
    /// While the executor is still starting and the run has not finished,
    /// release is left to [`attach`](Self::attach).
    fn end(&self) {
        let (run, permit) = {
            let mut state = self.lock();
            state.ended = true;
            let run = state.run.take();
            let permit = if run.is_some() || state.finished {
                state.permit.take()
            } else {
                None
            };
            (run, permit)
        };
        if let Some(run) = run {
            run.dispose();
        }
        drop(permit);
    }

    /// Hand over the started run, tearing it down at once if the consumer's
    /// lifetime ended while it was starting.
    fn attach(&self, run: Disposable) {
        let permit = {
            let mut state = self.lock();
            if !state.ended {
                state.run = Some(run);
                return;
            }
            state.permit.take()
        };
        run.dispose();
        drop(permit);
    }
}

/// A unit of work that runs at most once at a time and broadcasts every
/// result.
///
/// # Example
///
/// ```
/// use unitwork::GuardedAction;
/// use unitwork::reactive::{Event, Producer};
/// use std::sync::{Arc, Mutex};
///
/// let double = GuardedAction::<i32, i32, String>::new(|n| Producer::value(n * 2));
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let log = Arc::clone(&seen);
/// double.apply(21).start(move |event| log.lock().unwrap().push(event));
///
/// assert_eq!(*seen.lock().unwrap(), vec![Event::Value(42), Event::Completed]);
/// ```
pub struct GuardedAction<I, O, E> {
    config: Arc<ActionConfig>,
    gate: Arc<Gate>,
    execute: Arc<ExecuteFn<I, O, E>>,
    outlets: Arc<Outlets<O, E>>,
    events: Signal<Event<O, E>, Infallible>,
    values: Signal<O, Infallible>,
    errors: Signal<E, Infallible>,
    completed: Signal<(), Infallible>,
}

impl<I, O, E> std::fmt::Debug for GuardedAction<I, O, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedAction")
            .field("name", &self.config.name)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<I, O, E> GuardedAction<I, O, E>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// An action that is enabled whenever it is not executing.
    pub fn new(execute: impl Fn(I) -> Producer<O, E> + Send + Sync + 'static) -> Self {
        Self::with_config(ActionConfig::default(), ReadOnly::constant(true), execute)
    }

    /// An action that is enabled whenever `enabled` is `true` and it is not
    /// executing.
    pub fn enabled_if<S>(
        enabled: S,
        execute: impl Fn(I) -> Producer<O, E> + Send + Sync + 'static,
    ) -> Self
    where
        S: Watchable<bool> + Clone + Send + Sync + 'static,
    {
        Self::with_config(ActionConfig::default(), enabled, execute)
    }

    /// An action whose enablement is derived from `state`, and whose
    /// executor receives the state current at the time the run starts.
    pub fn with_state<St, W>(
        state: &W,
        is_enabled: impl Fn(&St) -> bool + Send + Sync + 'static,
        execute: impl Fn(&St, I) -> Producer<O, E> + Send + Sync + 'static,
    ) -> Self
    where
        St: 'static,
        W: Watchable<St> + Clone + Send + Sync + 'static,
    {
        let enabled = Computed::map(state, is_enabled);
        let state = state.clone();
        Self::with_config(ActionConfig::default(), enabled, move |input| {
            execute(&state.current(), input)
        })
    }

    /// Fully specified constructor.
    pub fn with_config<S>(
        config: ActionConfig,
        enabled: S,
        execute: impl Fn(I) -> Producer<O, E> + Send + Sync + 'static,
    ) -> Self
    where
        S: Watchable<bool> + Clone + Send + Sync + 'static,
    {
        let (events, events_tx) = Signal::pipe();
        let (values, values_tx) = Signal::pipe();
        let (errors, errors_tx) = Signal::pipe();
        let (completed, completed_tx) = Signal::pipe();

        Self {
            config: Arc::new(config),
            gate: Arc::new(Gate::new(enabled)),
            execute: Arc::new(execute),
            outlets: Arc::new(Outlets {
                events: events_tx,
                values: values_tx,
                errors: errors_tx,
                completed: completed_tx,
            }),
            events,
            values,
            errors,
            completed,
        }
    }

    /// Prepare a run with `input`.
    ///
    /// Nothing happens until the returned producer is started. Each start
    /// is a separate attempt: it is either granted (and runs the executor)
    /// or fails immediately with [`ActionError::Disabled`].
    pub fn apply(&self, input: I) -> Producer<O, ActionError<E>> {
        let config = Arc::clone(&self.config);
        let gate = Arc::clone(&self.gate);
        let execute = Arc::clone(&self.execute);
        let outlets = Arc::clone(&self.outlets);

        Producer::new(move |sink: Sink<O, ActionError<E>>| {
            let span = debug_span!("guarded_action.apply", action = config.label());
            let _entered = span.enter();

            let Some(permit) = gate.permit() else {
                sink.send_failed(ActionError::Disabled);
                return;
            };
            let guard = Arc::new(RunGuard::new(permit));
            // Registered before the executor starts, so a run that
            // terminates synchronously still releases the gate.
            let teardown = Arc::clone(&guard);
            sink.on_dispose(move || teardown.end());

            let relay = sink.clone();
            let outlets = Arc::clone(&outlets);
            let finished = Arc::clone(&guard);
            let run_span: Span = span.clone();
            let run = execute(input.clone()).start(move |event: Event<O, E>| {
                let _entered = run_span.enter();
                trace!(kind = event.kind(), "relaying occurrence");
                outlets.publish(&event);
                if event.is_terminal() {
                    finished.mark_finished();
                }
                relay.send(event.map_err(ActionError::Failed));
            });
            guard.attach(run);
        })
    }

    /// Every occurrence of every granted run, unwrapped.
    #[must_use]
    pub fn events(&self) -> Signal<Event<O, E>, Infallible> {
        self.events.clone()
    }

    /// Values of every granted run.
    #[must_use]
    pub fn values(&self) -> Signal<O, Infallible> {
        self.values.clone()
    }

    /// Errors of every granted run, unwrapped.
    #[must_use]
    pub fn errors(&self) -> Signal<E, Infallible> {
        self.errors.clone()
    }

    /// One `()` per granted run that completed successfully.
    #[must_use]
    pub fn completed(&self) -> Signal<(), Infallible> {
        self.completed.clone()
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_executing(&self) -> ReadOnly<bool> {
        self.gate.is_executing()
    }

    /// Whether a started run would currently be granted.
    #[must_use]
    pub fn is_enabled(&self) -> Computed<bool> {
        self.gate.is_enabled()
    }

    /// Configured name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }
}

impl<I, O, E> Drop for GuardedAction<I, O, E> {
    fn drop(&mut self) {
        debug!(action = self.config.label(), "closing outlets");
        self.outlets.close();
    }
}
