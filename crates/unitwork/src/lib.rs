#![forbid(unsafe_code)]

//! Guarded units of work.
//!
//! # Role in unitwork
//! `unitwork` wraps an input-driven computation so that it runs at most once
//! at a time, however many callers invoke it, and fans every result out to
//! shared broadcast outlets.
//!
//! # Primary responsibilities
//! - **Gate**: atomic grant/deny of a run, plus the derived `is_enabled`.
//! - **GuardedAction**: owns a gate, an executor and the outlets; `apply`
//!   returns a cold producer per call.
//! - **ActionError**: `Disabled` versus the executor's own `Failed(E)`.
//!
//! # How it fits in the system
//! Streams, observables and signals come from `unitwork-reactive`, re-exported
//! here as [`reactive`]. Logging goes through `tracing`; the library installs
//! no subscriber.

pub mod action;
pub mod config;
pub mod error;
pub mod gate;

pub use action::GuardedAction;
pub use config::ActionConfig;
pub use error::ActionError;
pub use gate::{Gate, Permit};

pub use unitwork_reactive as reactive;
