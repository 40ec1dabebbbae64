#![forbid(unsafe_code)]

//! Errors reported to callers of [`GuardedAction::apply`](crate::GuardedAction::apply).

use std::fmt;

/// Why an applied action did not produce its result.
///
/// Equality holds iff both sides are `Disabled`, or both are `Failed`
/// wrapping equal inner errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionError<E> {
    /// The action was not enabled when the run started: either the
    /// enablement source was `false` or another run was in flight.
    Disabled,
    /// The executor's own run failed with this error.
    Failed(E),
}

impl<E> ActionError<E> {
    /// Whether this is [`ActionError::Disabled`].
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// The executor's error, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Disabled => None,
        }
    }

    /// Consume and return the executor's error, if any.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Disabled => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ActionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "action is disabled"),
            Self::Failed(e) => write!(f, "action failed: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ActionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Disabled => None,
        }
    }
}
