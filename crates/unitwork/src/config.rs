#![forbid(unsafe_code)]

//! Construction-time options for [`GuardedAction`](crate::GuardedAction).

/// Options applied when building a [`GuardedAction`](crate::GuardedAction).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionConfig {
    /// Name recorded on every tracing span the action opens.
    /// Default: `None` (spans record `"anonymous"`).
    pub name: Option<String>,
}

impl ActionConfig {
    /// Set the action name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}
