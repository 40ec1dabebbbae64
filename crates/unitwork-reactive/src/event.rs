#![forbid(unsafe_code)]

//! Stream occurrences.

/// A single occurrence emitted by a [`Producer`](crate::Producer) or a
/// [`Signal`](crate::Signal).
///
/// `Value` may repeat; `Failed` and `Completed` are terminal and end the
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    /// An intermediate value.
    Value(T),
    /// Terminal failure.
    Failed(E),
    /// Terminal successful completion.
    Completed,
}

impl<T, E> Event<T, E> {
    /// Whether this occurrence ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    /// The carried value, if this is a `Value`.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The carried error, if this is a `Failed`.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Transform the value, leaving terminal occurrences untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U, E> {
        match self {
            Self::Value(v) => Event::Value(f(v)),
            Self::Failed(e) => Event::Failed(e),
            Self::Completed => Event::Completed,
        }
    }

    /// Transform the error, leaving values and completion untouched.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Event<T, F> {
        match self {
            Self::Value(v) => Event::Value(v),
            Self::Failed(e) => Event::Failed(f(e)),
            Self::Completed => Event::Completed,
        }
    }

    /// Short name of the occurrence kind, for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Failed(_) => "failed",
            Self::Completed => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(!Event::<i32, ()>::Value(1).is_terminal());
        assert!(Event::<i32, ()>::Failed(()).is_terminal());
        assert!(Event::<i32, ()>::Completed.is_terminal());
    }

    #[test]
    fn map_only_touches_values() {
        let ev: Event<i32, &str> = Event::Value(2);
        assert_eq!(ev.map(|v| v * 10), Event::Value(20));

        let ev: Event<i32, &str> = Event::Failed("x");
        assert_eq!(ev.map(|v| v * 10), Event::Failed("x"));
    }

    #[test]
    fn map_err_only_touches_errors() {
        let ev: Event<i32, &str> = Event::Failed("x");
        assert_eq!(ev.map_err(str::len), Event::Failed(1));

        let ev: Event<i32, &str> = Event::Completed;
        assert_eq!(ev.map_err(str::len), Event::Completed);
    }

    #[test]
    fn accessors() {
        let ev: Event<i32, &str> = Event::Value(7);
        assert_eq!(ev.value(), Some(&7));
        assert_eq!(ev.error(), None);
        assert_eq!(ev.kind(), "value");
        assert_eq!(Event::<i32, &str>::Failed("e").error(), Some(&"e"));
    }
}
