//! Error types for channels and pipeline stages.

use std::fmt;
use thiserror::Error;

/// Boxed error returned by fallible stage functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from channel construction and closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Capacity below the minimum (one slot is always reserved).
    #[error("channel capacity must be at least {min}, got {capacity}")]
    CapacityTooSmall {
        /// The requested capacity.
        capacity: usize,
        /// The smallest accepted capacity.
        min: usize,
    },
    /// Channel is closed.
    #[error("channel is closed")]
    Closed,
}

/// Returned by [`Channel::push`](crate::Channel::push) when the channel no
/// longer accepts values. Carries the rejected value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq, Error)]
#[error("channel is closed")]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Recovers the value that could not be sent.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

/// Returned by [`Channel::try_push`](crate::Channel::try_push).
#[derive(Clone, Copy, PartialEq, Eq, Error)]
pub enum TrySendError<T> {
    /// No free slot right now.
    #[error("channel is full")]
    Full(T),
    /// The channel no longer accepts values.
    #[error("channel is closed")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Recovers the value that could not be sent.
    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }

    /// Returns `true` if the send may succeed later.
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Returned by [`Channel::try_pop`](crate::Channel::try_pop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryPopError {
    /// Nothing to read yet.
    #[error("channel is empty")]
    Empty,
    /// End of stream.
    #[error("channel is closed")]
    Closed,
}

/// A failure inside a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// A fallible stage function returned `Err`.
    #[error("stage {stage} failed: {source}")]
    Failed {
        /// Index of the failing stage, counted from the source.
        stage: usize,
        /// The error returned by the stage function.
        #[source]
        source: BoxError,
    },
    /// The stage function (or the stage's input) panicked.
    #[error("stage {stage} panicked: {message}")]
    Panicked {
        /// Index of the failing stage.
        stage: usize,
        /// The panic payload, if it was a string.
        message: String,
    },
    /// The worker thread could not be started.
    #[error("failed to spawn worker for stage {stage}: {source}")]
    Spawn {
        /// Index of the stage that never started.
        stage: usize,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// Index of the stage this error originated in.
    #[inline]
    pub fn stage(&self) -> usize {
        match self {
            Self::Failed { stage, .. } | Self::Panicked { stage, .. } | Self::Spawn { stage, .. } => {
                *stage
            }
        }
    }

    /// Returns `true` if the stage panicked.
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_returns_value() {
        let err = SendError(String::from("late"));
        assert_eq!(err.to_string(), "channel is closed");
        assert_eq!(err.into_inner(), "late");
    }

    #[test]
    fn test_try_send_error() {
        let full = TrySendError::Full(7);
        assert!(full.is_full());
        assert_eq!(full.into_inner(), 7);
        assert!(!TrySendError::Closed(1).is_full());
        assert_eq!(format!("{:?}", TrySendError::Closed(1)), "Closed(..)");
    }

    #[test]
    fn test_stage_error_display() {
        let err = StageError::Failed {
            stage: 2,
            source: "bad input".into(),
        };
        assert_eq!(err.stage(), 2);
        assert_eq!(err.to_string(), "stage 2 failed: bad input");
        assert!(std::error::Error::source(&err).is_some());

        let err = StageError::Panicked {
            stage: 0,
            message: "boom".into(),
        };
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "stage 0 panicked: boom");
    }
}
