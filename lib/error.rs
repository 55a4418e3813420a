//! Errors reported by [`BlockingMap`](crate::cache::blocking::BlockingMap) operations.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single map operation.
///
/// Every variant is local to the failing call. The map is never left half-updated by a call that
/// returns one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The caller passed an argument the map cannot accept (e.g. a negative capacity).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait expired before a value was published for the key.
    #[error("Timed out after {0:?} waiting for a value")]
    Timeout(Duration),

    /// The wait was cancelled through its [`CancelToken`](crate::cancel::CancelToken).
    #[error("Wait was cancelled")]
    Cancelled,
}

impl MapError {
    /// Returns `true` for [`MapError::Timeout`]. Timeouts are expected and usually retried.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` for [`MapError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
