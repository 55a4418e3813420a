//! Cooperative cancellation for threads blocked in the map.
//!
//! Rust threads cannot be interrupted from the outside, so a blocking wait that must be abandonable
//! is started with a [`CancelToken`]. Calling [`CancelToken::cancel`] wakes every wait that was
//! started with that token (or any clone of it) and makes them return
//! [`MapError::Cancelled`](crate::error::MapError::Cancelled).
//!
//! A wait registers itself with the token for exactly as long as it is blocked. The registration is
//! a weak reference, so a token that outlives its waits keeps nothing alive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use rustc_hash::FxHashMap;
use tracing::debug;

/// Something blocked on a condition that a cancellation must break.
pub(crate) trait Interrupt: Send + Sync {
    /// Wake every thread blocked on `self` so it re-checks its cancellation token.
    fn interrupt(&self);
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<FxHashMap<u64, Weak<dyn Interrupt>>>,
}

/// Shared, cloneable cancellation signal for blocking waits.
///
/// Cancellation is one-way: once cancelled, a token stays cancelled, and every later wait started
/// with it fails immediately unless the value is already available.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("registered", &self.registered())
            .finish()
    }
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every current and future wait that uses this token.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        // Take the registrations out before interrupting so no waiter lock is ever taken while the
        // registry lock is held.
        let waiters = std::mem::take(
            &mut *self
                .inner
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(waiters = waiters.len(), "Cancelling blocked waits.");

        for waiter in waiters.into_values().filter_map(|w| w.upgrade()) {
            waiter.interrupt();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on this token or a clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Number of waits currently blocked through this token.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Register `waiter` to be interrupted on cancellation until the returned guard is dropped.
    ///
    /// Callers must check [`is_cancelled`](Self::is_cancelled) *after* registering, under the same
    /// lock that [`Interrupt::interrupt`] takes, or a cancellation racing the registration is lost.
    pub(crate) fn register(&self, waiter: Weak<dyn Interrupt>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, waiter);
        Registration { token: self, id }
    }
}

/// Removes a waiter from its token's registry when dropped.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token
            .inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
