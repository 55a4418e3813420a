//! Per-key single-assignment cell with blocking and async waiters.
//!
//! A [`Slot`] starts `Pending` (its value is `None`) and moves to `Resolved` exactly once. Threads
//! wait on a [`Condvar`] paired with the value mutex; tasks wait on a [`Notify`]. Both are signalled
//! by [`Slot::resolve`] after the value is written under the mutex, so a waiter that checks the value
//! and then suspends can never miss the transition.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::cancel::{CancelToken, Interrupt};
use crate::error::MapError;

pub(crate) struct Slot<V> {
    value: Mutex<Option<V>>,
    ready: Condvar,
    notify: Notify,
}

impl<V: Clone> Slot<V> {
    /// A slot with no value yet.
    pub(crate) fn pending() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// A slot that is already resolved to `value`.
    pub(crate) fn resolved(value: V) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<V>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `value` and wake every waiter.
    ///
    /// Returns `Err(value)` without touching the slot if it was already resolved.
    pub(crate) fn resolve(&self, value: V) -> Result<(), V> {
        {
            let mut guard = self.lock();
            if guard.is_some() {
                return Err(value);
            }
            *guard = Some(value);
            self.ready.notify_all();
        }
        self.notify.notify_waiters();
        Ok(())
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.lock().is_some()
    }

    /// Clone the value out if the slot is resolved. Never blocks on resolution.
    pub(crate) fn peek(&self) -> Option<V> {
        self.lock().clone()
    }

    /// Block the current thread until the slot is resolved.
    pub(crate) fn wait(&self) -> V {
        let mut guard = self.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return value.clone();
            }
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Suspend the current task until the slot is resolved.
    pub(crate) async fn wait_async(&self) -> V {
        loop {
            let notified = self.notify.notified();
            let mut notified = std::pin::pin!(notified);
            // Register interest before checking, so a resolve landing between the check and the
            // await still wakes us.
            notified.as_mut().enable();
            if let Some(value) = self.peek() {
                return value;
            }
            notified.await;
        }
    }
}

impl<V: Clone + Send + 'static> Slot<V> {
    /// Block until the slot resolves, `timeout` elapses, or `cancel` fires.
    ///
    /// A zero timeout never suspends: it returns the value if present and fails otherwise. A
    /// resolved value always wins over an expired timeout or a cancelled token.
    pub(crate) fn wait_for(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> Result<V, MapError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let _registration = cancel.map(|token| {
            let weak: Weak<dyn Interrupt> = Arc::downgrade(self) as Weak<dyn Interrupt>;
            token.register(weak)
        });

        let mut guard = self.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return Ok(value.clone());
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(MapError::Cancelled);
            }

            guard = match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(MapError::Timeout(timeout));
                    }
                    self.ready
                        .wait_timeout(guard, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                // Either no timeout, or one so large the deadline overflows `Instant`.
                _ => self
                    .ready
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

impl<V: Send> Interrupt for Slot<V> {
    fn interrupt(&self) {
        // Taking the lock orders this wake-up after any waiter's cancellation check.
        let _guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        self.ready.notify_all();
    }
}
