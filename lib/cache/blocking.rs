//! Concurrent map whose reads block until a value for the key is published.
//!
//! Each key maps to a shared [`Slot`]. `get` fetches or atomically creates the slot for its key and
//! then waits on that exact slot object; `put` resolves (or replaces) the slot under the same map
//! entry lock. Because the waiter captures the slot before suspending and the slot checks its value
//! under its own mutex, a producer can never publish "between" a reader's check and its wait.
//!
//! Lock order is always map bucket, then slot. Waiters hold only the slot lock while suspended, so
//! operations on other keys (and non-blocking operations on the same key) are never held up by them.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use scc::hash_map::Entry;
use tracing::{debug, trace};

use super::slot::Slot;
use super::traits::{BlockingReadableCache, SyncReadableCache};
use crate::cancel::CancelToken;
use crate::config::{MAX_INITIAL_CAPACITY, MapConfig, OverwritePolicy};
use crate::error::MapError;

/// Thread-safe map with blocking, timed, cancellable and async reads.
///
/// Every key is either *pending* (someone is waiting, nobody has published yet) or *resolved*.
/// Pending keys are created by readers; resolved keys by writers or by a reader's key later being
/// published. Both count toward [`len`](Self::len).
pub struct BlockingMap<K, V> {
    map: scc::HashMap<K, Arc<Slot<V>>>,
    policy: OverwritePolicy,
}

impl<K, V> Default for BlockingMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            map: scc::HashMap::default(),
            policy: OverwritePolicy::default(),
        }
    }
}

impl<K, V> BlockingMap<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map with the default [`OverwritePolicy::Replace`] policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map sized for roughly `capacity` keys.
    ///
    /// The capacity is a hint only; the map behaves exactly like [`new`](Self::new). Hints above
    /// [`MAX_INITIAL_CAPACITY`] are clamped to it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: scc::HashMap::with_capacity(capacity.min(MAX_INITIAL_CAPACITY)),
            policy: OverwritePolicy::default(),
        }
    }

    /// Create an empty map that applies `policy` when a resolved key is written again.
    #[must_use]
    pub fn with_policy(policy: OverwritePolicy) -> Self {
        Self {
            map: scc::HashMap::default(),
            policy,
        }
    }

    /// Build a map from a validated [`MapConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidArgument`] listing every validation failure, e.g. a negative
    /// `initial-capacity`.
    pub fn from_config(config: &MapConfig) -> Result<Self, MapError> {
        config
            .validate()
            .map_err(|errors| MapError::InvalidArgument(errors.join(" ")))?;

        let capacity = config
            .initial_capacity
            .map(usize::try_from)
            .transpose()
            .map_err(|e| MapError::InvalidArgument(format!("initial-capacity: {e}")))?;

        let mut map = match capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::new(),
        };
        map.policy = config.overwrite;
        debug!(?capacity, policy = ?config.overwrite, "Created blocking map from config.");
        Ok(map)
    }

    /// The policy applied when [`put`](Self::put) hits an already resolved key.
    #[must_use]
    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// Fetch the slot for `key`, creating a pending one if absent.
    ///
    /// Concurrent callers for the same absent key all observe the single slot inserted by the first.
    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        if let Some(slot) = self.map.read_sync(key, |_, slot| Arc::clone(slot)) {
            return slot;
        }
        match self.map.entry_sync(key.clone()) {
            Entry::Occupied(occ) => Arc::clone(occ.get()),
            Entry::Vacant(vac) => {
                trace!(?key, "Created pending slot.");
                let slot = Arc::new(Slot::pending());
                vac.insert_entry(Arc::clone(&slot));
                slot
            }
        }
    }

    /// Publish `value` for `key` and wake every thread and task waiting on it.
    ///
    /// If `key` is pending, its waiters observe `value`. If `key` is already resolved, the outcome
    /// depends on the map's [`OverwritePolicy`]: `Replace` swaps in a fresh slot holding `value`, so
    /// every later read observes it; `FirstWins` keeps the existing value.
    pub fn put(&self, key: K, value: V) {
        match self.map.entry_sync(key) {
            Entry::Occupied(mut occ) => {
                if let Err(value) = occ.get().resolve(value) {
                    match self.policy {
                        OverwritePolicy::Replace => {
                            *occ.get_mut() = Arc::new(Slot::resolved(value));
                        }
                        OverwritePolicy::FirstWins => {
                            trace!(key = ?occ.key(), "Key already resolved; keeping first value.");
                        }
                    }
                } else {
                    trace!(key = ?occ.key(), "Resolved pending slot.");
                }
            }
            Entry::Vacant(vac) => {
                vac.insert_entry(Arc::new(Slot::resolved(value)));
            }
        }
    }

    /// Publish `value` for `key` only if no value has been published yet.
    ///
    /// Pending keys are resolved (waking their waiters); resolved keys keep their value. Returns
    /// `true` if `value` was published.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        match self.map.entry_sync(key) {
            Entry::Occupied(occ) => occ.get().resolve(value).is_ok(),
            Entry::Vacant(vac) => {
                vac.insert_entry(Arc::new(Slot::resolved(value)));
                true
            }
        }
    }

    /// Return the value for `key`, blocking the current thread until one is published.
    ///
    /// If `key` is absent, a pending entry is created for it first.
    pub fn get(&self, key: &K) -> V {
        self.slot(key).wait()
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    ///
    /// A zero timeout returns immediately: with the value if it is available, with an error if not.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Timeout`] if no value was published within `timeout`.
    pub fn get_timeout(&self, key: &K, timeout: Duration) -> Result<V, MapError> {
        self.slot(key)
            .wait_for(Some(timeout), None)
            .inspect_err(|_| debug!(?key, ?timeout, "Timed out waiting for key."))
    }

    /// Like [`get`](Self::get), but can be abandoned through `token`, optionally bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Cancelled`] if `token` is cancelled before a value is published, and
    /// [`MapError::Timeout`] if `timeout` elapses first.
    pub fn get_cancellable(
        &self,
        key: &K,
        token: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<V, MapError> {
        self.slot(key)
            .wait_for(timeout, Some(token))
            .inspect_err(|e| debug!(?key, error = %e, "Wait for key ended without a value."))
    }

    /// Return the value for `key`, suspending the current task until one is published.
    ///
    /// Dropping the returned future abandons the wait.
    pub async fn get_async(&self, key: &K) -> V {
        let slot = self.slot(key);
        slot.wait_async().await
    }

    /// Like [`get_async`](Self::get_async), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Timeout`] if no value was published within `timeout`.
    pub async fn get_async_timeout(&self, key: &K, timeout: Duration) -> Result<V, MapError> {
        let slot = self.slot(key);
        if let Some(value) = slot.peek() {
            return Ok(value);
        }
        tokio::time::timeout(timeout, slot.wait_async())
            .await
            .map_err(|_| {
                debug!(?key, ?timeout, "Timed out waiting for key.");
                MapError::Timeout(timeout)
            })
    }

    /// Return the value for `key` if it is available. Never blocks and never creates an entry.
    #[must_use]
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.map.read_sync(key, |_, slot| slot.peek()).flatten()
    }

    /// Returns `true` if the map holds no keys, pending or resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if `key` has a published value. Never blocks and never creates an entry.
    #[must_use]
    pub fn is_available(&self, key: &K) -> bool {
        self.map
            .read_sync(key, |_, slot| slot.is_resolved())
            .unwrap_or(false)
    }

    /// Call `action` once for every resolved entry.
    ///
    /// The entries are snapshotted first, then `action` runs without any internal lock held, so it
    /// may freely call back into the map. Pending keys are skipped. Keys resolved while the snapshot
    /// is being taken may or may not be included; keys resolved after this call returns never are.
    /// Each key is reported at most once, even if a concurrent resize makes the scan revisit it.
    pub fn for_each_available(&self, mut action: impl FnMut(&K, &V)) {
        let mut snapshot = FxHashMap::default();
        self.map.iter_sync(|key, slot| {
            if let Some(value) = slot.peek() {
                snapshot.insert(key.clone(), value);
            }
            true
        });
        for (key, value) in &snapshot {
            action(key, value);
        }
    }

    /// Remove `key` regardless of its state, returning its value if it was resolved.
    ///
    /// Threads already waiting on a removed pending key stay attached to the detached entry: they
    /// return only through a timeout or cancellation. Later reads of `key` start from a fresh entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove_sync(key).and_then(|(_, slot)| slot.peek())
    }

    /// Remove every resolved entry, leaving pending ones in place. Returns how many were removed.
    ///
    /// Each entry is judged against its own state at the moment it is visited.
    pub fn remove_completed(&self) -> usize {
        let mut removed = 0;
        self.map.retain_sync(|_, slot| {
            let keep = !slot.is_resolved();
            if !keep {
                removed += 1;
            }
            keep
        });
        trace!(removed, "Removed completed entries.");
        removed
    }

    /// Number of keys in the map, pending and resolved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Snapshot of every key in the map, pending and resolved.
    #[must_use]
    pub fn keys(&self) -> HashSet<K> {
        let mut keys = HashSet::with_capacity(self.map.len());
        self.map.iter_sync(|key, _| {
            keys.insert(key.clone());
            true
        });
        keys
    }
}

impl<K, V> From<HashMap<K, V>> for BlockingMap<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a map in which every entry of `initial` is already resolved.
    fn from(initial: HashMap<K, V>) -> Self {
        initial.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for BlockingMap<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let map = Self::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            map.put(key, value);
        }
        map
    }
}

impl<K, V> SyncReadableCache<K, V> for BlockingMap<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.try_get(key)
    }

    fn contains(&self, key: &K) -> bool {
        self.is_available(key)
    }
}

impl<K, V> BlockingReadableCache<K, V> for BlockingMap<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn wait(&self, key: &K) -> V {
        BlockingMap::get(self, key)
    }

    fn wait_timeout(&self, key: &K, timeout: Duration) -> Result<V, MapError> {
        self.get_timeout(key, timeout)
    }
}
