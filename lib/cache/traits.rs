//! Read-side traits so callers can be generic over the store they wait on.

use std::hash::Hash;
use std::time::Duration;

use crate::error::MapError;

/// Non-blocking read access: only values that are already available are returned.
pub trait SyncReadableCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns the value for `key` if it is available right now.
    fn get(&self, key: &K) -> Option<V>;

    /// Returns `true` if a value for `key` is available right now.
    fn contains(&self, key: &K) -> bool;
}

/// Read access that suspends the calling thread until a value is published.
pub trait BlockingReadableCache<K, V>: SyncReadableCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Block until a value for `key` is published and return it.
    fn wait(&self, key: &K) -> V;

    /// Block until a value for `key` is published or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Timeout`] when `timeout` elapses first.
    fn wait_timeout(&self, key: &K, timeout: Duration) -> Result<V, MapError>;
}
