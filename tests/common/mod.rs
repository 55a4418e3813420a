#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use blocking_map::BlockingMap;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber filtered by `BLOCKING_MAP_LOG`, falling back to `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("BLOCKING_MAP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// Spawn a thread that sleeps for `delay` and then publishes `value` under `key`.
pub fn put_after(
    map: &Arc<BlockingMap<String, String>>,
    delay: Duration,
    key: &str,
    value: &str,
) -> JoinHandle<()> {
    let map = Arc::clone(map);
    let key = key.to_owned();
    let value = value.to_owned();
    thread::spawn(move || {
        thread::sleep(delay);
        map.put(key, value);
    })
}

/// Spin until `map` holds `expected` keys, or panic after roughly a second.
pub fn wait_for_len<K, V>(map: &BlockingMap<K, V>, expected: usize)
where
    K: Eq + std::hash::Hash + std::fmt::Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    for _ in 0..200 {
        if map.len() == expected {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("map did not reach {expected} keys within 1 second");
}

pub fn s(value: &str) -> String {
    value.to_owned()
}
