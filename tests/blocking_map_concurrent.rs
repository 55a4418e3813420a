#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use blocking_map::BlockingMap;
use common::{init_tracing, put_after, s};
use proptest::prelude::*;

#[test]
fn end_to_end_put_wakes_timed_get() {
    init_tracing();
    let map = Arc::new(BlockingMap::<String, String>::new());
    let started = Instant::now();
    let producer = put_after(&map, Duration::from_millis(100), "k", "v");

    let value = map.get_timeout(&s("k"), Duration::from_secs(1)).unwrap();

    assert_eq!(value, "v");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "get should return as soon as the value is published"
    );
    producer.join().unwrap();
}

#[test]
fn every_waiter_on_a_key_is_woken() {
    let map = Arc::new(BlockingMap::<u64, String>::new());
    let barrier = Arc::new(Barrier::new(17));

    let waiters: Vec<_> = (0..16)
        .map(|_| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                map.get(&7)
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(20));
    map.put(7, s("broadcast"));

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), "broadcast");
    }
    assert_eq!(map.len(), 1, "all waiters must share one entry");
}

#[test]
fn concurrent_puts_to_one_key_pick_a_single_winner() {
    let map = Arc::new(BlockingMap::<u64, u64>::new());
    let barrier = Arc::new(Barrier::new(8));

    let writers: Vec<_> = (0..8u64)
        .map(|i| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                map.put(0, i);
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let value = map.get(&0);
    assert!(value < 8, "value must be one of the written values, got {value}");
    assert_eq!(map.len(), 1);
}

#[test]
fn concurrent_put_if_absent_publishes_exactly_once() {
    let map = Arc::new(BlockingMap::<u64, u64>::new());
    let barrier = Arc::new(Barrier::new(8));

    let writers: Vec<_> = (0..8u64)
        .map(|i| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                map.put_if_absent(0, i)
            })
        })
        .collect();
    let winners = writers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1, "exactly one put_if_absent may publish");
}

#[test]
fn many_keys_many_threads() {
    let map = Arc::new(BlockingMap::<u64, u64>::with_capacity(64));

    let readers: Vec<_> = (0..64u64)
        .map(|k| {
            let map = Arc::clone(&map);
            thread::spawn(move || map.get_timeout(&k, Duration::from_secs(5)))
        })
        .collect();
    let writers: Vec<_> = (0..64u64)
        .map(|k| {
            let map = Arc::clone(&map);
            thread::spawn(move || map.put(k, k * 10))
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    for (k, reader) in (0..64u64).zip(readers) {
        assert_eq!(reader.join().unwrap(), Ok(k * 10), "key {k}");
    }
    assert_eq!(map.len(), 64);
}

#[test]
fn for_each_available_during_concurrent_puts() {
    let map = Arc::new(BlockingMap::<u64, u64>::new());
    for k in 0..100 {
        map.put(k, k);
    }
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let map = Arc::clone(&map);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for k in 100..1_000 {
                map.put(k, k);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        let mut seen = HashSet::new();
        map.for_each_available(|k, v| {
            assert_eq!(k, v, "values must never be torn");
            assert!(seen.insert(*k), "key {k} reported twice");
        });
        assert!(seen.len() >= 100, "pre-existing keys are always reported");
    }
    writer.join().unwrap();

    let mut count = 0;
    map.for_each_available(|_, _| count += 1);
    assert_eq!(count, 1_000);
}

#[test]
fn remove_completed_during_concurrent_waits() {
    let map = Arc::new(BlockingMap::<u64, u64>::new());
    let waiters: Vec<_> = (0..8u64)
        .map(|k| {
            let map = Arc::clone(&map);
            thread::spawn(move || map.get(&k))
        })
        .collect();
    common::wait_for_len(&map, 8);

    for k in 100..110 {
        map.put(k, k);
    }
    assert_eq!(map.remove_completed(), 10);
    assert_eq!(map.len(), 8, "pending entries survive");

    for k in 0..8 {
        map.put(k, k + 1);
    }
    for (k, waiter) in (0..8u64).zip(waiters) {
        assert_eq!(waiter.join().unwrap(), k + 1);
    }
}

#[test]
fn other_keys_are_not_blocked_by_waiters() {
    let map = Arc::new(BlockingMap::<u64, u64>::new());
    let _waiters: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            thread::spawn(move || map.get_timeout(&0, Duration::from_millis(500)))
        })
        .collect();
    common::wait_for_len(&map, 1);

    let started = Instant::now();
    for k in 1..1_000 {
        map.put(k, k);
        assert!(map.is_available(&k));
    }
    assert!(map.keys().len() >= 1_000);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "non-blocking operations must not wait on blocked readers"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A reader that starts waiting before the writer publishes is always woken.
    #[test]
    fn no_missed_wakeup(
        reader_delay_us in 0u64..500,
        writer_delay_us in 0u64..500,
        readers in 1usize..6,
        value in any::<u32>(),
    ) {
        let map = Arc::new(BlockingMap::<u8, u32>::new());

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    thread::sleep(Duration::from_micros(reader_delay_us));
                    map.get_timeout(&1, Duration::from_secs(5))
                })
            })
            .collect();

        thread::sleep(Duration::from_micros(writer_delay_us));
        map.put(1, value);

        for handle in handles {
            prop_assert_eq!(handle.join().unwrap(), Ok(value));
        }
        prop_assert_eq!(map.len(), 1);
    }
}
