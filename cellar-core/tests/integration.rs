//! Integration Tests for Stores
//!
//! These tests verify that writable, readable, and derived stores work
//! together through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use cellar_core::adapter::{bind_readable, derive_value};
use cellar_core::{
    batch, derived, derived_with, erase, get, readable, validate_store, writable, Cleanup,
    Readable, StoreError, StoreValue, Writable,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every value a store delivers.
fn record<R: Readable>(store: &R) -> (Arc<Mutex<Vec<R::Value>>>, cellar_core::Unsubscriber) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let unsubscriber = store.subscribe(move |value| sink.lock().push(value.clone()));
    (log, unsubscriber)
}

/// Subscribe, set, update, unsubscribe.
#[test]
fn set_and_update_are_logged_in_order() {
    init_tracing();
    let count = writable(0);
    let (log, unsubscriber) = record(&count);

    count.set(1);
    count.update(|v| v + 1);
    unsubscriber.unsubscribe();
    count.set(3);

    assert_eq!(*log.lock(), vec![0, 1, 2]);
}

/// A fresh subscriber to a derived sum sees the current total.
#[test]
fn derived_sum_follows_sources() {
    let a = writable(2);
    let b = writable(3);
    let sum = derived((a.clone(), b.clone()), |(x, y): &(i32, i32)| x + y);
    assert_eq!(get(&sum), 5);

    a.set(10);

    let (log, _unsubscriber) = record(&sum);
    assert_eq!(*log.lock(), vec![13]);
}

#[test]
fn validate_store_rejects_non_stores() {
    let store = erase(writable(1));

    assert!(validate_store(None, "s").is_ok());
    assert!(validate_store(Some(&store), "s").is_ok());
    assert_eq!(
        validate_store(Some(&5), "s"),
        Err(StoreError::NotAStore {
            name: "s".to_string()
        })
    );
}

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    n: i32,
}

impl StoreValue for Counter {}

/// Structured values always count as changed, even when equal.
#[test]
fn structured_value_notifies_on_equal_set() {
    let store = writable(Counter { n: 1 });
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();
    let _unsubscriber = store.subscribe(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    let mut value = get(&store);
    value.n = 2;
    store.set(value);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(get(&store), Counter { n: 2 });
}

#[test]
fn equal_primitive_set_is_a_no_op() {
    let store = writable(4);
    let (log, _unsubscriber) = record(&store);

    store.set(4);
    store.set(5);
    store.set(5);

    assert_eq!(*log.lock(), vec![4, 5]);
}

/// Start and stop run once per transition across several rounds.
#[test]
fn start_stop_once_per_transition() {
    let starts = Arc::new(AtomicI32::new(0));
    let stops = Arc::new(AtomicI32::new(0));
    let (starts_clone, stops_clone) = (starts.clone(), stops.clone());

    let store = Writable::with_start(0, move |_| {
        starts_clone.fetch_add(1, Ordering::SeqCst);
        let stops = stops_clone.clone();
        Some(Box::new(move || {
            stops.fetch_add(1, Ordering::SeqCst);
        }) as Cleanup)
    });

    for round in 1..=3 {
        let first = store.subscribe(|_| {});
        let second = store.subscribe(|_| {});
        assert_eq!(starts.load(Ordering::SeqCst), round);

        drop(first);
        assert_eq!(stops.load(Ordering::SeqCst), round - 1);
        drop(second);
        assert_eq!(stops.load(Ordering::SeqCst), round);
    }
}

#[test]
fn unsubscribe_is_idempotent() {
    let stops = Arc::new(AtomicI32::new(0));
    let stops_clone = stops.clone();
    let store = readable(0, move |_| {
        let stops = stops_clone.clone();
        Some(Box::new(move || {
            stops.fetch_add(1, Ordering::SeqCst);
        }) as Cleanup)
    });

    let other = store.subscribe(|_| {});
    let unsubscriber = store.subscribe(|_| {});
    unsubscriber.unsubscribe();
    unsubscriber.unsubscribe();
    assert_eq!(store.subscriber_count(), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 0);

    drop(unsubscriber);
    drop(other);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[test]
fn derived_over_no_sources_runs_once() {
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();
    let store = derived(Vec::<Writable<i32>>::new(), move |values: &Vec<i32>| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        values.len()
    });

    let subscriptions: Vec<_> = (0..3).map(|_| store.subscribe(|_| {})).collect();
    drop(subscriptions);

    assert_eq!(get(&store), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Two sources set in one batch cause one recomputation.
#[test]
fn batched_sets_recompute_once() {
    init_tracing();
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();
    let a = writable(1);
    let b = writable(2);
    let sum = derived((a.clone(), b.clone()), move |(x, y): &(i32, i32)| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        x + y
    });
    let (log, _unsubscriber) = record(&sum);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    batch(|| {
        a.set(10);
        b.set(20);
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*log.lock(), vec![3, 30]);
}

#[test]
fn unbatched_sets_recompute_per_set() {
    let a = writable(1);
    let b = writable(2);
    let sum = derived((a.clone(), b.clone()), |(x, y): &(i32, i32)| x + y);
    let (log, _unsubscriber) = record(&sum);

    a.set(10);
    b.set(20);

    assert_eq!(*log.lock(), vec![3, 12, 30]);
}

/// A derived store can drive another derived store.
#[test]
fn derived_chain_stays_lazy() {
    let source = writable(1);
    let plus_one = derived(source.clone(), |n: &i32| n + 1);
    let label = derived(plus_one.clone(), |n: &i32| format!("#{n}"));

    assert_eq!(source.subscriber_count(), 0);
    let (log, unsubscriber) = record(&label);
    assert_eq!(source.subscriber_count(), 1);
    assert!(plus_one.is_active());

    source.set(4);
    unsubscriber.unsubscribe();

    assert_eq!(*log.lock(), vec!["#2".to_string(), "#5".to_string()]);
    assert_eq!(source.subscriber_count(), 0);
    assert!(!plus_one.is_active());
}

/// An imperative derived store filters values and keeps the last accepted one.
#[test]
fn imperative_derived_filters() {
    let source = writable(0);
    let evens = derived_with(
        source.clone(),
        |n: &i32, set| {
            if n % 2 == 0 {
                set.set(*n);
            }
            None
        },
        -1,
    );
    let (log, _unsubscriber) = record(&evens);

    for n in 1..=4 {
        source.set(n);
    }

    assert_eq!(*log.lock(), vec![0, 2, 4]);
}

#[test]
fn binding_tracks_derived_store() {
    let width = writable(2);
    let height = writable(3);
    let area = derived((width.clone(), height.clone()), |(w, h): &(u32, u32)| w * h);

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    let binding = bind_readable(area, move |value| sink.lock().push(*value));

    width.set(4);
    assert_eq!(binding.value(), Ok(12));
    assert_eq!(*changes.lock(), vec![12]);

    drop(binding);
    assert_eq!(width.subscriber_count(), 0);
    assert_eq!(derive_value((width, height), |(w, h): &(u32, u32)| w + h), 7);
}

/// A subscriber that corrects the value leaves every subscriber on the
/// corrected value, whichever order they registered in.
#[test]
fn reentrant_correction_is_the_last_delivery() {
    let store = writable(0);
    let (before, _before) = record(&store);
    let writer = store.clone();
    let _clamp = store.subscribe(move |value: &i32| {
        if *value > 10 {
            writer.set(10);
        }
    });
    let (after, _after) = record(&store);
    let binding = bind_readable(store.clone(), |_| {});

    store.set(50);

    assert_eq!(get(&store), 10);
    assert_eq!(before.lock().last(), Some(&10));
    assert_eq!(after.lock().last(), Some(&10));
    assert!(!after.lock().contains(&50));
    assert_eq!(binding.value(), Ok(10));
}

/// A derived store keeps following its sources after a batch panics.
#[test]
fn derived_store_survives_panicking_batch() {
    let a = writable(1);
    let b = writable(2);
    let sum = derived((a.clone(), b.clone()), |(x, y): &(i32, i32)| x + y);
    let (log, _unsubscriber) = record(&sum);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        batch(|| {
            a.set(10);
            panic!("batch body failed");
        })
    }));
    assert!(result.is_err());
    assert_eq!(get(&sum), 12);

    b.set(20);
    assert_eq!(log.lock().last(), Some(&30));
    a.set(100);
    assert_eq!(*log.lock(), vec![3, 12, 30, 120]);
}

/// A subscriber may own a handle to another subscription on the same store.
#[test]
fn subscriber_owning_sibling_handle_unsubscribes() {
    let store = writable(0);
    let sibling = store.subscribe(|_| {});
    let parent = store.subscribe(move |_| {
        let _ = sibling.is_subscribed();
    });
    assert_eq!(store.subscriber_count(), 2);

    parent.unsubscribe();
    assert_eq!(store.subscriber_count(), 0);
    assert!(!store.is_active());
}

#[test]
fn stores_move_across_threads() {
    let store = writable(0);
    let (log, _unsubscriber) = record(&store);

    let writer = store.clone();
    std::thread::spawn(move || {
        writer.set(1);
        writer.update(|v| v + 1);
    })
    .join()
    .unwrap();

    assert_eq!(get(&store), 2);
    assert_eq!(*log.lock(), vec![0, 1, 2]);
}

proptest! {
    #[test]
    fn set_then_get_returns_value(initial in any::<i64>(), next in any::<i64>()) {
        let store = writable(initial);
        store.set(next);
        prop_assert_eq!(get(&store), next);
    }

    #[test]
    fn subscribe_delivers_exactly_once(value in ".*") {
        let store = writable(value.clone());
        let (log, _unsubscriber) = record(&store);
        prop_assert_eq!(log.lock().clone(), vec![value]);
    }
}
