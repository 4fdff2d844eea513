//! Readable Stores
//!
//! [`Readable`] is the capability every store shares: it can be subscribed
//! to. Implementations must call `run` once, synchronously, with the current
//! value before `subscribe_with` returns. [`get`] and derived stores rely on
//! that contract.

use std::fmt::Debug;
use std::sync::Arc;

use super::subscriber::{Cleanup, Invalidator, Subscriber, Unsubscriber};
use super::writable::Writable;
use crate::util::{get_store_value, noop, StoreValue};

/// A store that can be subscribed to.
pub trait Readable: Send + Sync {
    /// The value type the store delivers.
    type Value: StoreValue;

    /// Register a (run, invalidate) pair.
    ///
    /// `run` receives the current value immediately, then every new value.
    /// `invalidate` runs ahead of each delivery wave.
    fn subscribe_with(&self, run: Subscriber<Self::Value>, invalidate: Invalidator)
        -> Unsubscriber;

    /// Subscribe with a run callback only.
    fn subscribe<F>(&self, run: F) -> Unsubscriber
    where
        F: Fn(&Self::Value) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_with(Arc::new(run), Arc::new(noop))
    }
}

impl<R: Readable + ?Sized> Readable for Arc<R> {
    type Value = R::Value;

    fn subscribe_with(
        &self,
        run: Subscriber<Self::Value>,
        invalidate: Invalidator,
    ) -> Unsubscriber {
        (**self).subscribe_with(run, invalidate)
    }
}

/// Synchronously read a store's current value.
///
/// Every store in this crate delivers on subscribe except an imperative
/// derived store that was given no initial value and has not set one yet.
/// Use [`get_store_value`] to handle that case without panicking.
///
/// # Panics
///
/// Panics if the store does not deliver a value while subscribing.
pub fn get<R: Readable + ?Sized>(store: &R) -> R::Value {
    get_store_value(store).expect("readable store did not deliver its value on subscribe")
}

/// A store whose value can only change from its start notifier.
pub struct ReadOnly<T: StoreValue> {
    store: Writable<T>,
}

impl<T: StoreValue> ReadOnly<T> {
    /// A store that never changes.
    pub fn constant(value: T) -> Self {
        Self {
            store: Writable::new(value),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Whether the store currently has subscribers and has been started.
    pub fn is_active(&self) -> bool {
        self.store.is_active()
    }
}

/// Create a read-only store.
///
/// `start` runs when the first subscriber arrives and receives the store's
/// own writable handle. The cleanup it returns runs when the last subscriber
/// leaves.
pub fn readable<T, F>(initial: T, start: F) -> ReadOnly<T>
where
    T: StoreValue,
    F: Fn(&Writable<T>) -> Option<Cleanup> + Send + Sync + 'static,
{
    ReadOnly {
        store: Writable::with_start(initial, start),
    }
}

impl<T: StoreValue> Readable for ReadOnly<T> {
    type Value = T;

    fn subscribe_with(&self, run: Subscriber<T>, invalidate: Invalidator) -> Unsubscriber {
        self.store.subscribe_with(run, invalidate)
    }
}

impl<T: StoreValue> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: StoreValue + Debug> Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.store).finish()
    }
}
