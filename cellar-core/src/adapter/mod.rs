//! Component Bindings
//!
//! Framework-agnostic glue for UI code that re-renders when a store changes.
//! A binding owns a subscription, remembers the latest delivered value, and
//! calls back on every change after the first delivery. Dropping the binding
//! releases the subscription.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use cellar_core::adapter::bind_writable;
//! use cellar_core::writable;
//!
//! let renders = Arc::new(AtomicUsize::new(0));
//! let counter = renders.clone();
//! let binding = bind_writable(writable(0), move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! binding.update(|n| n + 1);
//! assert_eq!(binding.value(), Ok(1));
//! assert_eq!(renders.load(Ordering::SeqCst), 1);
//! ```

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::store::{derived, get, Readable, Stores, Unsubscriber, Writable};
use crate::util::{get_store_value, StoreValue};

/// Snapshot of a bound read-only store.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadableState<T> {
    pub value: T,
}

/// Snapshot of a bound writable store, with the handle to write back through.
#[derive(Debug, Clone)]
pub struct WritableState<T: StoreValue> {
    pub value: T,
    pub store: Writable<T>,
}

/// Keeps the latest value of a store and reports changes.
pub struct ReadableBinding<R: Readable> {
    store: R,
    latest: Arc<Mutex<Option<R::Value>>>,
    unsubscriber: Unsubscriber,
}

/// Bind to a store.
///
/// Values delivered while subscribing only seed the binding. `on_change`
/// runs for every delivery after that.
pub fn bind_readable<R, F>(store: R, on_change: F) -> ReadableBinding<R>
where
    R: Readable,
    F: Fn(&R::Value) + Send + Sync + 'static,
{
    let latest = Arc::new(Mutex::new(None));
    let primed = Arc::new(AtomicBool::new(false));

    let slot = Arc::clone(&latest);
    let ready = Arc::clone(&primed);
    let unsubscriber = store.subscribe_with(
        Arc::new(move |value: &R::Value| {
            *slot.lock() = Some(value.clone());
            if ready.load(Ordering::Acquire) {
                on_change(value);
            }
        }),
        Arc::new(crate::util::noop),
    );
    primed.store(true, Ordering::Release);

    ReadableBinding {
        store,
        latest,
        unsubscriber,
    }
}

impl<R: Readable> ReadableBinding<R> {
    /// The latest delivered value, or a fresh read if nothing arrived yet.
    pub fn value(&self) -> Result<R::Value> {
        let latest = self.latest.lock().clone();
        match latest {
            Some(value) => Ok(value),
            None => get_store_value(&self.store),
        }
    }

    /// Snapshot of the current value.
    pub fn state(&self) -> Result<ReadableState<R::Value>> {
        self.value().map(|value| ReadableState { value })
    }

    /// The bound store.
    pub fn store(&self) -> &R {
        &self.store
    }

    /// Release the subscription now instead of on drop.
    pub fn unbind(&self) {
        self.unsubscriber.unsubscribe();
    }

    /// Whether the subscription is still held.
    pub fn is_bound(&self) -> bool {
        self.unsubscriber.is_subscribed()
    }
}

impl<R> Debug for ReadableBinding<R>
where
    R: Readable + Debug,
    R::Value: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableBinding")
            .field("store", &self.store)
            .field("latest", &*self.latest.lock())
            .finish()
    }
}

/// A [`ReadableBinding`] over a writable store that can write back.
pub struct WritableBinding<T: StoreValue> {
    inner: ReadableBinding<Writable<T>>,
}

/// Bind to a writable store.
pub fn bind_writable<T, F>(store: Writable<T>, on_change: F) -> WritableBinding<T>
where
    T: StoreValue,
    F: Fn(&T) + Send + Sync + 'static,
{
    WritableBinding {
        inner: bind_readable(store, on_change),
    }
}

impl<T: StoreValue> WritableBinding<T> {
    /// The latest delivered value.
    pub fn value(&self) -> Result<T> {
        self.inner.value()
    }

    /// Set the bound store's value.
    pub fn set(&self, value: T) {
        self.inner.store.set(value);
    }

    /// Set the bound store's value from its current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.inner.store.update(f);
    }

    /// Snapshot of the current value together with the store handle.
    pub fn state(&self) -> Result<WritableState<T>> {
        self.inner.value().map(|value| WritableState {
            value,
            store: self.inner.store.clone(),
        })
    }

    /// The bound store.
    pub fn store(&self) -> &Writable<T> {
        self.inner.store()
    }

    /// Release the subscription now instead of on drop.
    pub fn unbind(&self) {
        self.inner.unbind();
    }

    /// Whether the subscription is still held.
    pub fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }
}

impl<T: StoreValue + Debug> Debug for WritableBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WritableBinding").field(&self.inner).finish()
    }
}

/// Subscribe a plain callback to a store.
pub fn subscribe_to<R, F>(store: &R, f: F) -> Unsubscriber
where
    R: Readable,
    F: Fn(&R::Value) + Send + Sync + 'static,
{
    store.subscribe(f)
}

/// Compute a value from stores once, without keeping a derived store around.
pub fn derive_value<S, T, F>(stores: S, f: F) -> T
where
    S: Stores,
    T: StoreValue,
    F: Fn(&S::Values) -> T + Send + Sync + 'static,
{
    get(&derived(stores, f))
}
