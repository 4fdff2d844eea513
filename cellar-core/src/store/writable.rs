//! Writable Store Implementation
//!
//! A writable store holds a value and a registry of subscribers, and
//! notifies them when the value changes.
//!
//! # Lifecycle
//!
//! 1. A new store is idle. Setting its value has no side effects.
//!
//! 2. The first subscriber starts the store: the start notifier runs and its
//!    cleanup is kept.
//!
//! 3. While active, every effective `set` notifies subscribers.
//!
//! 4. When the last subscriber leaves, the cleanup runs and the store is
//!    idle again.
//!
//! # Notification
//!
//! Delivery happens in two phases. Every `invalidate` callback runs first,
//! then every `run` callback receives the new value. Derived stores use the
//! first phase to mark a source as pending, which keeps them from
//! recomputing against a half-updated set of sources.
//!
//! No lock is held while user callbacks run. Callbacks may set stores,
//! subscribe, or unsubscribe, including on the store that is notifying.

use std::fmt::Debug;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::batch;
use super::readable::Readable;
use super::subscriber::{Cleanup, Invalidator, Registration, Subscriber, SubscriberId, Unsubscriber};
use crate::util::StoreValue;

/// Counter for generating unique store IDs.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique store ID.
fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Start notifier shared by every activation of a store.
pub type StartStopNotifier<T> = Arc<dyn Fn(&Writable<T>) -> Option<Cleanup> + Send + Sync>;

/// Registry snapshot taken when a wave begins.
pub(crate) type Snapshot<T> = Vec<(SubscriberId, Registration<T>)>;

enum Lifecycle {
    Idle,
    /// The start notifier is running. Sets store the value without notifying.
    Starting,
    Active(Option<Cleanup>),
}

struct StoreState<T> {
    value: T,
    /// Bumped on every effective `set`. A wave stops once this moves on.
    version: u64,
    subscribers: IndexMap<SubscriberId, Registration<T>>,
    lifecycle: Lifecycle,
}

pub(crate) struct StoreInner<T: StoreValue> {
    id: u64,
    state: Mutex<StoreState<T>>,
    start: Option<StartStopNotifier<T>>,
}

/// A store whose value can be set from outside.
///
/// Clones share the same value and subscribers.
///
/// # Example
///
/// ```rust
/// use cellar_core::{writable, Readable};
///
/// let count = writable(0);
/// let unsubscribe = count.subscribe(|value| println!("count = {value}"));
///
/// count.set(1);
/// count.update(|n| n + 1);
/// unsubscribe.unsubscribe();
/// ```
pub struct Writable<T: StoreValue> {
    inner: Arc<StoreInner<T>>,
}

/// Create a writable store without a start notifier.
pub fn writable<T: StoreValue>(initial: T) -> Writable<T> {
    Writable::new(initial)
}

impl<T: StoreValue> Writable<T> {
    /// Create a store holding `initial`.
    pub fn new(initial: T) -> Self {
        Self::build(initial, None)
    }

    /// Create a store with a start notifier.
    ///
    /// `start` runs on each transition from zero to one subscriber and
    /// receives this store's handle. The cleanup it returns runs on the
    /// transition back to zero.
    pub fn with_start<F>(initial: T, start: F) -> Self
    where
        F: Fn(&Writable<T>) -> Option<Cleanup> + Send + Sync + 'static,
    {
        Self::build(initial, Some(Arc::new(start)))
    }

    fn build(initial: T, start: Option<StartStopNotifier<T>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: next_store_id(),
                state: Mutex::new(StoreState {
                    value: initial,
                    version: 0,
                    subscribers: IndexMap::new(),
                    lifecycle: Lifecycle::Idle,
                }),
                start,
            }),
        }
    }

    /// Get the store's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Set a new value.
    ///
    /// Does nothing when [`StoreValue::safe_not_equal`] reports no change.
    /// Otherwise the value is stored and, if the store is active, subscribers
    /// are notified before this returns.
    pub fn set(&self, value: T) {
        let (_previous, snapshot) = {
            let mut state = self.inner.state.lock();
            if !state.value.safe_not_equal(&value) {
                return;
            }
            let previous = mem::replace(&mut state.value, value);
            state.version += 1;
            let snapshot = matches!(state.lifecycle, Lifecycle::Active(_)).then(|| {
                state
                    .subscribers
                    .iter()
                    .map(|(id, registration)| (*id, registration.clone()))
                    .collect::<Snapshot<T>>()
            });
            (previous, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.inner.notify(snapshot);
        }
    }

    /// Set the value computed from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.state.lock().value.clone();
        self.set(f(&current));
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Whether the store has been started and not yet stopped.
    pub fn is_active(&self) -> bool {
        matches!(self.inner.state.lock().lifecycle, Lifecycle::Active(_))
    }

    pub(crate) fn downgrade(&self) -> WeakWritable<T> {
        WeakWritable {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn peek(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    fn start(&self, id: SubscriberId) {
        let Some(start) = self.inner.start.clone() else {
            self.inner.state.lock().lifecycle = Lifecycle::Active(None);
            return;
        };

        let guard = StartGuard {
            inner: &self.inner,
            id,
            armed: true,
        };
        let cleanup = start(self);
        guard.disarm();

        self.inner.state.lock().lifecycle = Lifecycle::Active(cleanup);
        tracing::trace!(store = self.inner.id, "store started");
    }

    fn unsubscriber(&self, id: SubscriberId) -> Unsubscriber {
        let inner = Arc::downgrade(&self.inner);
        Unsubscriber::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove(id);
            }
        })
    }
}

impl<T: StoreValue> StoreInner<T> {
    /// Run both notification phases for a registry snapshot.
    fn notify(self: &Arc<Self>, snapshot: Snapshot<T>) {
        for (_, registration) in &snapshot {
            (registration.invalidate)();
        }

        if batch::is_batching() {
            batch::defer(
                self.id,
                || PendingWave::new(Arc::downgrade(self)),
                |wave: &mut PendingWave<T>| wave.extend(snapshot),
            );
            return;
        }

        self.deliver(snapshot);
    }

    /// Run phase.
    ///
    /// Registrations removed since the snapshot are skipped. If a callback
    /// sets the store again, the nested wave has already reached every
    /// subscriber with the newer value, so this wave ends there.
    fn deliver(&self, snapshot: Snapshot<T>) {
        let (value, version) = {
            let state = self.state.lock();
            (state.value.clone(), state.version)
        };

        for (id, registration) in snapshot {
            let (current, registered) = {
                let state = self.state.lock();
                (state.version, state.subscribers.contains_key(&id))
            };
            if current != version {
                tracing::trace!(store = self.id, "wave superseded by a newer value");
                break;
            }
            if registered {
                (registration.run)(&value);
            }
        }
    }

    fn remove(&self, id: SubscriberId) {
        // The registration may own handles to this store, so it is dropped
        // after the lock is released.
        let (removed, cleanup) = {
            let mut state = self.state.lock();
            let removed = state.subscribers.shift_remove(&id);
            if removed.is_none() || !state.subscribers.is_empty() {
                (removed, None)
            } else {
                match mem::replace(&mut state.lifecycle, Lifecycle::Idle) {
                    Lifecycle::Active(cleanup) => (removed, Some(cleanup)),
                    other => {
                        state.lifecycle = other;
                        (removed, None)
                    }
                }
            }
        };
        drop(removed);

        let Some(cleanup) = cleanup else {
            return;
        };
        tracing::trace!(store = self.id, "store stopped");
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl<T: StoreValue> Readable for Writable<T> {
    type Value = T;

    fn subscribe_with(&self, run: Subscriber<T>, invalidate: Invalidator) -> Unsubscriber {
        let id = SubscriberId::new();
        let should_start = {
            let mut state = self.inner.state.lock();
            state
                .subscribers
                .insert(id, Registration::new(Arc::clone(&run), invalidate));
            if state.subscribers.len() == 1 && matches!(state.lifecycle, Lifecycle::Idle) {
                state.lifecycle = Lifecycle::Starting;
                true
            } else {
                false
            }
        };

        if should_start {
            self.start(id);
        }

        let value = self.peek();
        run(&value);
        self.unsubscriber(id)
    }
}

impl<T: StoreValue> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StoreValue + Debug> Debug for Writable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Writable")
            .field("id", &self.inner.id)
            .field("value", &state.value)
            .field("subscriber_count", &state.subscribers.len())
            .finish()
    }
}

/// Non-owning handle to a writable store.
pub(crate) struct WeakWritable<T: StoreValue> {
    inner: Weak<StoreInner<T>>,
}

impl<T: StoreValue> WeakWritable<T> {
    pub(crate) fn upgrade(&self) -> Option<Writable<T>> {
        self.inner.upgrade().map(|inner| Writable { inner })
    }
}

impl<T: StoreValue> Clone for WeakWritable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Removes the new registration if the start notifier panics.
struct StartGuard<'a, T: StoreValue> {
    inner: &'a StoreInner<T>,
    id: SubscriberId,
    armed: bool,
}

impl<T: StoreValue> StartGuard<'_, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: StoreValue> Drop for StartGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = {
            let mut state = self.inner.state.lock();
            state.lifecycle = Lifecycle::Idle;
            state.subscribers.shift_remove(&self.id)
        };
        drop(removed);
        tracing::debug!(store = self.inner.id, "start notifier panicked, subscription rolled back");
    }
}

/// Run phase held back by an open batch.
pub(crate) struct PendingWave<T: StoreValue> {
    store: Weak<StoreInner<T>>,
    registrations: IndexMap<SubscriberId, Registration<T>>,
}

impl<T: StoreValue> PendingWave<T> {
    fn new(store: Weak<StoreInner<T>>) -> Self {
        Self {
            store,
            registrations: IndexMap::new(),
        }
    }

    fn extend(&mut self, snapshot: Snapshot<T>) {
        self.registrations.extend(snapshot);
    }
}

impl<T: StoreValue> batch::Deferred for PendingWave<T> {
    fn flush(self: Box<Self>) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        store.deliver(self.registrations.into_iter().collect());
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
