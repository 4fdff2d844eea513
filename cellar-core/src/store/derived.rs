//! Derived Store Implementation
//!
//! A derived store computes its value from one or more source stores.
//!
//! # How Derived Stores Work
//!
//! 1. Creating a derived store does nothing. It subscribes to its sources
//!    only when it gains its first subscriber.
//!
//! 2. Each source delivers into a positional slot. An invalidated source
//!    marks its slot pending until its new value arrives.
//!
//! 3. Once no slot is pending, the derivation runs against all current
//!    values. When a `set` reaches the derived store through several paths,
//!    the paths that have not delivered yet keep it pending, so it
//!    recomputes once rather than once per path. This relies on an
//!    intermediate derived store being listed ahead of the source it shares
//!    with the outer store, so that it subscribes to that source first.
//!
//! 4. When the last subscriber leaves, the source subscriptions are dropped
//!    and any cleanup from the derivation runs.
//!
//! # Derivation Kinds
//!
//! - [`Derivation::Pure`] maps values to a new value.
//! - [`Derivation::Imperative`] receives a [`Setter`] and may set the value
//!   later or several times. It may return a cleanup that runs before the
//!   next recomputation and on deactivation.
//!
//! With no sources, the derivation runs exactly once, when the store is
//! created.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

use super::readable::Readable;
use super::sources::{PendingMask, SlotSink, SourceLink, Stores};
use super::subscriber::{Cleanup, Invalidator, Subscriber, Unsubscriber};
use super::writable::{WeakWritable, Writable};
use crate::util::{run_all, StoreValue};

/// How a derived store turns source values into its own value.
pub enum Derivation<V, T: StoreValue> {
    /// Compute the value directly.
    Pure(Arc<dyn Fn(&V) -> T + Send + Sync>),

    /// Set the value through a [`Setter`], optionally returning a cleanup.
    Imperative(Arc<dyn Fn(&V, &Setter<T>) -> Option<Cleanup> + Send + Sync>),
}

impl<V, T: StoreValue> Derivation<V, T> {
    /// Wrap a pure mapping.
    pub fn pure<F>(f: F) -> Self
    where
        F: Fn(&V) -> T + Send + Sync + 'static,
    {
        Self::Pure(Arc::new(f))
    }

    /// Wrap an imperative derivation.
    pub fn imperative<F>(f: F) -> Self
    where
        F: Fn(&V, &Setter<T>) -> Option<Cleanup> + Send + Sync + 'static,
    {
        Self::Imperative(Arc::new(f))
    }
}

impl<V, T: StoreValue> Clone for Derivation<V, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Pure(f) => Self::Pure(Arc::clone(f)),
            Self::Imperative(f) => Self::Imperative(Arc::clone(f)),
        }
    }
}

/// Write access handed to imperative derivations.
///
/// The setter does not keep the derived store alive. Calls made after the
/// store has been dropped are ignored.
pub struct Setter<T: StoreValue> {
    target: WeakWritable<Option<T>>,
}

impl<T: StoreValue> Setter<T> {
    /// Set the derived store's value.
    pub fn set(&self, value: T) {
        if let Some(target) = self.target.upgrade() {
            target.set(Some(value));
        }
    }

    /// Set the value computed from the current one.
    ///
    /// Does nothing while the store has no value yet.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        if let Some(current) = target.peek() {
            target.set(Some(f(&current)));
        }
    }
}

impl<T: StoreValue> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

/// A read-only store computed from other stores.
pub struct Derived<T: StoreValue> {
    store: Writable<Option<T>>,
    eager: Option<Arc<EagerCleanup>>,
}

/// Create a derived store from a pure mapping.
///
/// # Example
///
/// ```rust
/// use cellar_core::{derived, get, writable};
///
/// let a = writable(2);
/// let b = writable(3);
/// let sum = derived((a.clone(), b), |(x, y): &(i32, i32)| x + y);
/// assert_eq!(get(&sum), 5);
///
/// a.set(10);
/// assert_eq!(get(&sum), 13);
/// ```
pub fn derived<S, T, F>(stores: S, f: F) -> Derived<T>
where
    S: Stores,
    T: StoreValue,
    F: Fn(&S::Values) -> T + Send + Sync + 'static,
{
    derived_from(stores, Derivation::pure(f), None)
}

/// Create a derived store that sets its value through a [`Setter`].
///
/// The store holds `initial` until the derivation first sets a value.
pub fn derived_with<S, T, F>(stores: S, f: F, initial: T) -> Derived<T>
where
    S: Stores,
    T: StoreValue,
    F: Fn(&S::Values, &Setter<T>) -> Option<Cleanup> + Send + Sync + 'static,
{
    derived_from(stores, Derivation::imperative(f), Some(initial))
}

/// Create a derived store from an explicit [`Derivation`].
///
/// With `initial` set to `None`, the store has no value until the
/// derivation produces one. Subscribers are not called before that.
pub fn derived_from<S, T>(
    stores: S,
    derivation: Derivation<S::Values, T>,
    initial: Option<T>,
) -> Derived<T>
where
    S: Stores,
    T: StoreValue,
{
    if stores.is_empty() {
        return derive_once(&stores, derivation, initial);
    }

    let store = Writable::with_start(initial, move |target: &Writable<Option<T>>| {
        let link = Arc::new(DerivedLink::<S, T> {
            state: Mutex::new(LinkState {
                slots: stores.empty_slots(),
                pending: PendingMask::default(),
                started: false,
                cleanup: None,
            }),
            derivation: derivation.clone(),
            target: target.downgrade(),
        });

        let sink: Arc<dyn SlotSink<S::Slots>> = link.clone();
        let unsubscribers = stores.subscribe_each(&SourceLink::new(sink));
        tracing::trace!(
            store = target.id(),
            sources = unsubscribers.len(),
            "derived store started"
        );

        link.state.lock().started = true;
        link.sync();

        Some(Box::new(move || {
            run_all(unsubscribers.iter().map(|unsubscriber| || unsubscriber.unsubscribe()));
            link.stop();
        }) as Cleanup)
    });

    Derived { store, eager: None }
}

/// Evaluate a derivation over an empty source set, once.
fn derive_once<S, T>(
    stores: &S,
    derivation: Derivation<S::Values, T>,
    initial: Option<T>,
) -> Derived<T>
where
    S: Stores,
    T: StoreValue,
{
    let store = Writable::new(initial);
    let mut eager = None;

    if let Some(values) = S::values(&stores.empty_slots()) {
        match derivation {
            Derivation::Pure(f) => store.set(Some(f(&values))),
            Derivation::Imperative(f) => {
                let setter = Setter {
                    target: store.downgrade(),
                };
                eager = f(&values, &setter)
                    .map(|cleanup| Arc::new(EagerCleanup(Mutex::new(Some(cleanup)))));
            }
        }
    }

    Derived { store, eager }
}

impl<T: StoreValue> Derived<T> {
    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Whether the store is subscribed to its sources.
    pub fn is_active(&self) -> bool {
        self.store.is_active()
    }
}

impl<T: StoreValue> Readable for Derived<T> {
    type Value = T;

    fn subscribe_with(&self, run: Subscriber<T>, invalidate: Invalidator) -> Unsubscriber {
        self.store.subscribe_with(
            Arc::new(move |value: &Option<T>| {
                if let Some(value) = value {
                    run(value);
                }
            }),
            invalidate,
        )
    }
}

impl<T: StoreValue> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            eager: self.eager.clone(),
        }
    }
}

impl<T: StoreValue + Debug> Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("store", &self.store)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Cleanup of a source-less imperative derivation, run when the last
/// handle is dropped.
struct EagerCleanup(Mutex<Option<Cleanup>>);

impl Drop for EagerCleanup {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.get_mut().take() {
            cleanup();
        }
    }
}

struct LinkState<Sl> {
    slots: Sl,
    pending: PendingMask,
    started: bool,
    cleanup: Option<Cleanup>,
}

/// Per-activation bridge between the sources and the derived value.
struct DerivedLink<S: Stores, T: StoreValue> {
    state: Mutex<LinkState<S::Slots>>,
    derivation: Derivation<S::Values, T>,
    target: WeakWritable<Option<T>>,
}

impl<S: Stores, T: StoreValue> DerivedLink<S, T> {
    /// Recompute if every source has delivered.
    fn sync(&self) {
        let (values, cleanup) = {
            let mut state = self.state.lock();
            if !state.started || !state.pending.is_clear() {
                return;
            }
            let Some(values) = S::values(&state.slots) else {
                return;
            };
            (values, state.cleanup.take())
        };

        if let Some(cleanup) = cleanup {
            cleanup();
        }

        match &self.derivation {
            Derivation::Pure(f) => {
                let value = f(&values);
                if let Some(target) = self.target.upgrade() {
                    tracing::trace!(store = target.id(), "derived value recomputed");
                    target.set(Some(value));
                }
            }
            Derivation::Imperative(f) => {
                let setter = Setter {
                    target: self.target.clone(),
                };
                let cleanup = f(&values, &setter);

                let mut state = self.state.lock();
                if state.started {
                    state.cleanup = cleanup;
                } else if let Some(cleanup) = cleanup {
                    drop(state);
                    cleanup();
                }
            }
        }
    }

    fn stop(&self) {
        let cleanup = {
            let mut state = self.state.lock();
            state.started = false;
            state.cleanup.take()
        };
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl<S: Stores, T: StoreValue> SlotSink<S::Slots> for DerivedLink<S, T> {
    fn invalidate(&self, index: usize) {
        self.state.lock().pending.mark(index);
    }

    fn deliver(&self, index: usize, write: &mut dyn FnMut(&mut S::Slots)) {
        {
            let mut state = self.state.lock();
            write(&mut state.slots);
            state.pending.clear(index);
            if !state.started {
                return;
            }
        }
        self.sync();
    }
}
