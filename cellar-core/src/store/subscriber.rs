//! Subscriber types for the store engine.
//!
//! A subscription is a pair of callbacks: `run` receives values, and
//! `invalidate` is told a new value is about to arrive. Each call to
//! `subscribe` gets its own [`SubscriberId`], so registering the same
//! closures twice yields two independent registrations.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Callback that receives a store's value.
pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback run before new values are delivered.
pub type Invalidator = Arc<dyn Fn() + Send + Sync>;

/// Cleanup returned by start notifiers and imperative derivations.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Unique identifier for a subscriber registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered (run, invalidate) pair.
pub(crate) struct Registration<T> {
    pub(crate) run: Subscriber<T>,
    pub(crate) invalidate: Invalidator,
}

impl<T> Registration<T> {
    pub(crate) fn new(run: Subscriber<T>, invalidate: Invalidator) -> Self {
        Self { run, invalidate }
    }
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            invalidate: Arc::clone(&self.invalidate),
        }
    }
}

/// Handle that ends a subscription.
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once only has an
/// effect the first time. Dropping the handle unsubscribes as well, so keep
/// it alive for as long as updates are wanted, or call
/// [`detach`](Self::detach) to keep the subscription for the store's lifetime.
#[must_use = "dropping an Unsubscriber ends the subscription"]
pub struct Unsubscriber {
    release: Mutex<Option<Cleanup>>,
}

impl Unsubscriber {
    /// Wrap a release callback.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// An unsubscriber that does nothing, as handed out for empty stores.
    pub fn noop() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// End the subscription. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Whether this handle still holds a live subscription.
    pub fn is_subscribed(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Give up the handle without ending the subscription.
    pub fn detach(self) {
        self.release.lock().take();
    }
}

impl Drop for Unsubscriber {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl Debug for Unsubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
