//! Dynamic Store Boundary
//!
//! Inside the crate every store is checked at compile time through the
//! [`Readable`] trait. Values that cross an untyped boundary (plugin hosts,
//! template engines, anything holding `dyn Any`) go through the helpers
//! here instead. An absent store is valid and simply never calls back.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use super::noop;
use crate::error::{Result, StoreError};
use crate::store::{Readable, Unsubscriber};

/// A readable store with its value type erased.
pub trait ErasedReadable: Send + Sync {
    /// Subscribe with a callback receiving the value as `&dyn Any`.
    fn subscribe_any(&self, run: Arc<dyn Fn(&dyn Any) + Send + Sync>) -> Unsubscriber;
}

impl<R: Readable> ErasedReadable for R {
    fn subscribe_any(&self, run: Arc<dyn Fn(&dyn Any) + Send + Sync>) -> Unsubscriber {
        self.subscribe_with(Arc::new(move |value: &R::Value| run(value)), Arc::new(noop))
    }
}

/// Shared handle to a type-erased store.
pub type AnyStore = Arc<dyn ErasedReadable>;

/// Erase a store's value type.
pub fn erase<R: Readable + 'static>(store: R) -> AnyStore {
    Arc::new(store)
}

/// Check that an untyped value is a store.
///
/// `None` passes. Anything other than an [`AnyStore`] is rejected with
/// [`StoreError::NotAStore`] naming the parameter.
pub fn validate_store(store: Option<&dyn Any>, name: &str) -> Result<()> {
    match store {
        None => Ok(()),
        Some(store) if store.is::<AnyStore>() => Ok(()),
        Some(_) => {
            tracing::debug!(name, "rejected value without a subscribe capability");
            Err(StoreError::NotAStore {
                name: name.to_string(),
            })
        }
    }
}

/// Subscribe to a store that may be absent.
pub fn subscribe<F>(store: Option<&dyn ErasedReadable>, run: F) -> Unsubscriber
where
    F: Fn(&dyn Any) + Send + Sync + 'static,
{
    match store {
        Some(store) => store.subscribe_any(Arc::new(run)),
        None => Unsubscriber::noop(),
    }
}

/// Read a store's current value without keeping a subscription.
///
/// Subscribes, captures the synchronously delivered value, and unsubscribes
/// before returning. Fails with [`StoreError::Unset`] if the store did not
/// deliver anything.
pub fn get_store_value<R: Readable + ?Sized>(store: &R) -> Result<R::Value> {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);

    let unsubscriber = store.subscribe_with(
        Arc::new(move |value: &R::Value| {
            *sink.lock() = Some(value.clone());
        }),
        Arc::new(noop),
    );
    unsubscriber.unsubscribe();

    let value = slot.lock().take();
    value.ok_or(StoreError::Unset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{derived_from, writable, Derivation, Derived};

    #[test]
    fn validate_accepts_absent_and_erased_stores() {
        let store = erase(writable(1));

        assert!(validate_store(None, "s").is_ok());
        assert!(validate_store(Some(&store), "s").is_ok());
    }

    #[test]
    fn validate_rejects_non_stores() {
        let err = validate_store(Some(&5), "s").unwrap_err();
        assert_eq!(
            err,
            StoreError::NotAStore {
                name: "s".to_string()
            }
        );
    }

    #[test]
    fn absent_store_never_calls_back() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = called.clone();

        let unsubscriber = subscribe(None, move |_| *called_clone.lock() = true);
        unsubscriber.unsubscribe();

        assert!(!*called.lock());
    }

    #[test]
    fn erased_subscription_delivers_any() {
        let store = writable(7);
        let erased = erase(store.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _unsubscriber = subscribe(Some(erased.as_ref()), move |value| {
            if let Some(n) = value.downcast_ref::<i32>() {
                seen_clone.lock().push(*n);
            }
        });
        store.set(8);

        assert_eq!(*seen.lock(), vec![7, 8]);
    }

    #[test]
    fn get_store_value_leaves_no_subscription() {
        let store = writable("hello");

        assert_eq!(get_store_value(&store), Ok("hello"));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn get_store_value_reports_unset_derived() {
        let store = writable(1);
        let silent: Derived<i32> = derived_from(
            store,
            Derivation::imperative(|_: &i32, _| None),
            None,
        );

        assert_eq!(get_store_value(&silent), Err(StoreError::Unset));
    }
}
