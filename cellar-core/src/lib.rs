//! Cellar Core
//!
//! This crate provides subscribable state containers for UI and application
//! code. It implements:
//!
//! - Writable stores with lazy start/stop notifiers
//! - Read-only stores driven by their start notifier
//! - Derived stores computed from one or more sources
//! - Batched updates that coalesce recomputation
//! - Bindings that keep a component in sync with a store
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: the store types, subscriptions, and batching
//! - `util`: change detection and helpers for untyped boundaries
//! - `adapter`: component bindings
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use parking_lot::Mutex;
//! use cellar_core::{derived, writable, Readable};
//!
//! let count = writable(1);
//! let doubled = derived(count.clone(), |n: &i32| n * 2);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let unsubscriber = doubled.subscribe(move |value| sink.lock().push(*value));
//!
//! count.set(5);
//! unsubscriber.unsubscribe();
//! count.set(6);
//!
//! assert_eq!(*seen.lock(), vec![2, 10]);
//! ```

pub mod adapter;
pub mod error;
pub mod store;
pub mod util;

pub use error::{Result, StoreError};
pub use store::{
    batch, derived, derived_from, derived_with, get, readable, writable, Cleanup, Derivation,
    Derived, Invalidator, ReadOnly, Readable, Setter, SourceLink, StartStopNotifier, Stores,
    Subscriber, SubscriberId, Unsubscriber, Writable,
};
pub use util::{
    erase, get_store_value, is_function, noop, run_all, safe_not_equal, subscribe,
    validate_store, AnyStore, ErasedReadable, StoreValue,
};
