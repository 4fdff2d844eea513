//! Store Engine
//!
//! This module implements the stores themselves: writable and read-only
//! stores, derived stores, and batched updates.
//!
//! # Concepts
//!
//! ## Stores
//!
//! A store holds a value and a list of subscribers. Subscribing delivers the
//! current value immediately; every later change is delivered as it happens,
//! synchronously, inside the call that made it.
//!
//! ## Activation
//!
//! A store is idle until its first subscriber arrives. At that point its
//! start notifier runs, and the cleanup it returns runs when the last
//! subscriber leaves. Derived stores use this to subscribe to their sources
//! only while someone is listening.
//!
//! ## Two-Phase Notification
//!
//! A change first invalidates every subscriber, then delivers the new value
//! to each. A derived store waits until every invalidated source has
//! delivered before it recomputes.

mod batch;
mod derived;
mod readable;
mod sources;
mod subscriber;
mod writable;

pub use batch::batch;
pub use derived::{derived, derived_from, derived_with, Derivation, Derived, Setter};
pub use readable::{get, readable, ReadOnly, Readable};
pub use sources::{SourceLink, Stores};
pub use subscriber::{Cleanup, Invalidator, Subscriber, SubscriberId, Unsubscriber};
pub use writable::{writable, StartStopNotifier, Writable};
