//! Utilities
//!
//! Small helpers shared by the store engine: change detection, running
//! batches of callbacks, and the checks used where values arrive untyped.

mod validate;
mod value;

use std::any::Any;
use std::sync::Arc;

use crate::store::Cleanup;

pub use validate::{erase, get_store_value, subscribe, validate_store, AnyStore, ErasedReadable};
pub use value::{safe_not_equal, StoreValue};

/// Does nothing. Default invalidator for plain subscriptions.
pub fn noop() {}

/// Invoke every callback in order.
///
/// A panic in one callback propagates and the remaining callbacks are not run.
pub fn run_all<I, F>(fns: I)
where
    I: IntoIterator<Item = F>,
    F: FnOnce(),
{
    for f in fns {
        f();
    }
}

/// Whether an untyped value is one of the callable shapes the crate passes around.
pub fn is_function(thing: &dyn Any) -> bool {
    thing.is::<Cleanup>()
        || thing.is::<Box<dyn Fn() + Send + Sync>>()
        || thing.is::<Arc<dyn Fn() + Send + Sync>>()
        || thing.is::<fn()>()
}
