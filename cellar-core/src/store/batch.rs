//! Batched Updates
//!
//! A batch holds back the run phase of every notification wave until the
//! outermost batch closes. Invalidation still happens immediately, so a
//! derived store over several sources sees all of them pending and
//! recomputes once, after the last delivery.
//!
//! # Implementation
//!
//! We use a thread-local depth counter and an ordered queue of held-back
//! waves, keyed by store. A store that is set several times inside one batch
//! keeps a single queue entry, which delivers the store's latest value when
//! the batch is flushed.
//!
//! Invalidation has already reached every subscriber by the time a wave is
//! queued, so a queued wave is always delivered, even when the batch body
//! panics. Otherwise derived stores would stay pending on their sources.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;

/// A held-back run phase.
pub(crate) trait Deferred: Any {
    /// Deliver the wave.
    fn flush(self: Box<Self>);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queue: IndexMap<u64, Box<dyn Deferred>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Guard that closes a batch level when dropped.
struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        BATCH.with(|batch| batch.borrow_mut().depth -= 1);
    }
}

/// Run `f` with run-phase delivery deferred until the outermost batch ends.
///
/// If `f` panics, the waves it queued are still delivered once the outermost
/// batch closes, and then the panic continues.
///
/// # Example
///
/// ```rust
/// use cellar_core::{batch, derived, get, writable};
///
/// let a = writable(1);
/// let b = writable(2);
/// let sum = derived((a.clone(), b.clone()), |(x, y): &(i32, i32)| x + y);
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(get(&sum), 30);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = BatchGuard::enter();
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    drop(guard);

    if !is_batching() {
        flush();
    }
    match result {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Whether a batch is open on this thread.
pub(crate) fn is_batching() -> bool {
    BATCH.with(|batch| batch.borrow().depth > 0)
}

/// Queue a wave for `store`, or merge into the one already queued.
pub(crate) fn defer<W: Deferred>(store: u64, create: impl FnOnce() -> W, merge: impl FnOnce(&mut W)) {
    BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        let entry = batch
            .queue
            .entry(store)
            .or_insert_with(|| Box::new(create()) as Box<dyn Deferred>);
        if let Some(wave) = entry.as_any_mut().downcast_mut::<W>() {
            merge(wave);
        }
    });
}

/// Deliver queued waves in the order their stores were first set.
///
/// A panicking subscriber does not stop the remaining waves. The first
/// panic is resumed once the queue is empty.
fn flush() {
    let mut flushed = 0usize;
    let mut first_panic = None;
    loop {
        let next = BATCH.with(|batch| batch.borrow_mut().queue.shift_remove_index(0));
        let Some((_, wave)) = next else {
            break;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| wave.flush())) {
            first_panic.get_or_insert(payload);
        }
        flushed += 1;
    }
    if flushed > 0 {
        tracing::trace!(waves = flushed, "batch flushed");
    }
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
}
