//! Source Sets
//!
//! A derived store reads from a set of sources: a single store, a tuple of
//! stores with different value types, a `Vec` of stores sharing one value
//! type, or `()` for no sources at all. [`Stores`] describes how each shape
//! is subscribed to and how its latest values are collected.
//!
//! Each source owns a positional slot. Deliveries write the slot; the derived
//! store reads all slots at once when nothing is pending.

use std::sync::Arc;

use smallvec::SmallVec;

use super::readable::Readable;
use super::subscriber::Unsubscriber;

/// One or more source stores.
pub trait Stores: Send + Sync + 'static {
    /// Values handed to the derivation: a single value, a tuple, or a `Vec`.
    type Values: Send + Sync + 'static;

    /// Per-source storage for the latest delivered values.
    type Slots: Send + 'static;

    /// Number of sources.
    fn len(&self) -> usize;

    /// Whether the set has no sources.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots before any source has delivered.
    fn empty_slots(&self) -> Self::Slots;

    /// Subscribe to every source in order through `link`.
    fn subscribe_each(&self, link: &SourceLink<Self::Slots>) -> Vec<Unsubscriber>;

    /// Current values, once every slot has been filled.
    fn values(slots: &Self::Slots) -> Option<Self::Values>;
}

/// Receiver for source deliveries.
pub(crate) trait SlotSink<Sl>: Send + Sync {
    fn invalidate(&self, index: usize);

    fn deliver(&self, index: usize, write: &mut dyn FnMut(&mut Sl));
}

/// Connects source subscriptions to a derived store's slots.
pub struct SourceLink<Sl> {
    sink: Arc<dyn SlotSink<Sl>>,
}

impl<Sl: 'static> SourceLink<Sl> {
    pub(crate) fn new(sink: Arc<dyn SlotSink<Sl>>) -> Self {
        Self { sink }
    }

    /// Subscribe to `store` as source number `index`.
    ///
    /// `assign` copies a delivered value into the slots.
    pub fn subscribe<R: Readable + ?Sized>(
        &self,
        store: &R,
        index: usize,
        assign: fn(&mut Sl, usize, &R::Value),
    ) -> Unsubscriber {
        let deliver = Arc::clone(&self.sink);
        let invalidate = Arc::clone(&self.sink);

        store.subscribe_with(
            Arc::new(move |value: &R::Value| {
                deliver.deliver(index, &mut |slots: &mut Sl| assign(slots, index, value));
            }),
            Arc::new(move || invalidate.invalidate(index)),
        )
    }
}

/// Growable bitset of sources that were invalidated but have not delivered.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingMask {
    words: SmallVec<[u64; 1]>,
}

impl PendingMask {
    pub(crate) fn mark(&mut self, index: usize) {
        let word = index / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub(crate) fn clear(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1 << (index % 64));
        }
    }

    pub(crate) fn is_clear(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }
}

impl<R: Readable + 'static> Stores for R {
    type Values = R::Value;
    type Slots = Option<R::Value>;

    fn len(&self) -> usize {
        1
    }

    fn empty_slots(&self) -> Self::Slots {
        None
    }

    fn subscribe_each(&self, link: &SourceLink<Self::Slots>) -> Vec<Unsubscriber> {
        vec![link.subscribe(self, 0, |slot, _, value| *slot = Some(value.clone()))]
    }

    fn values(slots: &Self::Slots) -> Option<Self::Values> {
        slots.clone()
    }
}

impl<R: Readable + 'static> Stores for Vec<R> {
    type Values = Vec<R::Value>;
    type Slots = Vec<Option<R::Value>>;

    fn len(&self) -> usize {
        <[R]>::len(self)
    }

    fn empty_slots(&self) -> Self::Slots {
        vec![None; <[R]>::len(self)]
    }

    fn subscribe_each(&self, link: &SourceLink<Self::Slots>) -> Vec<Unsubscriber> {
        self.iter()
            .enumerate()
            .map(|(index, store)| {
                link.subscribe(store, index, |slots, index, value| {
                    slots[index] = Some(value.clone());
                })
            })
            .collect()
    }

    fn values(slots: &Self::Slots) -> Option<Self::Values> {
        slots.iter().cloned().collect()
    }
}

impl Stores for () {
    type Values = ();
    type Slots = ();

    fn len(&self) -> usize {
        0
    }

    fn empty_slots(&self) -> Self::Slots {}

    fn subscribe_each(&self, _link: &SourceLink<Self::Slots>) -> Vec<Unsubscriber> {
        Vec::new()
    }

    fn values(_slots: &Self::Slots) -> Option<Self::Values> {
        Some(())
    }
}

macro_rules! impl_stores_for_tuple {
    ($len:expr; $($idx:tt => $name:ident),+) => {
        impl<$($name: Readable + 'static),+> Stores for ($($name,)+) {
            type Values = ($($name::Value,)+);
            type Slots = ($(Option<$name::Value>,)+);

            fn len(&self) -> usize {
                $len
            }

            fn empty_slots(&self) -> Self::Slots {
                ($(None::<$name::Value>,)+)
            }

            fn subscribe_each(&self, link: &SourceLink<Self::Slots>) -> Vec<Unsubscriber> {
                vec![$(
                    link.subscribe(&self.$idx, $idx, |slots, _, value| {
                        slots.$idx = Some(value.clone());
                    }),
                )+]
            }

            fn values(slots: &Self::Slots) -> Option<Self::Values> {
                Some(($(slots.$idx.clone()?,)+))
            }
        }
    };
}

impl_stores_for_tuple!(1; 0 => A);
impl_stores_for_tuple!(2; 0 => A, 1 => B);
impl_stores_for_tuple!(3; 0 => A, 1 => B, 2 => C);
impl_stores_for_tuple!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_stores_for_tuple!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_stores_for_tuple!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
