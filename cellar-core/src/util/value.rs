//! Change Detection
//!
//! Stores skip notification when a new value is known to equal the old one.
//! Only plain values can be known equal. Anything with internal structure
//! (collections, shared pointers, user structs) is treated as possibly
//! changed on every `set`, so mutating a value in place and setting it back
//! still notifies subscribers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A value that can live in a store.
///
/// The default [`safe_not_equal`](Self::safe_not_equal) always reports a
/// change. Implement the trait with an empty body for structured types:
///
/// ```rust
/// use cellar_core::StoreValue;
///
/// #[derive(Clone)]
/// struct Point { x: i32, y: i32 }
///
/// impl StoreValue for Point {}
/// ```
pub trait StoreValue: Clone + Send + Sync + 'static {
    /// Whether replacing `self` with `next` must notify subscribers.
    fn safe_not_equal(&self, next: &Self) -> bool {
        let _ = next;
        true
    }
}

/// Change-detection predicate used by every store's `set`.
pub fn safe_not_equal<T: StoreValue>(a: &T, b: &T) -> bool {
    a.safe_not_equal(b)
}

macro_rules! impl_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StoreValue for $ty {
                fn safe_not_equal(&self, next: &Self) -> bool {
                    self != next
                }
            }
        )*
    };
}

impl_by_value!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str,
);

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl StoreValue for $ty {
                // NaN never equals itself, but NaN replacing NaN is not a change.
                fn safe_not_equal(&self, next: &Self) -> bool {
                    if self.is_nan() {
                        !next.is_nan()
                    } else {
                        self != next
                    }
                }
            }
        )*
    };
}

impl_float!(f32, f64);

impl<T: StoreValue> StoreValue for Option<T> {
    fn safe_not_equal(&self, next: &Self) -> bool {
        match (self, next) {
            (None, None) => false,
            (Some(current), Some(next)) => current.safe_not_equal(next),
            _ => true,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> StoreValue for Vec<T> {}
impl<T: Clone + Send + Sync + 'static> StoreValue for VecDeque<T> {}
impl<T: Clone + Send + Sync + 'static> StoreValue for HashSet<T> {}
impl<T: Clone + Send + Sync + 'static> StoreValue for BTreeSet<T> {}
impl<K, V> StoreValue for HashMap<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
}
impl<K, V> StoreValue for BTreeMap<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
}
impl<T: Clone + Send + Sync + 'static> StoreValue for Box<T> {}
impl<T: ?Sized + Send + Sync + 'static> StoreValue for Arc<T> {}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Clone + Send + Sync + 'static),+> StoreValue for ($($name,)+) {}
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
impl_tuple!(A, B, C, D, E);
impl_tuple!(A, B, C, D, E, F);
