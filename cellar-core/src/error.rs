//! Error Types
//!
//! Most store failures are user callbacks panicking, and those propagate
//! synchronously through whichever `set` or `subscribe` triggered them.
//! The errors below cover the dynamic integration boundary, where a value
//! only claims to be a store.

/// Errors surfaced by the store utilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A value passed where a store was expected has no `subscribe` capability.
    #[error("'{name}' is not a store with a 'subscribe' method")]
    NotAStore { name: String },

    /// A store did not deliver its value synchronously on subscribe.
    #[error("store did not deliver a value on subscribe")]
    Unset,
}

/// Convenience alias for results carrying a [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
