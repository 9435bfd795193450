//! Error taxonomy for the inventory write side.
//!
//! - [`DomainError`]: raised by pure domain operations (construction, update, lock)
//! - [`CapacityError`]: the legitimate "not enough quantity" business outcome
//! - [`InventoryError`]: everything the reservation service can return to a front door
//!
//! Validation and capacity failures are always detected before any write.

use crate::item::{ItemId, ItemStatus, OwnerId};
use crate::item_store::StoreError;
use thiserror::Error;

/// A requested reservation or resize does not fit the stack.
///
/// This is a business outcome, not a bug: the caller asked for more than the
/// stack can give.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// Locking would push the locked sum over the total quantity.
    #[error("Cannot lock {requested} units of item {item_id}: only {available} unlocked")]
    InsufficientAvailable {
        /// The item that was asked to lock
        item_id: ItemId,
        /// Quantity requested by the new lock
        requested: u64,
        /// Quantity not yet covered by locks
        available: u64,
    },

    /// The stack would shrink below what is already reserved.
    #[error("Item {item_id} cannot hold {quantity} units while {locked} are locked")]
    BelowLocked {
        /// The item being resized or debited
        item_id: ItemId,
        /// The total quantity the stack would end up with
        quantity: u64,
        /// The quantity currently reserved by locks
        locked: u64,
    },
}

/// Errors raised by the pure domain model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: bad id, name, quantity or missing lock.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested quantity exceeds what the stack allows.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

impl DomainError {
    /// Shorthand for building a [`DomainError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Errors returned by the reservation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Caller input is wrong; not retryable as-is.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested lock or update exceeds the available quantity.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Referenced wanted items don't all exist under the claimed owner.
    #[error(
        "Invalid wanted items for owner {owner_id}: requested {requested}, found {found}"
    )]
    InvalidWantedItems {
        /// The owner the wanted items were supposed to belong to
        owner_id: OwnerId,
        /// Number of distinct ids in the request
        requested: usize,
        /// Number of items the store returned for that owner
        found: usize,
    },

    /// Referenced offered items don't all exist under the caller.
    #[error(
        "Invalid offered items for owner {owner_id}: requested {requested}, found {found}"
    )]
    InvalidOfferedItems {
        /// The caller offering the items
        owner_id: OwnerId,
        /// Number of distinct ids in the request
        requested: usize,
        /// Number of items the store returned for that owner
        found: usize,
    },

    /// The item's previous change hasn't been announced yet.
    ///
    /// Retry once the dispatch worker has moved it back to `Available`.
    #[error("Item {item_id} is {status}; its last change is not dispatched yet")]
    PendingDispatch {
        /// The item still waiting for dispatch
        item_id: ItemId,
        /// Its current pending status
        status: ItemStatus,
    },

    /// The storage contract failed; may be transient.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Optimistic concurrency kept failing after the bounded retries.
    #[error("Concurrent modification in {operation} persisted after {attempts} attempts")]
    ConcurrencyConflict {
        /// The service operation that gave up
        operation: &'static str,
        /// Total number of read-validate-mutate-persist cycles attempted
        attempts: usize,
    },

    /// The caller's deadline passed; nothing was persisted after it.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl InventoryError {
    /// Whether this error is a version conflict that a fresh read may resolve.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StoreError::Conflict { .. }))
    }
}

impl From<DomainError> for InventoryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) => Self::Validation(message),
            DomainError::Capacity(capacity) => Self::Capacity(capacity),
        }
    }
}
