//! Storage contract for item stacks.
//!
//! The reservation service and the dispatch workers only talk to storage through
//! [`ItemStore`]. Writes that touch existing rows are version-checked: the
//! caller passes the version it read, and the store rejects the whole call with
//! [`StoreError::Conflict`] if any row moved on in the meantime.
//!
//! # Implementations
//!
//! - `PostgresItemStore` (in `tradew-inventory-postgres`): production storage
//! - `InMemoryItemStore` (in `tradew-inventory-testing`): fast, deterministic tests

use crate::item::{Item, ItemId, ItemStatus, OwnerId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the stored row is not at the expected version.
    ///
    /// `actual` is `None` when the row no longer exists.
    #[error(
        "Concurrency conflict on item {item_id}: expected version {expected}, found {}",
        stored_version(.actual)
    )]
    Conflict {
        /// The item whose version moved on
        item_id: ItemId,
        /// The version the caller read
        expected: Version,
        /// The version currently stored, if the row exists
        actual: Option<Version>,
    },

    /// Insert of an id that already exists.
    #[error("Item already exists: {0}")]
    Duplicate(ItemId),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn stored_version(actual: &Option<Version>) -> String {
    actual.map_or_else(|| "none".to_string(), |version| version.to_string())
}

/// An item reference carrying the version last read (used for deletes).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemRef {
    /// Item id
    pub id: ItemId,
    /// Version the caller read
    pub version: Version,
}

impl From<&Item> for ItemRef {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id().clone(),
            version: item.version(),
        }
    }
}

/// Writes applied together by [`ItemStore::commit`], in field order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemChangeSet {
    /// Mutated items, version-checked
    pub update: Vec<Item>,
    /// New items
    pub insert: Vec<Item>,
    /// Items to remove, version-checked
    pub delete: Vec<ItemRef>,
}

impl ItemChangeSet {
    /// Whether the change set writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.insert.is_empty() && self.delete.is_empty()
    }
}

/// Storage abstraction for item stacks.
///
/// All calls are cancellable by dropping the returned future; callers bound
/// them with a deadline.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn ItemStore>` by the service and the workers.
pub trait ItemStore: Send + Sync {
    /// Atomically persist newly created items.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: an id already exists (nothing is written)
    /// - `Database` / `Serialization`: storage failure
    fn insert_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Atomically replace mutable fields and locks of existing items.
    ///
    /// Each item's version must equal the stored one; on success every stored
    /// version is incremented by one.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a version mismatch or a missing row (nothing is written)
    /// - `Database` / `Serialization`: storage failure
    fn update_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Atomically delete items by reference.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a version mismatch or a missing row (nothing is deleted)
    /// - `Database`: storage failure
    fn delete_bulk(
        &self,
        refs: Vec<ItemRef>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Fetch items by id, optionally restricted to one owner.
    ///
    /// Results follow request order and duplicate ids collapse to one item.
    /// Missing ids (or ids owned by someone else) are simply absent, so a count
    /// mismatch means "not all items exist under that owner".
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: storage failure
    fn get(
        &self,
        owner_id: Option<OwnerId>,
        ids: Vec<ItemId>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>>;

    /// Fetch every item in `status`, ordered by `updated_at` then id.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: storage failure
    fn get_by_status(
        &self,
        status: ItemStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>>;

    /// Apply a change set all-or-nothing: updates, then inserts, then deletes.
    ///
    /// # Errors
    ///
    /// Any error of the three bulk operations; nothing is written on failure.
    fn commit(
        &self,
        changes: ItemChangeSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}
