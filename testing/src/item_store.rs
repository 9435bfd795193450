//! In-memory item store for fast, deterministic testing.
//!
//! Implements the full storage contract: version checks, all-or-nothing bulk
//! writes and an atomic `commit`. On top of that it counts calls per operation,
//! can be told to fail upcoming calls of an operation, and can slip a
//! concurrent writer's change in right before one.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use tradew_inventory_core::{
    Item, ItemChangeSet, ItemId, ItemRef, ItemStatus, ItemStore, OwnerId, StoreError, Version,
};

/// Storage contract operations, for call counting and failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// [`ItemStore::insert_bulk`]
    InsertBulk,
    /// [`ItemStore::update_bulk`]
    UpdateBulk,
    /// [`ItemStore::delete_bulk`]
    DeleteBulk,
    /// [`ItemStore::get`]
    Get,
    /// [`ItemStore::get_by_status`]
    GetByStatus,
    /// [`ItemStore::commit`]
    Commit,
}

/// `HashMap`-backed [`ItemStore`].
///
/// # Example
///
/// ```
/// use tradew_inventory_testing::{InMemoryItemStore, StoreOperation};
/// use tradew_inventory_core::{ItemStore, ItemStatus, StoreError};
///
/// # async fn example() {
/// let store = InMemoryItemStore::new();
/// store.fail_next(StoreOperation::GetByStatus, StoreError::Database("down".into()));
///
/// assert!(store.get_by_status(ItemStatus::Available).await.is_err());
/// assert!(store.get_by_status(ItemStatus::Available).await.is_ok());
/// assert_eq!(store.calls(StoreOperation::GetByStatus), 2);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryItemStore {
    items: Arc<RwLock<HashMap<ItemId, Item>>>,
    calls: Arc<Mutex<HashMap<StoreOperation, usize>>>,
    failures: Arc<Mutex<HashMap<StoreOperation, VecDeque<StoreError>>>>,
    interleaved: Arc<Mutex<HashMap<StoreOperation, VecDeque<Vec<Item>>>>>,
}

impl InMemoryItemStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `items`, versions as given.
    #[must_use]
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        store.seed(items);
        store
    }

    /// Insert or overwrite items directly, bypassing version checks.
    pub fn seed(&self, items: impl IntoIterator<Item = Item>) {
        let mut stored = self.items.write().unwrap();
        for item in items {
            stored.insert(item.id().clone(), item);
        }
    }

    /// Make the next call of `operation` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError) {
        self.failures
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Right before the next call of `operation`, write `items` as another
    /// writer would: each stored version moves by one.
    ///
    /// Lets a test land a competing change between a read and a write.
    pub fn interleave_next(
        &self,
        operation: StoreOperation,
        items: impl IntoIterator<Item = Item>,
    ) {
        self.interleaved
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(items.into_iter().collect());
    }

    /// Number of calls made to `operation` so far.
    #[must_use]
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Number of write calls (insert, update, delete, commit).
    #[must_use]
    pub fn write_calls(&self) -> usize {
        [
            StoreOperation::InsertBulk,
            StoreOperation::UpdateBulk,
            StoreOperation::DeleteBulk,
            StoreOperation::Commit,
        ]
        .into_iter()
        .map(|operation| self.calls(operation))
        .sum()
    }

    /// The stored copy of one item.
    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<Item> {
        self.items.read().unwrap().get(id).cloned()
    }

    /// Every stored item, sorted by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.read().unwrap().values().cloned().collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    /// Every stored item owned by `owner_id`, sorted by id.
    #[must_use]
    pub fn owned_by(&self, owner_id: &OwnerId) -> Vec<Item> {
        self.snapshot()
            .into_iter()
            .filter(|item| item.owner_id() == owner_id)
            .collect()
    }

    /// Sum of `total_quantity` over every stored item.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.items
            .read()
            .unwrap()
            .values()
            .map(|item| item.total_quantity().get())
            .sum()
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }

    /// Count the call, apply any interleaved write and take any injected failure.
    fn enter(&self, operation: StoreOperation) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;

        let competing = self
            .interleaved
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        if let Some(items) = competing {
            let mut stored = self.items.write().unwrap();
            for item in items {
                let next = stored
                    .get(item.id())
                    .map_or(item.version(), Item::version)
                    .next();
                stored.insert(item.id().clone(), item.with_version(next));
            }
        }

        self.failures
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }
}

fn check_version(
    stored: &HashMap<ItemId, Item>,
    id: &ItemId,
    expected: Version,
) -> Result<(), StoreError> {
    match stored.get(id) {
        Some(item) if item.version() == expected => Ok(()),
        found => Err(StoreError::Conflict {
            item_id: id.clone(),
            expected,
            actual: found.map(Item::version),
        }),
    }
}

fn check_insertable(stored: &HashMap<ItemId, Item>, items: &[Item]) -> Result<(), StoreError> {
    let mut batch = HashSet::new();
    for item in items {
        if stored.contains_key(item.id()) || !batch.insert(item.id()) {
            return Err(StoreError::Duplicate(item.id().clone()));
        }
    }
    Ok(())
}

fn check_updatable(stored: &HashMap<ItemId, Item>, items: &[Item]) -> Result<(), StoreError> {
    items
        .iter()
        .try_for_each(|item| check_version(stored, item.id(), item.version()))
}

fn check_deletable(stored: &HashMap<ItemId, Item>, refs: &[ItemRef]) -> Result<(), StoreError> {
    refs.iter()
        .try_for_each(|r| check_version(stored, &r.id, r.version))
}

fn apply_updates(stored: &mut HashMap<ItemId, Item>, items: Vec<Item>) {
    for item in items {
        let next = item.version().next();
        stored.insert(item.id().clone(), item.with_version(next));
    }
}

impl ItemStore for InMemoryItemStore {
    fn insert_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::InsertBulk)?;
            let mut stored = self.items.write().unwrap();
            check_insertable(&stored, &items)?;
            for item in items {
                stored.insert(item.id().clone(), item);
            }
            Ok(())
        })
    }

    fn update_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateBulk)?;
            let mut stored = self.items.write().unwrap();
            check_updatable(&stored, &items)?;
            apply_updates(&mut stored, items);
            Ok(())
        })
    }

    fn delete_bulk(
        &self,
        refs: Vec<ItemRef>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::DeleteBulk)?;
            let mut stored = self.items.write().unwrap();
            check_deletable(&stored, &refs)?;
            for r in refs {
                stored.remove(&r.id);
            }
            Ok(())
        })
    }

    fn get(
        &self,
        owner_id: Option<OwnerId>,
        ids: Vec<ItemId>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::Get)?;
            let stored = self.items.read().unwrap();
            let mut seen = HashSet::new();
            Ok(ids
                .iter()
                .filter(|id| seen.insert(*id))
                .filter_map(|id| stored.get(id))
                .filter(|item| owner_id.as_ref().is_none_or(|owner| item.owner_id() == owner))
                .cloned()
                .collect())
        })
    }

    fn get_by_status(
        &self,
        status: ItemStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::GetByStatus)?;
            let mut items: Vec<Item> = self
                .items
                .read()
                .unwrap()
                .values()
                .filter(|item| item.status() == status)
                .cloned()
                .collect();
            items.sort_by(|a, b| {
                a.updated_at()
                    .cmp(&b.updated_at())
                    .then_with(|| a.id().cmp(b.id()))
            });
            Ok(items)
        })
    }

    fn commit(
        &self,
        changes: ItemChangeSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.enter(StoreOperation::Commit)?;
            let mut stored = self.items.write().unwrap();

            check_updatable(&stored, &changes.update)?;
            check_insertable(&stored, &changes.insert)?;
            check_deletable(&stored, &changes.delete)?;

            apply_updates(&mut stored, changes.update);
            for item in changes.insert {
                stored.insert(item.id().clone(), item);
            }
            for r in changes.delete {
                stored.remove(&r.id);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::test_clock;
    use tradew_inventory_core::environment::Clock;

    fn item(id: &str, owner: &str) -> Item {
        Item::new(
            ItemId::new(id),
            OwnerId::new(owner),
            "Iron Sword",
            None,
            5,
            ItemStatus::PendingCreateDispatch,
            test_clock().now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn get_filters_by_owner_and_keeps_request_order() {
        let store =
            InMemoryItemStore::with_items([item("a", "alice"), item("b", "bob"), item("c", "alice")]);

        let ids = vec![ItemId::new("c"), ItemId::new("b"), ItemId::new("a"), ItemId::new("c")];
        let found = store
            .get(Some(OwnerId::new("alice")), ids.clone())
            .await
            .unwrap();
        let found_ids: Vec<&str> = found.iter().map(|i| i.id().as_str()).collect();
        assert_eq!(found_ids, vec!["c", "a"]);

        let unfiltered = store.get(None, ids).await.unwrap();
        assert_eq!(unfiltered.len(), 3);
    }

    #[tokio::test]
    async fn stale_update_is_rejected_and_writes_nothing() {
        let store = InMemoryItemStore::with_items([item("a", "alice"), item("b", "alice")]);

        let a = store.item(&ItemId::new("a")).unwrap();
        store.update_bulk(vec![a.clone()]).await.unwrap();
        assert_eq!(store.item(&ItemId::new("a")).unwrap().version(), Version::new(1));

        let b = store.item(&ItemId::new("b")).unwrap();
        let err = store.update_bulk(vec![b, a]).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                item_id: ItemId::new("a"),
                expected: Version::new(0),
                actual: Some(Version::new(1)),
            }
        );
        assert_eq!(store.item(&ItemId::new("b")).unwrap().version(), Version::new(0));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryItemStore::with_items([item("a", "alice")]);
        let err = store
            .insert_bulk(vec![item("z", "alice"), item("a", "alice")])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Duplicate(ItemId::new("a")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = InMemoryItemStore::with_items([item("a", "alice"), item("b", "alice")]);
        let a = store.item(&ItemId::new("a")).unwrap();

        let changes = ItemChangeSet {
            update: vec![a],
            insert: vec![item("minted", "bob")],
            delete: vec![ItemRef {
                id: ItemId::new("b"),
                version: Version::new(7),
            }],
        };
        assert!(store.commit(changes).await.is_err());

        assert_eq!(store.len(), 2);
        assert!(store.item(&ItemId::new("minted")).is_none());
        assert_eq!(store.item(&ItemId::new("a")).unwrap().version(), Version::new(0));
    }

    #[tokio::test]
    async fn interleaved_write_lands_before_the_call() {
        let store = InMemoryItemStore::with_items([item("a", "alice")]);
        let read = store.item(&ItemId::new("a")).unwrap();

        let mut rival = read.clone();
        rival.update_status(ItemStatus::Available, test_clock().now());
        store.interleave_next(StoreOperation::UpdateBulk, [rival]);

        let err = store.update_bulk(vec![read]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.item(&ItemId::new("a")).unwrap();
        assert_eq!(stored.version(), Version::new(1));
        assert_eq!(stored.status(), ItemStatus::Available);
    }

    #[tokio::test]
    async fn injected_failures_fire_in_order() {
        let store = InMemoryItemStore::new();
        store.fail_next(StoreOperation::InsertBulk, StoreError::Database("down".into()));

        store.fail_next(StoreOperation::InsertBulk, StoreError::Database("still down".into()));

        assert!(store.insert_bulk(vec![item("a", "alice")]).await.is_err());
        assert!(store.insert_bulk(vec![item("a", "alice")]).await.is_err());
        assert!(store.is_empty());
        assert!(store.insert_bulk(vec![item("a", "alice")]).await.is_ok());
        assert_eq!(store.calls(StoreOperation::InsertBulk), 3);
        assert_eq!(store.write_calls(), 3);
    }
}
