//! The reservation service: create, update, lock, trade and delete item stacks.
//!
//! Each operation is one read-validate-mutate-persist cycle:
//!
//! - requests are validated before any I/O
//! - domain rules run on in-memory aggregates; any failure aborts the cycle
//! - exactly one storage write persists the result, leaving items pending dispatch
//!
//! Only `Available` items take new mutations: an item still pending dispatch
//! fails the cycle with [`InventoryError::PendingDispatch`], so its previous
//! change is announced before it can be overwritten.
//!
//! Writes are version-checked. When storage reports a conflict the whole cycle
//! is re-run from a fresh read, up to the configured [`RetryPolicy`]; after that
//! the caller gets [`InventoryError::ConcurrencyConflict`].

use crate::context::RequestContext;
use crate::metrics::InventoryMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tradew_inventory_core::environment::{Clock, IdGenerator};
use tradew_inventory_core::{
    CreateItemsRequest, DeleteItemsRequest, InventoryError, Item, ItemChangeSet,
    ItemQuantityRequest, ItemId, ItemQuantity, ItemRef, ItemStatus, ItemStore, LockItemsRequest,
    OwnerId, Remainder, TradeItemsRequest, UpdateItemsRequest,
};

/// Result of a settled trade.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TradeSettlement {
    /// Stacks minted for the new owners
    pub minted: Vec<Item>,
    /// Remainders that kept units (versions as persisted)
    pub updated: Vec<Item>,
    /// Stacks that were exhausted and deleted
    pub deleted: Vec<ItemId>,
}

/// Write-side inventory operations over an [`ItemStore`].
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    retry: RetryPolicy,
}

impl InventoryService {
    /// Create a service with the default conflict retry policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create stacks for `owner_id`, all in `PendingCreateDispatch`.
    ///
    /// # Errors
    ///
    /// - `Validation`: empty request, short name, non-positive quantity
    /// - `Storage`: the insert failed (nothing persisted)
    /// - `DeadlineExceeded`
    #[tracing::instrument(
        skip_all,
        fields(
            owner_id = %owner_id,
            correlation_id = %ctx.correlation_id(),
            item_count = request.items.len(),
        )
    )]
    pub async fn create_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &CreateItemsRequest,
    ) -> Result<Vec<Item>, InventoryError> {
        request.validate()?;

        let now = self.clock.now();
        let items = request
            .items
            .iter()
            .map(|new_item| {
                Item::new(
                    ItemId::new(self.ids.next_id()),
                    owner_id.clone(),
                    &new_item.name,
                    new_item.description.as_deref(),
                    new_item.quantity,
                    ItemStatus::PendingCreateDispatch,
                    now,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        ctx.ensure_live()?;
        ctx.run(self.store.insert_bulk(items.clone())).await??;

        InventoryMetrics::record_created(items.len());
        tracing::info!("Items created");
        Ok(items)
    }

    /// Update stacks owned by `owner_id`; ids owned by someone else are skipped.
    ///
    /// # Errors
    ///
    /// - `Validation`: bad request or invalid new values
    /// - `Capacity`: a new quantity is below the stack's locked sum
    /// - `PendingDispatch`: an owned item's last change isn't announced yet
    /// - `Storage`, `ConcurrencyConflict`, `DeadlineExceeded`
    #[tracing::instrument(
        skip_all,
        fields(
            owner_id = %owner_id,
            correlation_id = %ctx.correlation_id(),
            item_count = request.items.len(),
        )
    )]
    pub async fn update_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &UpdateItemsRequest,
    ) -> Result<Vec<Item>, InventoryError> {
        request.validate()?;
        self.with_conflict_retry("update_items", || {
            self.try_update_items(ctx, owner_id, request)
        })
        .await
    }

    async fn try_update_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &UpdateItemsRequest,
    ) -> Result<Vec<Item>, InventoryError> {
        let mut items = self.load(ctx, owner_id, request.ids()).await?;
        if items.is_empty() {
            tracing::debug!("No owned items to update");
            return Ok(items);
        }
        ensure_dispatched(&items)?;

        let updates: HashMap<&ItemId, _> =
            request.items.iter().map(|update| (&update.id, update)).collect();
        let now = self.clock.now();
        for item in &mut items {
            let Some(update) = updates.get(item.id()) else {
                continue;
            };
            item.update(
                &update.name,
                update.description.as_deref(),
                update.quantity,
                now,
            )?;
        }

        ctx.ensure_live()?;
        ctx.run(self.store.update_bulk(items.clone())).await??;

        tracing::info!(updated = items.len(), "Items updated");
        Ok(bump_versions(items))
    }

    /// Lock the caller's offered stacks for `request.locked_by`.
    ///
    /// Wanted items are only checked to exist under their owner.
    ///
    /// # Errors
    ///
    /// - `Validation`: bad request
    /// - `InvalidWantedItems` / `InvalidOfferedItems`: referenced stacks missing
    /// - `Capacity`: a lock doesn't fit the unlocked quantity
    /// - `PendingDispatch`: an offered item's last change isn't announced yet
    /// - `Storage`, `ConcurrencyConflict`, `DeadlineExceeded`
    #[tracing::instrument(
        skip_all,
        fields(
            owner_id = %owner_id,
            correlation_id = %ctx.correlation_id(),
            locked_by = %request.locked_by,
            item_count = request.offered_items.len(),
        )
    )]
    pub async fn lock_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &LockItemsRequest,
    ) -> Result<Vec<Item>, InventoryError> {
        request.validate()?;
        self.with_conflict_retry("lock_items", || self.try_lock_items(ctx, owner_id, request))
            .await
    }

    async fn try_lock_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &LockItemsRequest,
    ) -> Result<Vec<Item>, InventoryError> {
        let wanted_ids = ids_of(&request.wanted_items);
        let wanted = self
            .load(ctx, &request.wanted_items_owner_id, wanted_ids)
            .await?;
        if wanted.len() != request.wanted_items.len() {
            return Err(InventoryError::InvalidWantedItems {
                owner_id: request.wanted_items_owner_id.clone(),
                requested: request.wanted_items.len(),
                found: wanted.len(),
            });
        }

        let mut offered = self
            .load(ctx, owner_id, ids_of(&request.offered_items))
            .await?;
        if offered.len() != request.offered_items.len() {
            return Err(InventoryError::InvalidOfferedItems {
                owner_id: owner_id.clone(),
                requested: request.offered_items.len(),
                found: offered.len(),
            });
        }
        ensure_dispatched(&offered)?;

        let quantities = quantities_of(&request.offered_items);
        let now = self.clock.now();
        for item in &mut offered {
            let quantity = quantities.get(item.id()).copied().unwrap_or_default();
            item.lock(&request.locked_by, quantity, now)?;
        }

        ctx.ensure_live()?;
        ctx.run(self.store.update_bulk(offered.clone())).await??;

        InventoryMetrics::record_locked(offered.len());
        tracing::info!("Items locked");
        Ok(bump_versions(offered))
    }

    /// Settle a locked trade by swapping ownership of the agreed quantities.
    ///
    /// Offered stacks give up the quantity recorded in their lock under
    /// `trade_id`; wanted stacks give up the requested quantity. Every unit
    /// taken is minted as a new stack for the other party. Remainders that
    /// reach zero are deleted. Everything is persisted by one `commit`.
    ///
    /// # Errors
    ///
    /// - `Validation`: bad request, missing lock, wanted quantity above total
    /// - `InvalidOfferedItems` / `InvalidWantedItems`: referenced stacks missing
    /// - `Capacity`: a wanted quantity would eat into locked units
    /// - `PendingDispatch`: a traded item's last change isn't announced yet
    /// - `Storage`, `ConcurrencyConflict`, `DeadlineExceeded`
    #[tracing::instrument(
        skip_all,
        fields(
            owner_id = %request.owner_id,
            correlation_id = %ctx.correlation_id(),
            trade_id = %request.trade_id,
        )
    )]
    pub async fn trade_items(
        &self,
        ctx: &RequestContext,
        request: &TradeItemsRequest,
    ) -> Result<TradeSettlement, InventoryError> {
        request.validate()?;
        self.with_conflict_retry("trade_items", || self.try_trade_items(ctx, request))
            .await
    }

    async fn try_trade_items(
        &self,
        ctx: &RequestContext,
        request: &TradeItemsRequest,
    ) -> Result<TradeSettlement, InventoryError> {
        let offered = self
            .load(ctx, &request.owner_id, ids_of(&request.offered_items))
            .await?;
        if offered.len() != request.offered_items.len() {
            return Err(InventoryError::InvalidOfferedItems {
                owner_id: request.owner_id.clone(),
                requested: request.offered_items.len(),
                found: offered.len(),
            });
        }

        let wanted = self
            .load(
                ctx,
                &request.wanted_items_owner_id,
                ids_of(&request.wanted_items),
            )
            .await?;
        if wanted.len() != request.wanted_items.len() {
            return Err(InventoryError::InvalidWantedItems {
                owner_id: request.wanted_items_owner_id.clone(),
                requested: request.wanted_items.len(),
                found: wanted.len(),
            });
        }
        ensure_dispatched(&offered)?;
        ensure_dispatched(&wanted)?;

        let now = self.clock.now();
        let mut changes = ItemChangeSet::default();

        let offered_quantities = quantities_of(&request.offered_items);
        for mut item in offered {
            let (settled, remainder) = item.settle_lock(&request.trade_id, now)?;
            if let Some(&requested) = offered_quantities.get(item.id()) {
                if u64::try_from(requested).ok() != Some(settled.get()) {
                    tracing::warn!(
                        item_id = %item.id(),
                        requested,
                        locked = settled.get(),
                        "Offered quantity differs from the lock; settling the locked quantity"
                    );
                }
            }
            changes.insert.push(item.mint(
                ItemId::new(self.ids.next_id()),
                request.wanted_items_owner_id.clone(),
                settled,
                now,
            ));
            queue_remainder(&mut changes, item, remainder);
        }

        let wanted_quantities = quantities_of(&request.wanted_items);
        for mut item in wanted {
            let requested = wanted_quantities.get(item.id()).copied().unwrap_or_default();
            let quantity = ItemQuantity::new(requested)?;
            let remainder = item.debit(quantity, now)?;
            changes.insert.push(item.mint(
                ItemId::new(self.ids.next_id()),
                request.owner_id.clone(),
                quantity,
                now,
            ));
            queue_remainder(&mut changes, item, remainder);
        }

        ctx.ensure_live()?;
        ctx.run(self.store.commit(changes.clone())).await??;

        InventoryMetrics::record_trade_settled();
        tracing::info!(
            minted = changes.insert.len(),
            updated = changes.update.len(),
            deleted = changes.delete.len(),
            "Trade settled"
        );

        Ok(TradeSettlement {
            minted: changes.insert,
            updated: bump_versions(changes.update),
            deleted: changes.delete.into_iter().map(|r| r.id).collect(),
        })
    }

    /// Delete stacks owned by `owner_id`; other ids are ignored.
    ///
    /// Returns the ids actually deleted.
    ///
    /// # Errors
    ///
    /// - `Validation`: bad request
    /// - `Storage`, `ConcurrencyConflict`, `DeadlineExceeded`
    #[tracing::instrument(
        skip_all,
        fields(
            owner_id = %owner_id,
            correlation_id = %ctx.correlation_id(),
            item_count = request.ids.len(),
        )
    )]
    pub async fn delete_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &DeleteItemsRequest,
    ) -> Result<Vec<ItemId>, InventoryError> {
        request.validate()?;
        self.with_conflict_retry("delete_items", || {
            self.try_delete_items(ctx, owner_id, request)
        })
        .await
    }

    async fn try_delete_items(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        request: &DeleteItemsRequest,
    ) -> Result<Vec<ItemId>, InventoryError> {
        let items = self.load(ctx, owner_id, request.ids.clone()).await?;
        if items.is_empty() {
            tracing::debug!("No owned items to delete");
            return Ok(Vec::new());
        }

        let refs: Vec<ItemRef> = items.iter().map(ItemRef::from).collect();
        let deleted = refs.iter().map(|r| r.id.clone()).collect::<Vec<_>>();

        ctx.ensure_live()?;
        ctx.run(self.store.delete_bulk(refs)).await??;

        tracing::info!(deleted = deleted.len(), "Items deleted");
        Ok(deleted)
    }

    async fn load(
        &self,
        ctx: &RequestContext,
        owner_id: &OwnerId,
        ids: Vec<ItemId>,
    ) -> Result<Vec<Item>, InventoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(ctx.run(self.store.get(Some(owner_id.clone()), ids)).await??)
    }

    async fn with_conflict_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, InventoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InventoryError>>,
    {
        let result = retry_with_predicate(
            &self.retry,
            || {
                let cycle = attempt();
                async move {
                    let result = cycle.await;
                    if result.as_ref().is_err_and(InventoryError::is_conflict) {
                        InventoryMetrics::record_conflict(operation);
                    }
                    result
                }
            },
            InventoryError::is_conflict,
        )
        .await;

        match result {
            Err(e) if e.is_conflict() => Err(InventoryError::ConcurrencyConflict {
                operation,
                attempts: self.retry.max_attempts(),
            }),
            other => other,
        }
    }
}

fn ensure_dispatched(items: &[Item]) -> Result<(), InventoryError> {
    match items.iter().find(|item| item.status().is_pending()) {
        Some(item) => Err(InventoryError::PendingDispatch {
            item_id: item.id().clone(),
            status: item.status(),
        }),
        None => Ok(()),
    }
}

fn ids_of(entries: &[ItemQuantityRequest]) -> Vec<ItemId> {
    entries.iter().map(|entry| entry.id.clone()).collect()
}

fn quantities_of(entries: &[ItemQuantityRequest]) -> HashMap<&ItemId, i64> {
    entries
        .iter()
        .map(|entry| (&entry.id, entry.quantity))
        .collect()
}

fn queue_remainder(changes: &mut ItemChangeSet, item: Item, remainder: Remainder) {
    match remainder {
        Remainder::Kept => changes.update.push(item),
        Remainder::Exhausted => changes.delete.push(ItemRef::from(&item)),
    }
}

/// Stored versions move by one on every successful update.
fn bump_versions(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| {
            let next = item.version().next();
            item.with_version(next)
        })
        .collect()
}
