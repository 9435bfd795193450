//! Request shapes accepted by the reservation service.
//!
//! Front doors deserialize these from their own wire formats. Quantities are
//! signed so that a negative number sent by a client reaches validation instead
//! of failing deserialization with an opaque message.
//!
//! Every request has a `validate()` that the service calls before any I/O:
//! empty requests, blank ids, duplicate ids within one side and non-positive
//! quantities are rejected there.

use crate::error::DomainError;
use crate::item::{ItemId, ItemQuantity, OwnerId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One stack to create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemRequest {
    /// Name, trimmed by the domain
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Initial total quantity
    pub quantity: i64,
}

/// Create one or more stacks for the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItemsRequest {
    /// Stacks to create
    pub items: Vec<NewItemRequest>,
}

impl CreateItemsRequest {
    /// Reject empty requests and non-positive quantities.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::validation("at least one item must be created"));
        }
        for item in &self.items {
            ItemQuantity::new(item.quantity)?;
        }
        Ok(())
    }
}

/// New values for one existing stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdateRequest {
    /// Stack to update
    pub id: ItemId,
    /// New name
    pub name: String,
    /// New description (absent clears it)
    #[serde(default)]
    pub description: Option<String>,
    /// New total quantity
    pub quantity: i64,
}

/// Update stacks owned by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemsRequest {
    /// Updates, at most one per item
    pub items: Vec<ItemUpdateRequest>,
}

impl UpdateItemsRequest {
    /// Ids referenced by the request, in request order.
    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Reject empty requests, blank or duplicate ids and non-positive quantities.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::validation("at least one item must be updated"));
        }
        ensure_unique_ids("items", self.items.iter().map(|item| &item.id))?;
        for item in &self.items {
            ItemQuantity::new(item.quantity)?;
        }
        Ok(())
    }
}

/// An item id paired with a quantity (one side of a lock or trade).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantityRequest {
    /// Referenced stack
    pub id: ItemId,
    /// Units involved
    pub quantity: i64,
}

impl ItemQuantityRequest {
    /// Build a request entry.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }
}

/// Reserve offered units for a proposed trade.
///
/// Wanted items are only checked for existence under their owner; offered items
/// get a lock recorded under `locked_by`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockItemsRequest {
    /// Trade/process taking the locks
    pub locked_by: String,
    /// Counterparty owning the wanted items
    pub wanted_items_owner_id: OwnerId,
    /// Caller's items to lock
    pub offered_items: Vec<ItemQuantityRequest>,
    /// Counterparty items the caller wants
    #[serde(default)]
    pub wanted_items: Vec<ItemQuantityRequest>,
}

impl LockItemsRequest {
    /// Reject a blank `locked_by`, an empty offer, bad ids and bad quantities.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.locked_by.trim().is_empty() {
            return Err(DomainError::validation("lock owner cannot be empty"));
        }
        if self.offered_items.is_empty() {
            return Err(DomainError::validation("at least one offered item must be locked"));
        }
        validate_side("offered_items", &self.offered_items)?;
        validate_side("wanted_items", &self.wanted_items)
    }
}

/// Settle a previously locked trade: swap ownership of the agreed quantities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeItemsRequest {
    /// Trade id; offered locks were recorded under it
    pub trade_id: String,
    /// Party that offered items (and locked them)
    pub owner_id: OwnerId,
    /// Counterparty that owns the wanted items
    pub wanted_items_owner_id: OwnerId,
    /// Offered stacks; quantity comes from the stored lock
    pub offered_items: Vec<ItemQuantityRequest>,
    /// Wanted stacks and the quantity taken from each
    #[serde(default)]
    pub wanted_items: Vec<ItemQuantityRequest>,
}

impl TradeItemsRequest {
    /// Reject a blank trade id, a self-trade, an empty trade, bad ids and bad
    /// quantities.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.trade_id.trim().is_empty() {
            return Err(DomainError::validation("trade id cannot be empty"));
        }
        if self.owner_id == self.wanted_items_owner_id {
            return Err(DomainError::validation(format!(
                "owner {} cannot trade with itself",
                self.owner_id
            )));
        }
        if self.offered_items.is_empty() && self.wanted_items.is_empty() {
            return Err(DomainError::validation("a trade must reference at least one item"));
        }
        validate_side("offered_items", &self.offered_items)?;
        validate_side("wanted_items", &self.wanted_items)
    }
}

/// Delete stacks owned by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItemsRequest {
    /// Stacks to delete
    pub ids: Vec<ItemId>,
}

impl DeleteItemsRequest {
    /// Reject empty requests and blank or duplicate ids.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.ids.is_empty() {
            return Err(DomainError::validation("at least one item must be deleted"));
        }
        ensure_unique_ids("ids", self.ids.iter())
    }
}

fn validate_side(side: &str, entries: &[ItemQuantityRequest]) -> Result<(), DomainError> {
    ensure_unique_ids(side, entries.iter().map(|entry| &entry.id))?;
    for entry in entries {
        ItemQuantity::new(entry.quantity)?;
    }
    Ok(())
}

fn ensure_unique_ids<'a>(
    side: &str,
    ids: impl IntoIterator<Item = &'a ItemId>,
) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.as_str().trim().is_empty() {
            return Err(DomainError::validation(format!("{side}: item id cannot be empty")));
        }
        if !seen.insert(id) {
            return Err(DomainError::validation(format!("{side}: duplicate item id {id}")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lock_request() -> LockItemsRequest {
        LockItemsRequest {
            locked_by: "trade-1".to_string(),
            wanted_items_owner_id: OwnerId::new("bob"),
            offered_items: vec![ItemQuantityRequest::new("sword", 2)],
            wanted_items: vec![ItemQuantityRequest::new("shield", 1)],
        }
    }

    #[test]
    fn create_request_needs_items_with_positive_quantities() {
        let empty = CreateItemsRequest { items: vec![] };
        assert!(empty.validate().is_err());

        let negative = CreateItemsRequest {
            items: vec![NewItemRequest {
                name: "Sword".to_string(),
                description: None,
                quantity: -1,
            }],
        };
        assert!(matches!(negative.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn duplicate_ids_within_one_side_are_rejected() {
        let mut request = lock_request();
        request.offered_items.push(ItemQuantityRequest::new("sword", 1));

        let err = request.validate().unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("offered_items: duplicate item id sword".to_string())
        );
    }

    #[test]
    fn the_same_id_may_appear_on_both_sides() {
        let mut request = lock_request();
        request.wanted_items = vec![ItemQuantityRequest::new("sword", 1)];
        assert!(request.validate().is_ok());
    }

    #[test]
    fn lock_request_requires_owner_and_offer() {
        let mut blank_owner = lock_request();
        blank_owner.locked_by = "  ".to_string();
        assert!(blank_owner.validate().is_err());

        let mut no_offer = lock_request();
        no_offer.offered_items.clear();
        assert!(no_offer.validate().is_err());
    }

    #[test]
    fn trade_request_needs_at_least_one_item() {
        let request = TradeItemsRequest {
            trade_id: "trade-1".to_string(),
            owner_id: OwnerId::new("alice"),
            wanted_items_owner_id: OwnerId::new("bob"),
            offered_items: vec![],
            wanted_items: vec![],
        };
        assert!(request.validate().is_err());

        let gift = TradeItemsRequest {
            offered_items: vec![ItemQuantityRequest::new("sword", 1)],
            ..request
        };
        assert!(gift.validate().is_ok());

        let self_trade = TradeItemsRequest {
            wanted_items_owner_id: OwnerId::new("alice"),
            ..gift
        };
        assert!(self_trade.validate().is_err());
    }

    #[test]
    fn delete_request_rejects_blank_ids() {
        let request = DeleteItemsRequest {
            ids: vec![ItemId::new("sword"), ItemId::new("")],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn requests_deserialize_from_snake_case_json() {
        let json = r#"{
            "locked_by": "trade-9",
            "wanted_items_owner_id": "bob",
            "offered_items": [{"id": "sword", "quantity": 3}]
        }"#;
        let request: LockItemsRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.offered_items[0].quantity, 3);
        assert!(request.wanted_items.is_empty());
        assert!(request.validate().is_ok());
    }
}
