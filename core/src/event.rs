//! Outbound event payloads and the dispatch kinds that produce them.
//!
//! Every committed mutation leaves items in a pending status. For each pending
//! status there is exactly one [`DispatchKind`], and the kind decides the event
//! type and payload shape:
//!
//! | Kind | Pending status | Event type |
//! |---|---|---|
//! | `Created` | `PendingCreateDispatch` | `ItemsCreated.v1` |
//! | `Updated` | `PendingUpdateDispatch` | `ItemsUpdated.v1` |
//! | `Locked` | `PendingLockDispatch` | `ItemsLockCompleted.v1` |
//!
//! Payloads are JSON (snake_case fields, RFC 3339 timestamps) because their
//! consumers are not necessarily Rust services.
//!
//! # Idempotency
//!
//! Each payload entry carries `"{item_id}@{version}"`. The envelope key is a
//! UUID v5 over the event type and the sorted entry keys, so re-publishing the
//! same pending batch (after a failed status flip) yields the same key.

use crate::item::{Item, ItemStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Error types for event payload operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize a payload to bytes.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize a payload from bytes.
    #[error("Failed to deserialize event: {0}")]
    Deserialization(String),
}

/// Per-item idempotency key: `"{item_id}@{version}"`.
#[must_use]
pub fn item_idempotency_key(item: &Item) -> String {
    format!("{}@{}", item.id(), item.version())
}

// ============================================================================
// Payloads
// ============================================================================

/// One created stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreatedEntry {
    /// Item id
    pub id: String,
    /// Owner id
    pub owner_id: String,
    /// Name
    pub name: String,
    /// Description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Total units
    pub total_quantity: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// `"{item_id}@{version}"`
    pub idempotency_key: String,
}

/// Payload of `ItemsCreated.v1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsCreatedEvent {
    /// Created stacks
    pub items: Vec<ItemCreatedEntry>,
}

/// One updated (or traded) stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdatedEntry {
    /// Item id
    pub id: String,
    /// Owner id
    pub owner_id: String,
    /// Name
    pub name: String,
    /// Description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Total units
    pub total_quantity: u64,
    /// Units currently reserved by locks
    pub locked_quantity: u64,
    /// Time of the last mutation
    pub updated_at: DateTime<Utc>,
    /// `"{item_id}@{version}"`
    pub idempotency_key: String,
}

/// Payload of `ItemsUpdated.v1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsUpdatedEvent {
    /// Updated stacks
    pub items: Vec<ItemUpdatedEntry>,
}

/// One lock held on a stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLockEntry {
    /// Locked stack
    pub item_id: String,
    /// Trade/process holding the lock
    pub locked_by: String,
    /// Reserved units
    pub quantity: u64,
    /// Time of the last mutation of the stack
    pub updated_at: DateTime<Utc>,
    /// `"{item_id}@{version}"` of the stack
    pub idempotency_key: String,
}

/// Payload of `ItemsLockCompleted.v1`: one entry per lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsLockCompletedEvent {
    /// Locks of every pending stack
    pub items: Vec<ItemLockEntry>,
}

impl ItemsCreatedEvent {
    /// Build the payload for a batch of items.
    #[must_use]
    pub fn from_items(items: &[Item]) -> Self {
        Self {
            items: items
                .iter()
                .map(|item| ItemCreatedEntry {
                    id: item.id().to_string(),
                    owner_id: item.owner_id().to_string(),
                    name: item.name().to_string(),
                    description: item.description().map(ToString::to_string),
                    total_quantity: item.total_quantity().get(),
                    created_at: item.created_at(),
                    idempotency_key: item_idempotency_key(item),
                })
                .collect(),
        }
    }
}

impl ItemsUpdatedEvent {
    /// Build the payload for a batch of items.
    #[must_use]
    pub fn from_items(items: &[Item]) -> Self {
        Self {
            items: items
                .iter()
                .map(|item| ItemUpdatedEntry {
                    id: item.id().to_string(),
                    owner_id: item.owner_id().to_string(),
                    name: item.name().to_string(),
                    description: item.description().map(ToString::to_string),
                    total_quantity: item.total_quantity().get(),
                    locked_quantity: item.locked_quantity(),
                    updated_at: item.updated_at(),
                    idempotency_key: item_idempotency_key(item),
                })
                .collect(),
        }
    }
}

impl ItemsLockCompletedEvent {
    /// Build the payload for a batch of items, flattening their locks.
    #[must_use]
    pub fn from_items(items: &[Item]) -> Self {
        Self {
            items: items
                .iter()
                .flat_map(|item| {
                    let key = item_idempotency_key(item);
                    item.locks().iter().map(move |lock| ItemLockEntry {
                        item_id: item.id().to_string(),
                        locked_by: lock.locked_by().to_string(),
                        quantity: lock.quantity().get(),
                        updated_at: item.updated_at(),
                        idempotency_key: key.clone(),
                    })
                })
                .collect(),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A serialized event ready for the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEvent {
    /// Versioned type, e.g. `"ItemsCreated.v1"`
    pub event_type: String,
    /// Stable key for consumer-side deduplication
    pub idempotency_key: String,
    /// Correlation id of the run that produced the event
    pub correlation_id: Option<String>,
    /// When the event was built
    pub occurred_at: DateTime<Utc>,
    /// JSON payload
    pub payload: Vec<u8>,
}

impl OutboundEvent {
    /// Deserialize the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the payload is not a `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

/// The three outbox dispatch flows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Announces created stacks.
    Created,
    /// Announces updated, traded and minted stacks.
    Updated,
    /// Announces new locks.
    Locked,
}

impl DispatchKind {
    /// Every kind, in dispatch order.
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Locked];

    /// The status this kind drains.
    #[must_use]
    pub const fn pending_status(self) -> ItemStatus {
        match self {
            Self::Created => ItemStatus::PendingCreateDispatch,
            Self::Updated => ItemStatus::PendingUpdateDispatch,
            Self::Locked => ItemStatus::PendingLockDispatch,
        }
    }

    /// Versioned event type published by this kind.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Created => "ItemsCreated.v1",
            Self::Updated => "ItemsUpdated.v1",
            Self::Locked => "ItemsLockCompleted.v1",
        }
    }

    /// Short name used in logs, metrics labels and the worker CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Locked => "locked",
        }
    }

    /// Build one envelope for a whole pending batch.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload can't be encoded.
    pub fn build_event(
        self,
        items: &[Item],
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
    ) -> Result<OutboundEvent, EventError> {
        let payload = match self {
            Self::Created => serde_json::to_vec(&ItemsCreatedEvent::from_items(items)),
            Self::Updated => serde_json::to_vec(&ItemsUpdatedEvent::from_items(items)),
            Self::Locked => serde_json::to_vec(&ItemsLockCompletedEvent::from_items(items)),
        }
        .map_err(|e| EventError::Serialization(e.to_string()))?;

        Ok(OutboundEvent {
            event_type: self.event_type().to_string(),
            idempotency_key: self.batch_key(items),
            correlation_id,
            occurred_at,
            payload,
        })
    }

    fn batch_key(self, items: &[Item]) -> String {
        let mut keys: Vec<String> = items.iter().map(item_idempotency_key).collect();
        keys.sort_unstable();

        let name = format!("{}|{}", self.event_type(), keys.join(","));
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DispatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown dispatch kind: {s}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::item::{ItemId, OwnerId, Version};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn item(id: &str, quantity: i64, status: ItemStatus) -> Item {
        Item::new(
            ItemId::new(id),
            OwnerId::new("alice"),
            "Iron Sword",
            None,
            quantity,
            status,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn kinds_map_onto_statuses_and_types() {
        assert_eq!(
            DispatchKind::Created.pending_status(),
            ItemStatus::PendingCreateDispatch
        );
        assert_eq!(
            DispatchKind::Updated.pending_status(),
            ItemStatus::PendingUpdateDispatch
        );
        assert_eq!(
            DispatchKind::Locked.pending_status(),
            ItemStatus::PendingLockDispatch
        );
        assert_eq!(DispatchKind::Locked.event_type(), "ItemsLockCompleted.v1");
        assert_eq!("updated".parse::<DispatchKind>(), Ok(DispatchKind::Updated));
        assert!("all".parse::<DispatchKind>().is_err());
    }

    #[test]
    fn created_payload_uses_snake_case_and_omits_missing_description() {
        let items = vec![item("sword", 5, ItemStatus::PendingCreateDispatch)];
        let event = DispatchKind::Created
            .build_event(&items, now(), Some("corr-1".to_string()))
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&event.payload).unwrap();
        let entry = &json["items"][0];
        assert_eq!(entry["id"], "sword");
        assert_eq!(entry["owner_id"], "alice");
        assert_eq!(entry["total_quantity"], 5);
        assert_eq!(entry["created_at"], "2025-03-01T12:00:00Z");
        assert_eq!(entry["idempotency_key"], "sword@0");
        assert!(entry.get("description").is_none());
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn lock_payload_has_one_entry_per_lock() {
        let mut sword = item("sword", 10, ItemStatus::Available);
        sword.lock("trade-1", 2, now()).unwrap();
        sword.lock("trade-2", 3, now()).unwrap();
        let mut shield = item("shield", 1, ItemStatus::Available);
        shield.lock("trade-1", 1, now()).unwrap();

        let event = DispatchKind::Locked
            .build_event(&[sword, shield], now(), None)
            .unwrap();
        let payload: ItemsLockCompletedEvent = event.decode_payload().unwrap();

        let locks: Vec<_> = payload
            .items
            .iter()
            .map(|entry| (entry.item_id.as_str(), entry.locked_by.as_str(), entry.quantity))
            .collect();
        assert_eq!(
            locks,
            vec![
                ("sword", "trade-1", 2),
                ("sword", "trade-2", 3),
                ("shield", "trade-1", 1)
            ]
        );
    }

    #[test]
    fn updated_payload_reports_locked_quantity() {
        let mut sword = item("sword", 10, ItemStatus::Available);
        sword.lock("trade-1", 4, now()).unwrap();

        let event = DispatchKind::Updated
            .build_event(&[sword], now(), None)
            .unwrap();
        let payload: ItemsUpdatedEvent = event.decode_payload().unwrap();

        assert_eq!(payload.items[0].total_quantity, 10);
        assert_eq!(payload.items[0].locked_quantity, 4);
    }

    #[test]
    fn batch_key_ignores_order_but_tracks_versions() {
        let a = item("a", 1, ItemStatus::PendingUpdateDispatch);
        let b = item("b", 1, ItemStatus::PendingUpdateDispatch);

        let forward = DispatchKind::Updated
            .build_event(&[a.clone(), b.clone()], now(), None)
            .unwrap();
        let backward = DispatchKind::Updated
            .build_event(&[b.clone(), a.clone()], now(), None)
            .unwrap();
        assert_eq!(forward.idempotency_key, backward.idempotency_key);

        let bumped = DispatchKind::Updated
            .build_event(&[a.with_version(Version::new(1)), b.clone()], now(), None)
            .unwrap();
        assert_ne!(forward.idempotency_key, bumped.idempotency_key);

        let other_kind = DispatchKind::Created
            .build_event(&[b], now(), None)
            .unwrap();
        assert_ne!(forward.idempotency_key, other_kind.idempotency_key);
    }
}
