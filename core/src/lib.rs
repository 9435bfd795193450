//! # Tradew Inventory Core
//!
//! Domain model and contracts for the write side of the Tradew inventory.
//!
//! The write side owns the authoritative record of tradable item stacks, their
//! ownership and their reservations (locks). Every committed mutation leaves the
//! affected items in a *pending dispatch* status; dispatch workers later announce
//! the change on the message broker and flip the items back to `Available`
//! (the outbox pattern).
//!
//! ## Modules
//!
//! - [`item`]: value objects and the [`Item`](item::Item) aggregate
//! - [`error`]: domain and service error taxonomy
//! - [`command`]: validated request shapes accepted by the reservation service
//! - [`event`]: outbound event payloads and the [`DispatchKind`](event::DispatchKind) mapping
//! - [`item_store`]: the storage contract ([`ItemStore`](item_store::ItemStore))
//! - [`event_bus`]: the broker producer contract ([`EventPublisher`](event_bus::EventPublisher))
//! - [`environment`]: injected clock and id generation
//!
//! ## Architecture Principles
//!
//! - Pure domain: no I/O in [`item`], time and ids are passed in
//! - Contracts as traits: storage and broker are injected as `Arc<dyn _>`
//! - Validate everything before the first write

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod command;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod item;
pub mod item_store;

/// Environment module - injected dependencies for deterministic behavior.
///
/// The reservation service and the dispatch workers never call `Utc::now()` or
/// generate random ids directly; they go through these traits so tests can pin
/// both.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use tradew_inventory_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// assert!(now.timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of identifiers for newly minted items.
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh, globally unique identifier.
        fn next_id(&self) -> String;
    }

    /// Random UUID v4 identifiers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}

// Re-export the types nearly every caller touches
pub use command::{
    CreateItemsRequest, DeleteItemsRequest, ItemQuantityRequest, ItemUpdateRequest,
    LockItemsRequest, NewItemRequest, TradeItemsRequest, UpdateItemsRequest,
};
pub use error::{CapacityError, DomainError, InventoryError};
pub use event::{DispatchKind, EventError, OutboundEvent};
pub use event_bus::{EventPublisher, MessageId, PublishError};
pub use item::{
    Item, ItemDescription, ItemId, ItemLock, ItemName, ItemQuantity, ItemRecord, ItemStatus,
    LockRecord, OwnerId, Remainder, Version,
};
pub use item_store::{ItemChangeSet, ItemRef, ItemStore, StoreError};

#[cfg(test)]
mod tests {
    use super::environment::{IdGenerator, UuidGenerator};

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let generator = UuidGenerator;
        let first = generator.next_id();
        let second = generator.next_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 36);
    }
}
