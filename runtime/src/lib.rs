//! # Tradew Inventory Runtime
//!
//! The moving parts of the inventory write side:
//!
//! - [`service::InventoryService`]: the reservation and trade-settlement engine
//! - [`dispatch::DispatchWorker`]: outbox workers announcing pending changes
//! - [`context::RequestContext`]: correlation id and deadline of a unit of work
//! - [`retry`]: bounded conflict retries with backoff
//! - [`metrics`]: Prometheus recorders and exporter
//!
//! Storage and broker are injected as `Arc<dyn ItemStore>` and
//! `Arc<dyn EventPublisher>` (see `tradew-inventory-core`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tradew_inventory_core::environment::{SystemClock, UuidGenerator};
//! use tradew_inventory_core::{CreateItemsRequest, ItemStore, NewItemRequest, OwnerId};
//! use tradew_inventory_runtime::{InventoryService, RequestContext};
//!
//! # async fn example(store: Arc<dyn ItemStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let service = InventoryService::new(store, Arc::new(SystemClock), Arc::new(UuidGenerator));
//!
//! let created = service
//!     .create_items(
//!         &RequestContext::new(),
//!         &OwnerId::new("alice"),
//!         &CreateItemsRequest {
//!             items: vec![NewItemRequest {
//!                 name: "Iron Sword".to_string(),
//!                 description: None,
//!                 quantity: 5,
//!             }],
//!         },
//!     )
//!     .await?;
//! assert_eq!(created.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dispatch;
pub mod metrics;
pub mod retry;
pub mod service;

pub use context::{DeadlineExceeded, RequestContext};
pub use dispatch::{DispatchError, DispatchReport, DispatchWorker, StatusFlipCause};
pub use retry::RetryPolicy;
pub use service::{InventoryService, TradeSettlement};
