//! `PostgreSQL` item store for the Tradew inventory.
//!
//! This crate provides the production implementation of the `ItemStore`
//! contract from `tradew-inventory-core`:
//!
//! - One row per item stack, locks embedded as `JSONB`
//! - Optimistic concurrency through a `version` column
//! - Every bulk call and every trade `commit` runs in one transaction
//! - Connection pooling via sqlx
//!
//! # Example
//!
//! ```no_run
//! use tradew_inventory_postgres::PostgresItemStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresItemStore::new("postgres://localhost/inventory").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod item_store;

pub use item_store::PostgresItemStore;
