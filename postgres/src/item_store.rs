//! `PostgresItemStore`: the `items` table behind the storage contract.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tradew_inventory_core::{
    Item, ItemChangeSet, ItemId, ItemRecord, ItemRef, ItemStatus, ItemStore, LockRecord, OwnerId,
    StoreError, Version,
};

const SELECT_ITEMS: &str = r"
    SELECT id, owner_id, name, description, total_quantity, locks,
           status, version, created_at, updated_at
    FROM items
";

/// `PostgreSQL`-backed [`ItemStore`].
///
/// Versions live in the `version` column. Updates and deletes carry the
/// version the caller read in their `WHERE` clause; a row that moved on
/// matches nothing and the whole transaction is rolled back with
/// [`StoreError::Conflict`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tradew_inventory_core::ItemStore;
/// use tradew_inventory_postgres::PostgresItemStore;
///
/// # async fn example(pool: sqlx::PgPool) {
/// let store: Arc<dyn ItemStore> = Arc::new(PostgresItemStore::from_pool(pool));
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresItemStore {
    pool: PgPool,
}

impl PostgresItemStore {
    /// Connect to `database_url` with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn transaction<F>(&self, operation: &'static str, work: F) -> Result<(), StoreError>
    where
        F: for<'c> FnOnce(
            &'c mut PgConnection,
        ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'c>>,
    {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        if let Err(e) = work(&mut *tx).await {
            if matches!(e, StoreError::Conflict { .. }) {
                metrics::counter!("item_store_conflicts_total", "operation" => operation)
                    .increment(1);
            }
            tracing::debug!(operation, error = %e, "Rolling back");
            // Dropping the transaction rolls it back.
            return Err(e);
        }

        tx.commit().await.map_err(database_error)
    }
}

impl ItemStore for PostgresItemStore {
    fn insert_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.transaction("insert_bulk", |conn| {
                Box::pin(async move { insert_rows(conn, &items).await })
            })
            .await
        })
    }

    fn update_bulk(
        &self,
        items: Vec<Item>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.transaction("update_bulk", |conn| {
                Box::pin(async move { update_rows(conn, &items).await })
            })
            .await
        })
    }

    fn delete_bulk(
        &self,
        refs: Vec<ItemRef>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.transaction("delete_bulk", |conn| {
                Box::pin(async move { delete_rows(conn, &refs).await })
            })
            .await
        })
    }

    fn get(
        &self,
        owner_id: Option<OwnerId>,
        ids: Vec<ItemId>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let raw_ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
            let rows = sqlx::query(&format!(
                "{SELECT_ITEMS} WHERE id = ANY($1) AND ($2::text IS NULL OR owner_id = $2)"
            ))
            .bind(&raw_ids)
            .bind(owner_id.as_ref().map(OwnerId::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            let mut found: HashMap<ItemId, Item> = rows
                .iter()
                .map(|row| row_to_item(row).map(|item| (item.id().clone(), item)))
                .collect::<Result<_, _>>()?;

            // Request order, duplicates collapsed.
            Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
        })
    }

    fn get_by_status(
        &self,
        status: ItemStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_ITEMS} WHERE status = $1 ORDER BY updated_at ASC, id ASC"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            rows.iter().map(row_to_item).collect()
        })
    }

    fn commit(
        &self,
        changes: ItemChangeSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.transaction("commit", |conn| {
                Box::pin(async move {
                    update_rows(conn, &changes.update).await?;
                    insert_rows(conn, &changes.insert).await?;
                    delete_rows(conn, &changes.delete).await
                })
            })
            .await
        })
    }
}

async fn insert_rows(conn: &mut PgConnection, items: &[Item]) -> Result<(), StoreError> {
    for item in items {
        let record = ItemRecord::from(item);
        sqlx::query(
            r"
            INSERT INTO items (
                id, owner_id, name, description, total_quantity, locks,
                status, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_column(record.total_quantity, "total_quantity")?)
        .bind(Json(&record.locks))
        .bind(&record.status)
        .bind(to_column(record.version, "version")?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return StoreError::Duplicate(item.id().clone());
                }
            }
            database_error(e)
        })?;
    }
    Ok(())
}

async fn update_rows(conn: &mut PgConnection, items: &[Item]) -> Result<(), StoreError> {
    for item in items {
        let record = ItemRecord::from(item);
        let result = sqlx::query(
            r"
            UPDATE items
            SET name = $3,
                description = $4,
                total_quantity = $5,
                locks = $6,
                status = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(&record.id)
        .bind(to_column(record.version, "version")?)
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_column(record.total_quantity, "total_quantity")?)
        .bind(Json(&record.locks))
        .bind(&record.status)
        .bind(record.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(conflict(conn, item.id(), item.version()).await);
        }
    }
    Ok(())
}

async fn delete_rows(conn: &mut PgConnection, refs: &[ItemRef]) -> Result<(), StoreError> {
    for item_ref in refs {
        let result = sqlx::query("DELETE FROM items WHERE id = $1 AND version = $2")
            .bind(item_ref.id.as_str())
            .bind(to_column(item_ref.version.value(), "version")?)
            .execute(&mut *conn)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(conflict(conn, &item_ref.id, item_ref.version).await);
        }
    }
    Ok(())
}

/// Build the conflict error for a row that didn't match its expected version.
async fn conflict(conn: &mut PgConnection, item_id: &ItemId, expected: Version) -> StoreError {
    let actual = sqlx::query_scalar::<_, i64>("SELECT version FROM items WHERE id = $1")
        .bind(item_id.as_str())
        .fetch_optional(&mut *conn)
        .await;

    match actual {
        Ok(actual) => StoreError::Conflict {
            item_id: item_id.clone(),
            expected,
            actual: actual
                .and_then(|version| u64::try_from(version).ok())
                .map(Version::new),
        },
        Err(e) => database_error(e),
    }
}

fn row_to_item(row: &PgRow) -> Result<Item, StoreError> {
    let Json(locks): Json<Vec<LockRecord>> = row.try_get("locks").map_err(database_error)?;
    let total_quantity: i64 = row.try_get("total_quantity").map_err(database_error)?;
    let version: i64 = row.try_get("version").map_err(database_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(database_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(database_error)?;

    let record = ItemRecord {
        id: row.try_get("id").map_err(database_error)?,
        owner_id: row.try_get("owner_id").map_err(database_error)?,
        name: row.try_get("name").map_err(database_error)?,
        description: row.try_get("description").map_err(database_error)?,
        total_quantity: from_column(total_quantity, "total_quantity")?,
        locks,
        status: row.try_get("status").map_err(database_error)?,
        version: from_column(version, "version")?,
        created_at,
        updated_at,
    };

    let id = record.id.clone();
    Item::try_from(record)
        .map_err(|e| StoreError::Serialization(format!("Invalid item row {id}: {e}")))
}

fn to_column(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

fn from_column(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

#[allow(clippy::needless_pass_by_value)]
fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
