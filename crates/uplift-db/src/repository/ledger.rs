//! # Stock Ledger
//!
//! The single source of truth for on-hand stock per (client, product).
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Who writes client_stock                           │
//! │                                                                         │
//! │  StockLedger::upsert_set / adjust      (standalone unit of work)       │
//! │  SaleEngine        ──► adjust_in(-qty)                                 │
//! │  ReversalEngine    ──► adjust_in(+qty)                                 │
//! │  BulkEngine        ──► upsert_set_in / adjust_in (one savepoint each)  │
//! │                                                                         │
//! │  Nothing else issues INSERT/UPDATE against client_stock.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarded Decrement
//! ```text
//! UPDATE client_stock SET quantity = quantity + :delta
//!  WHERE client_id = :c AND product_id = :p AND quantity + :delta >= 0
//!
//! 1 row  → applied
//! 0 rows → read the balance, report InsufficientStock (nothing changed)
//! ```
//! The per-key lock already serializes writers of a key; the guard and the
//! `CHECK (quantity >= 0)` constraint keep the invariant even if it did not.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uplift_core::ledger as policy;
use uplift_core::validation::validate_page;
use uplift_core::{CoreError, LedgerKey, Page, Pagination, StockEntry, ValidationError};

use crate::engine::unit_of_work::{commit_bounded, Prepared};
use crate::error::{UpliftError, UpliftResult};
use crate::locks::KeyLocks;
use crate::repository::catalog::{existing_ids_in, CatalogTable};

const ENTRY_COLUMNS: &str = "id, client_id, product_id, quantity, created_at, updated_at";

/// Repository and write primitives for `client_stock`.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = db.ledger();
/// ledger.upsert_set(LedgerKey::new(1, 1), 20).await?;
/// let left = ledger.adjust(LedgerKey::new(1, 1), -5).await?;   // 15
/// ```
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    locks: Arc<KeyLocks>,
    timeout: Duration,
}

impl StockLedger {
    pub fn new(pool: SqlitePool, locks: Arc<KeyLocks>, timeout: Duration) -> Self {
        StockLedger {
            pool,
            locks,
            timeout,
        }
    }

    /// Gets the entry for a key, `None` if it has never been stocked.
    pub async fn get(&self, key: LedgerKey) -> UpliftResult<Option<StockEntry>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_entry_in(&mut conn, key).await?)
    }

    /// Gets an entry by its row id.
    pub async fn get_by_id(&self, id: i64) -> UpliftResult<Option<StockEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM client_stock WHERE id = ?1");
        let entry = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// On-hand quantity; an absent key reads as 0.
    pub async fn quantity(&self, key: LedgerKey) -> UpliftResult<i64> {
        Ok(self.get(key).await?.map(|entry| entry.quantity).unwrap_or(0))
    }

    /// Creates or overwrites the entry for `key`.
    ///
    /// ## Errors
    /// - `InvalidQuantity` if `quantity < 0`
    /// - `ClientNotFound` / `ProductNotFound`
    /// - `Timeout`
    pub async fn upsert_set(&self, key: LedgerKey, quantity: i64) -> UpliftResult<StockEntry> {
        policy::check_set_quantity(quantity)?;
        self.ensure_catalog(key).await?;

        let entry =
            commit_bounded("upsert_stock", self.timeout, self.locked_upsert_set(key, quantity))
                .await?;

        info!(
            client_id = key.client_id,
            product_id = key.product_id,
            quantity,
            "Stock set"
        );
        Ok(entry)
    }

    /// Atomically adds `delta` (which may be negative) to the key.
    ///
    /// ## Returns
    /// The new quantity.
    ///
    /// ## Errors
    /// - `InsufficientStock` if the result would be negative (nothing changes)
    /// - `ClientNotFound` / `ProductNotFound`
    /// - `Timeout`
    pub async fn adjust(&self, key: LedgerKey, delta: i64) -> UpliftResult<i64> {
        self.ensure_catalog(key).await?;

        let quantity =
            commit_bounded("adjust_stock", self.timeout, self.locked_adjust(key, delta)).await?;

        info!(
            client_id = key.client_id,
            product_id = key.product_id,
            delta,
            quantity,
            "Stock adjusted"
        );
        Ok(quantity)
    }

    /// Lists a client's stock, most recently updated first.
    pub async fn list_for_client(
        &self,
        client_id: i64,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> UpliftResult<Page<StockEntry>> {
        let (page, limit) = validate_page(page, limit)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM client_stock WHERE client_id = ?1")
            .bind(client_id)
            .fetch_one(&self.pool)
            .await?;

        let pagination = Pagination::new(page, limit, total);

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM client_stock WHERE client_id = ?1 \
             ORDER BY updated_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        );
        let data: Vec<StockEntry> = sqlx::query_as(&sql)
            .bind(client_id)
            .bind(limit as i64)
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { data, pagination })
    }

    /// Removes the entry for `key`. Administrative; no engine calls this.
    ///
    /// ## Returns
    /// `true` if a row was deleted.
    pub async fn delete(&self, key: LedgerKey) -> UpliftResult<bool> {
        let deleted = commit_bounded("delete_stock", self.timeout, self.locked_delete(key)).await?;

        info!(
            client_id = key.client_id,
            product_id = key.product_id,
            deleted,
            "Stock entry deleted"
        );
        Ok(deleted)
    }

    async fn locked_upsert_set(
        &self,
        key: LedgerKey,
        quantity: i64,
    ) -> UpliftResult<Prepared<StockEntry>> {
        let guards = self.locks.lock_all([key]).await;
        let mut tx = self.pool.begin().await?;
        let entry = upsert_set_in(&mut tx, key, quantity).await?;
        Ok(Prepared::new(tx, entry).holding(guards))
    }

    async fn locked_adjust(&self, key: LedgerKey, delta: i64) -> UpliftResult<Prepared<i64>> {
        let guards = self.locks.lock_all([key]).await;
        let mut tx = self.pool.begin().await?;
        let quantity = adjust_in(&mut tx, key, delta).await?;
        Ok(Prepared::new(tx, quantity).holding(guards))
    }

    async fn locked_delete(&self, key: LedgerKey) -> UpliftResult<Prepared<bool>> {
        let guards = self.locks.lock_all([key]).await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM client_stock WHERE client_id = ?1 AND product_id = ?2")
            .bind(key.client_id)
            .bind(key.product_id)
            .execute(&mut *tx)
            .await?;

        Ok(Prepared::new(tx, result.rows_affected() > 0).holding(guards))
    }

    async fn ensure_catalog(&self, key: LedgerKey) -> UpliftResult<()> {
        let mut conn = self.pool.acquire().await?;

        if existing_ids_in(&mut conn, CatalogTable::Clients, &[key.client_id])
            .await?
            .is_empty()
        {
            return Err(CoreError::ClientNotFound(key.client_id).into());
        }

        if existing_ids_in(&mut conn, CatalogTable::Products, &[key.product_id])
            .await?
            .is_empty()
        {
            return Err(CoreError::ProductNotFound(key.product_id).into());
        }

        Ok(())
    }
}

// =============================================================================
// Primitives (run on the caller's transaction)
// =============================================================================

/// Reads one entry.
pub async fn fetch_entry_in(
    conn: &mut SqliteConnection,
    key: LedgerKey,
) -> sqlx::Result<Option<StockEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM client_stock WHERE client_id = ?1 AND product_id = ?2"
    );
    sqlx::query_as(&sql)
        .bind(key.client_id)
        .bind(key.product_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Current quantity of one client's products, absent keys omitted.
pub async fn quantities_for_client_in(
    conn: &mut SqliteConnection,
    client_id: i64,
    product_ids: &[i64],
) -> sqlx::Result<BTreeMap<i64, i64>> {
    if product_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut query: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT product_id, quantity FROM client_stock WHERE client_id = ");
    query.push_bind(client_id);
    query.push(" AND product_id IN (");
    let mut separated = query.separated(", ");
    for product_id in product_ids {
        separated.push_bind(*product_id);
    }
    separated.push_unseparated(")");

    let rows: Vec<(i64, i64)> = query.build_query_as().fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().collect())
}

/// Current quantity of arbitrary keys, absent keys omitted.
pub async fn quantities_for_keys_in(
    conn: &mut SqliteConnection,
    keys: &[LedgerKey],
) -> sqlx::Result<HashMap<LedgerKey, i64>> {
    let mut by_client: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for key in keys {
        by_client.entry(key.client_id).or_default().push(key.product_id);
    }

    let mut quantities = HashMap::with_capacity(keys.len());
    for (client_id, product_ids) in by_client {
        let rows = quantities_for_client_in(conn, client_id, &product_ids).await?;
        quantities.extend(
            rows.into_iter()
                .map(|(product_id, quantity)| (LedgerKey::new(client_id, product_id), quantity)),
        );
    }

    Ok(quantities)
}

/// Creates or overwrites the entry for `key` with `quantity`.
pub async fn upsert_set_in(
    conn: &mut SqliteConnection,
    key: LedgerKey,
    quantity: i64,
) -> UpliftResult<StockEntry> {
    policy::check_set_quantity(quantity)?;
    let now = Utc::now();

    let sql = format!(
        "INSERT INTO client_stock (client_id, product_id, quantity, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4) \
         ON CONFLICT (client_id, product_id) DO UPDATE SET \
             quantity = excluded.quantity, \
             updated_at = excluded.updated_at \
         RETURNING {ENTRY_COLUMNS}"
    );

    let entry: StockEntry = sqlx::query_as(&sql)
        .bind(key.client_id)
        .bind(key.product_id)
        .bind(quantity)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

    debug!(client_id = key.client_id, product_id = key.product_id, quantity, "Stock row written");
    Ok(entry)
}

/// Adds `delta` to the entry for `key` and returns the new quantity.
///
/// A positive delta creates a missing row. A delta that would take the
/// balance below zero changes nothing and returns `InsufficientStock`.
pub async fn adjust_in(conn: &mut SqliteConnection, key: LedgerKey, delta: i64) -> UpliftResult<i64> {
    let now = Utc::now();

    if delta > 0 {
        let quantity: Option<i64> = sqlx::query_scalar(
            "INSERT INTO client_stock (client_id, product_id, quantity, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT (client_id, product_id) DO UPDATE SET \
                 quantity = client_stock.quantity + excluded.quantity, \
                 updated_at = excluded.updated_at \
             WHERE client_stock.quantity <= ?5 - excluded.quantity \
             RETURNING quantity",
        )
        .bind(key.client_id)
        .bind(key.product_id)
        .bind(delta)
        .bind(now)
        .bind(i64::MAX)
        .fetch_optional(&mut *conn)
        .await?;

        return quantity.ok_or_else(|| {
            ValidationError::Overflow {
                field: "quantity".to_string(),
            }
            .into()
        });
    }

    let quantity: Option<i64> = sqlx::query_scalar(
        "UPDATE client_stock SET quantity = quantity + ?3, updated_at = ?4 \
         WHERE client_id = ?1 AND product_id = ?2 AND quantity + ?3 >= 0 \
         RETURNING quantity",
    )
    .bind(key.client_id)
    .bind(key.product_id)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(quantity) = quantity {
        debug!(client_id = key.client_id, product_id = key.product_id, delta, quantity, "Stock decremented");
        return Ok(quantity);
    }

    // Guard refused or no row: explain with the balance we can see
    let current = fetch_entry_in(conn, key).await?.map(|entry| entry.quantity);
    match policy::apply_delta(key, current, delta) {
        Err(err) => Err(UpliftError::Core(err)),
        // Zero delta against an absent key
        Ok(_) => Ok(current.unwrap_or(0)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn test_absent_key_reads_as_zero() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let key = LedgerKey::new(fx.client, fx.products[0]);

        assert_eq!(ledger.get(key).await.unwrap(), None);
        assert_eq!(ledger.quantity(key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_set_creates_then_overwrites() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let key = LedgerKey::new(fx.client, fx.products[0]);

        let created = ledger.upsert_set(key, 20).await.unwrap();
        assert_eq!(created.quantity, 20);

        let updated = ledger.upsert_set(key, 3).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.quantity, 3);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let created = ledger
            .upsert_set(LedgerKey::new(fx.client, fx.products[1]), 12)
            .await
            .unwrap();

        let found = ledger.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(ledger.get_by_id(created.id + 100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_set_rejects_negative_and_unknown_ids() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();

        let err = ledger
            .upsert_set(LedgerKey::new(fx.client, fx.products[0]), -1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpliftError::Core(CoreError::InvalidQuantity { quantity: -1 })
        ));

        let err = ledger
            .upsert_set(LedgerKey::new(fx.client + 50, fx.products[0]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, UpliftError::Core(CoreError::ClientNotFound(_))));

        let err = ledger
            .upsert_set(LedgerKey::new(fx.client, 9_999), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, UpliftError::Core(CoreError::ProductNotFound(9_999))));
    }

    #[tokio::test]
    async fn test_adjust_is_all_or_nothing() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let key = LedgerKey::new(fx.client, fx.products[0]);

        assert_eq!(ledger.adjust(key, 4).await.unwrap(), 4);
        assert_eq!(ledger.adjust(key, -3).await.unwrap(), 1);

        match ledger.adjust(key, -5).await {
            Err(UpliftError::Core(CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            })) => {
                assert_eq!(product_id, fx.products[0]);
                assert_eq!(available, 1);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
        assert_eq!(ledger.quantity(key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_adjust_on_absent_key_creates_nothing() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let key = LedgerKey::new(fx.client, fx.products[1]);

        let err = ledger.adjust(key, -1).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert_eq!(ledger.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_positive_adjust_overflow_is_rejected() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();
        let key = LedgerKey::new(fx.client, fx.products[0]);

        ledger.upsert_set(key, i64::MAX - 1).await.unwrap();
        let err = ledger.adjust(key, 2).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(ledger.quantity(key).await.unwrap(), i64::MAX - 1);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let fx = Fixture::new().await;
        let ledger = fx.db.ledger();

        for (i, product) in fx.products.iter().enumerate() {
            ledger
                .upsert_set(LedgerKey::new(fx.client, *product), (i as i64 + 1) * 10)
                .await
                .unwrap();
        }

        let page = ledger.list_for_client(fx.client, Some(1), Some(2)).await.unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total_count, fx.products.len() as i64);
        assert!(page.pagination.has_next_page);

        let key = LedgerKey::new(fx.client, fx.products[0]);
        assert!(ledger.delete(key).await.unwrap());
        assert!(!ledger.delete(key).await.unwrap());
        assert_eq!(ledger.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_constraint_backs_the_guard() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = db.catalog().insert_client("C").await.unwrap();
        let product = db.catalog().insert_product("P").await.unwrap();
        db.ledger()
            .upsert_set(LedgerKey::new(client, product), 1)
            .await
            .unwrap();

        let err = sqlx::query("UPDATE client_stock SET quantity = -1")
            .execute(db.pool())
            .await
            .unwrap_err();
        let err: crate::error::DbError = err.into();
        assert!(matches!(err, crate::error::DbError::CheckViolation { .. }));
    }
}
