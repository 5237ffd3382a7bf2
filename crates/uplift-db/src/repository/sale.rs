//! # Sale Repository
//!
//! Storage for uplift sales and their items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (SaleEngine, one unit of work)                              │
//! │     └── insert_sale_in() → status 'pending', total fixed               │
//! │     └── insert_item_in() × N (position 0..N)                           │
//! │                                                                         │
//! │  2. (OPTIONAL) STATUS CHANGES                                          │
//! │     └── set_status_in() → any label except from 'voided'               │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID (ReversalEngine)                                   │
//! │     └── mark_voided_in() → guarded, wins at most once                  │
//! │                                                                         │
//! │  4. (OPTIONAL) DELETE (ReversalEngine, after the void step)            │
//! │     └── delete_sale_in() → items cascade                               │
//! │                                                                         │
//! │  Items never change after step 1.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uplift_core::sale::PricedLine;
use uplift_core::validation::validate_page;
use uplift_core::{Money, Page, Pagination, SaleFilter, SaleStatus, UpliftSale, UpliftSaleItem};

use crate::error::{DbResult, UpliftResult};

const SALE_COLUMNS: &str = "id, client_id, user_id, status, total_amount, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, sale_id, position, product_id, quantity, unit_price, total, created_at";

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    client_id: i64,
    user_id: i64,
    status: String,
    total_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self, items: Vec<UpliftSaleItem>) -> UpliftSale {
        UpliftSale {
            id: self.id,
            client_id: self.client_id,
            user_id: self.user_id,
            status: SaleStatus::from(self.status),
            total_amount: Money::from_cents(self.total_amount),
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    sale_id: i64,
    position: i64,
    product_id: i64,
    quantity: i64,
    unit_price: i64,
    total: i64,
    created_at: DateTime<Utc>,
}

impl From<ItemRow> for UpliftSaleItem {
    fn from(row: ItemRow) -> Self {
        UpliftSaleItem {
            id: row.id,
            sale_id: row.sale_id,
            position: row.position,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price),
            total: Money::from_cents(row.total),
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Read side for uplift sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its items in submission order.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<UpliftSale>> {
        let mut conn = self.pool.acquire().await?;
        load_sale_in(&mut conn, id).await
    }

    /// Lists sales matching `filter`, newest first.
    ///
    /// ## Filters
    /// status, client, sales rep, created-at range (inclusive). All optional.
    pub async fn list(&self, filter: &SaleFilter) -> UpliftResult<Page<UpliftSale>> {
        let (page, limit) = validate_page(filter.page, filter.limit)?;

        let mut count_query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM uplift_sales WHERE 1 = 1");
        push_filters(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let pagination = Pagination::new(page, limit, total);

        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM uplift_sales WHERE 1 = 1"));
        push_filters(&mut query, filter);
        query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(limit as i64);
        query.push(" OFFSET ");
        query.push_bind(pagination.offset());

        let rows: Vec<SaleRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        let sale_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut items = items_for_sales_in(&mut conn, &sale_ids).await?;

        let data = rows
            .into_iter()
            .map(|row| {
                let sale_items = items.remove(&row.id).unwrap_or_default();
                row.into_sale(sale_items)
            })
            .collect();

        debug!(total, page, limit, "Listed uplift sales");
        Ok(Page { data, pagination })
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &SaleFilter) {
    if let Some(status) = &filter.status {
        query.push(" AND status = ");
        query.push_bind(status.as_str().to_string());
    }
    if let Some(client_id) = filter.client_id {
        query.push(" AND client_id = ");
        query.push_bind(client_id);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ");
        query.push_bind(user_id);
    }
    if let Some(from) = filter.created_from {
        query.push(" AND created_at >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.created_to {
        query.push(" AND created_at <= ");
        query.push_bind(to);
    }
}

// =============================================================================
// Connection-level helpers (used inside units of work)
// =============================================================================

/// Loads a sale and its items.
pub async fn load_sale_in(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<UpliftSale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM uplift_sales WHERE id = ?1");
    let row: Option<SaleRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let sql = format!("SELECT {ITEM_COLUMNS} FROM uplift_sale_items WHERE sale_id = ?1 ORDER BY position");
    let items: Vec<ItemRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(row.into_sale(items.into_iter().map(UpliftSaleItem::from).collect())))
}

async fn items_for_sales_in(
    conn: &mut SqliteConnection,
    sale_ids: &[i64],
) -> DbResult<HashMap<i64, Vec<UpliftSaleItem>>> {
    let mut grouped: HashMap<i64, Vec<UpliftSaleItem>> = HashMap::new();
    if sale_ids.is_empty() {
        return Ok(grouped);
    }

    let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {ITEM_COLUMNS} FROM uplift_sale_items WHERE sale_id IN ("
    ));
    let mut separated = query.separated(", ");
    for id in sale_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY sale_id, position");

    let rows: Vec<ItemRow> = query.build_query_as().fetch_all(&mut *conn).await?;
    for row in rows {
        grouped.entry(row.sale_id).or_default().push(row.into());
    }

    Ok(grouped)
}

/// Inserts the sale header and returns its id.
pub async fn insert_sale_in(
    conn: &mut SqliteConnection,
    client_id: i64,
    user_id: i64,
    status: &SaleStatus,
    total_amount: Money,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO uplift_sales (client_id, user_id, status, total_amount, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(client_id)
    .bind(user_id)
    .bind(status.as_str())
    .bind(total_amount.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    debug!(sale_id = id, client_id, user_id, total = %total_amount, "Uplift sale inserted");
    Ok(id)
}

/// Inserts one priced line of a sale.
pub async fn insert_item_in(
    conn: &mut SqliteConnection,
    sale_id: i64,
    line: &PricedLine,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO uplift_sale_items \
             (sale_id, position, product_id, quantity, unit_price, total, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(sale_id)
    .bind(line.position)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(line.unit_price.cents())
    .bind(line.total.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Flips a sale to `voided` unless it already is.
///
/// ## Returns
/// `true` if this call made the transition; `false` if the sale is missing
/// or another call voided it first.
pub async fn mark_voided_in(
    conn: &mut SqliteConnection,
    sale_id: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE uplift_sales SET status = 'voided', updated_at = ?2 \
         WHERE id = ?1 AND status <> 'voided'",
    )
    .bind(sale_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Deletes a sale; its items go with it through the foreign key cascade.
///
/// ## Returns
/// `true` if the sale existed.
pub async fn delete_sale_in(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM uplift_sales WHERE id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    debug!(sale_id, deleted = result.rows_affected(), "Uplift sale row deleted");
    Ok(result.rows_affected() == 1)
}

/// Writes a non-void status unless the sale is voided.
///
/// ## Returns
/// `true` if a row changed.
pub async fn set_status_in(
    conn: &mut SqliteConnection,
    sale_id: i64,
    status: &SaleStatus,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE uplift_sales SET status = ?2, updated_at = ?3 \
         WHERE id = ?1 AND status <> 'voided'",
    )
    .bind(sale_id)
    .bind(status.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Unit Tests
// =============================================================================
