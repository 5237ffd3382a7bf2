//! # Sale Transaction Engine
//!
//! Creates an uplift sale and takes its stock from the client's ledger in
//! one unit of work.
//!
//! ## Flow
//! ```text
//! create_sale(NewSale)
//!      │
//!      ├── validate_new_sale, price_lines        (no I/O)
//!      │
//!      └── commit_bounded("create_sale")
//!            ├── client exists? sales rep exists?  (pool reads)
//!            ├── lock (client, product) for every line
//!            ├── BEGIN
//!            ├── INSERT uplift_sales              ← first statement, a write
//!            ├── read ledger → plan_draws         → InsufficientStock?
//!            ├── products exist?                  → ProductNotFound?
//!            ├── adjust_in(-qty) per product
//!            ├── INSERT uplift_sale_items
//!      └── COMMIT (outside the bound) → UpliftSale
//! ```
//! Any error before COMMIT drops the transaction: no sale, no items, no
//! stock change.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uplift_core::sale::{plan_draws, price_lines, PricedSale};
use uplift_core::validation::validate_new_sale;
use uplift_core::{CoreError, LedgerKey, NewSale, SaleStatus, UpliftSale};

use crate::engine::unit_of_work::{commit_bounded, Prepared};
use crate::error::{DbError, UpliftResult};
use crate::locks::KeyLocks;
use crate::repository::catalog::{existing_ids_in, CatalogRepository, CatalogTable};
use crate::repository::ledger::{adjust_in, quantities_for_client_in};
use crate::repository::sale::{insert_item_in, insert_sale_in, load_sale_in};

/// Creates uplift sales.
#[derive(Debug, Clone)]
pub struct SaleEngine {
    pool: SqlitePool,
    locks: Arc<KeyLocks>,
    timeout: Duration,
}

impl SaleEngine {
    pub fn new(pool: SqlitePool, locks: Arc<KeyLocks>, timeout: Duration) -> Self {
        SaleEngine {
            pool,
            locks,
            timeout,
        }
    }

    /// Records a sale and decrements stock for every line.
    ///
    /// ## Errors
    /// - `ValidationError`: empty items, quantity ≤ 0, negative price, overflow
    /// - `ClientNotFound` / `UserNotFound`
    /// - `InsufficientStock`: names the first product the balance can't cover
    /// - `ProductNotFound`
    /// - `Timeout`: nothing was committed
    pub async fn create_sale(&self, request: NewSale) -> UpliftResult<UpliftSale> {
        validate_new_sale(&request)?;
        let priced = price_lines(&request.items)?;

        let mut product_ids: Vec<i64> = request.items.iter().map(|line| line.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let sale = commit_bounded(
            "create_sale",
            self.timeout,
            self.record_sale(&request, &priced, &product_ids),
        )
        .await?;

        info!(
            sale_id = sale.id,
            client_id = sale.client_id,
            user_id = sale.user_id,
            items = sale.items.len(),
            total = %sale.total_amount,
            "Uplift sale created"
        );
        Ok(sale)
    }

    async fn record_sale(
        &self,
        request: &NewSale,
        priced: &PricedSale,
        product_ids: &[i64],
    ) -> UpliftResult<Prepared<UpliftSale>> {
        let client_id = request.client_id;

        let catalog = CatalogRepository::new(self.pool.clone());
        if !catalog.client_exists(client_id).await? {
            return Err(CoreError::ClientNotFound(client_id).into());
        }
        if !catalog.user_exists(request.user_id).await? {
            return Err(CoreError::UserNotFound(request.user_id).into());
        }

        let guards = self
            .locks
            .lock_all(product_ids.iter().map(|p| LedgerKey::new(client_id, *p)))
            .await;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let sale_id = insert_sale_in(
            &mut tx,
            client_id,
            request.user_id,
            &SaleStatus::Pending,
            priced.total,
            now,
        )
        .await?;

        let on_hand = quantities_for_client_in(&mut tx, client_id, product_ids).await?;
        let draws = plan_draws(client_id, &request.items, &on_hand)?;

        // client_stock references products, so this only fires for a stock
        // row whose product was removed with foreign keys off
        let known = existing_ids_in(&mut tx, CatalogTable::Products, product_ids).await?;
        if let Some(missing) = product_ids.iter().find(|id| !known.contains(id)) {
            return Err(CoreError::ProductNotFound(*missing).into());
        }

        for draw in &draws {
            let left = adjust_in(&mut tx, draw.key, -draw.quantity).await?;
            debug!(
                sale_id,
                client_id,
                product_id = draw.key.product_id,
                taken = draw.quantity,
                left,
                "Stock drawn for sale"
            );
        }

        for line in &priced.lines {
            insert_item_in(&mut tx, sale_id, line, now).await?;
        }

        let sale = load_sale_in(&mut tx, sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Uplift sale", sale_id))?;

        Ok(Prepared::new(tx, sale).holding(guards))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
