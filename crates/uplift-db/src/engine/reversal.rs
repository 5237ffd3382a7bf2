//! # Reversal Engine
//!
//! Voids uplift sales and restores the stock they consumed. Also handles
//! the plain status changes reps and back office make to a sale.
//!
//! ## Void Flow
//! ```text
//! void_sale(id)
//!      │
//!      ├── load sale                     → SaleNotFound?
//!      ├── already voided?               → return it unchanged
//!      │
//!      └── commit_bounded("void_sale")
//!            ├── lock (client, product) of every item
//!            ├── BEGIN
//!            ├── UPDATE status = 'voided' WHERE status <> 'voided'   ← write first
//!            │      0 rows → someone else voided it: return current state
//!            ├── adjust_in(+qty) per item
//!      └── COMMIT
//! ```
//! The guarded update is the only gate: of two concurrent voids exactly one
//! flips the status, and only that one restores stock.
//!
//! `delete_sale` runs the same void step under the same locks and then
//! removes the sale row; its items go with it (`ON DELETE CASCADE`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uplift_core::validation::validate_status;
use uplift_core::{CoreError, LedgerKey, SaleStatus, UpliftSale};

use crate::engine::unit_of_work::{commit_bounded, Prepared};
use crate::error::UpliftResult;
use crate::locks::KeyLocks;
use crate::repository::ledger::adjust_in;
use crate::repository::sale::{
    delete_sale_in, load_sale_in, mark_voided_in, set_status_in, SaleRepository,
};

/// Voids sales and changes their status.
#[derive(Debug, Clone)]
pub struct ReversalEngine {
    pool: SqlitePool,
    locks: Arc<KeyLocks>,
    timeout: Duration,
}

impl ReversalEngine {
    pub fn new(pool: SqlitePool, locks: Arc<KeyLocks>, timeout: Duration) -> Self {
        ReversalEngine {
            pool,
            locks,
            timeout,
        }
    }

    /// Voids a sale, returning every item's quantity to the ledger.
    ///
    /// Idempotent: voiding a voided sale returns it without touching stock.
    ///
    /// ## Errors
    /// - `SaleNotFound`
    /// - `Timeout`: nothing was committed
    pub async fn void_sale(&self, sale_id: i64) -> UpliftResult<UpliftSale> {
        let sale = self.existing_sale(sale_id).await?;

        if sale.status.is_voided() {
            debug!(sale_id, "Sale already voided");
            return Ok(sale);
        }

        let (voided, restored) =
            commit_bounded("void_sale", self.timeout, self.restore_stock(&sale)).await?;

        if restored {
            info!(
                sale_id,
                client_id = sale.client_id,
                items = sale.items.len(),
                "Uplift sale voided"
            );
        } else {
            debug!(sale_id, "Concurrent void already applied");
        }
        Ok(voided)
    }

    /// Sets a sale's status.
    ///
    /// `voided` goes through [`void_sale`](Self::void_sale). Any other label
    /// is written as is, unless the sale is voided.
    ///
    /// ## Errors
    /// - `ValidationError`: blank status
    /// - `SaleNotFound`
    /// - `InvalidSaleStatus`: the sale is voided
    pub async fn set_status(&self, sale_id: i64, status: &str) -> UpliftResult<UpliftSale> {
        let status = SaleStatus::from(validate_status(status)?);

        if status.is_voided() {
            return self.void_sale(sale_id).await;
        }

        let sale = commit_bounded(
            "set_sale_status",
            self.timeout,
            self.write_status(sale_id, &status),
        )
        .await?;

        info!(sale_id, status = %status, "Uplift sale status changed");
        Ok(sale)
    }

    /// Deletes a sale and its items. Administrative.
    ///
    /// Stock the sale still holds goes back to the ledger first, so deleting
    /// a pending sale has the same stock effect as voiding it. A voided sale
    /// is removed without touching stock.
    ///
    /// ## Returns
    /// The sale as it was removed (status `voided`).
    ///
    /// ## Errors
    /// - `SaleNotFound`
    /// - `Timeout`: nothing was committed
    pub async fn delete_sale(&self, sale_id: i64) -> UpliftResult<UpliftSale> {
        let sale = self.existing_sale(sale_id).await?;

        let (removed, restored) =
            commit_bounded("delete_sale", self.timeout, self.remove_sale(&sale)).await?;

        info!(
            sale_id,
            client_id = sale.client_id,
            items = sale.items.len(),
            restored,
            "Uplift sale deleted"
        );
        Ok(removed)
    }

    async fn existing_sale(&self, sale_id: i64) -> UpliftResult<UpliftSale> {
        SaleRepository::new(self.pool.clone())
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id).into())
    }

    /// Voids `sale` if nobody else has. The flag says whether this call did.
    async fn restore_stock(&self, sale: &UpliftSale) -> UpliftResult<Prepared<(UpliftSale, bool)>> {
        let guards = self.locks.lock_all(sale.ledger_keys()).await;

        let mut tx = self.pool.begin().await?;
        let restored = void_in(&mut tx, sale).await?;

        // Missing here means a concurrent delete won
        let current = load_sale_in(&mut tx, sale.id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale.id))?;

        Ok(Prepared::new(tx, (current, restored)).holding(guards))
    }

    async fn remove_sale(&self, sale: &UpliftSale) -> UpliftResult<Prepared<(UpliftSale, bool)>> {
        let guards = self.locks.lock_all(sale.ledger_keys()).await;

        let mut tx = self.pool.begin().await?;
        let restored = void_in(&mut tx, sale).await?;

        let removed = load_sale_in(&mut tx, sale.id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale.id))?;
        delete_sale_in(&mut tx, sale.id).await?;

        Ok(Prepared::new(tx, (removed, restored)).holding(guards))
    }

    async fn write_status(
        &self,
        sale_id: i64,
        status: &SaleStatus,
    ) -> UpliftResult<Prepared<UpliftSale>> {
        let mut tx = self.pool.begin().await?;

        let changed = set_status_in(&mut tx, sale_id, status, Utc::now()).await?;
        let current = load_sale_in(&mut tx, sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;

        if !changed {
            return Err(CoreError::InvalidSaleStatus {
                sale_id,
                current_status: current.status.to_string(),
                requested: status.to_string(),
            }
            .into());
        }

        Ok(Prepared::new(tx, current))
    }
}

/// Flips `sale` to voided and returns its items' stock to the ledger.
///
/// ## Returns
/// `false`, with nothing written, if the sale is gone or already voided.
async fn void_in(conn: &mut SqliteConnection, sale: &UpliftSale) -> UpliftResult<bool> {
    if !mark_voided_in(conn, sale.id, Utc::now()).await? {
        return Ok(false);
    }

    for item in &sale.items {
        let key = LedgerKey::new(sale.client_id, item.product_id);
        let quantity = adjust_in(conn, key, item.quantity).await?;
        debug!(
            sale_id = sale.id,
            client_id = key.client_id,
            product_id = key.product_id,
            restored = item.quantity,
            quantity,
            "Stock restored"
        );
    }
    Ok(true)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpliftError;
    use crate::test_support::Fixture;
    use uplift_core::{Money, SaleLine};

    async fn stocked_sale(fx: &Fixture) -> UpliftSale {
        let ledger = fx.db.ledger();
        ledger
            .upsert_set(LedgerKey::new(fx.client, fx.products[0]), 20)
            .await
            .unwrap();
        ledger
            .upsert_set(LedgerKey::new(fx.client, fx.products[1]), 8)
            .await
            .unwrap();

        fx.db
            .sale_engine()
            .create_sale(fx.sale(vec![
                SaleLine {
                    product_id: fx.products[0],
                    quantity: 5,
                    unit_price: Money::from_cents(200),
                },
                SaleLine {
                    product_id: fx.products[1],
                    quantity: 3,
                    unit_price: Money::from_cents(50),
                },
            ]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_void_restores_every_key() {
        let fx = Fixture::new().await;
        let sale = stocked_sale(&fx).await;
        assert_eq!(fx.quantity(fx.products[0]).await, 15);
        assert_eq!(fx.quantity(fx.products[1]).await, 5);

        let voided = fx.db.reversal_engine().void_sale(sale.id).await.unwrap();

        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(voided.items, sale.items);
        assert_eq!(voided.total_amount, sale.total_amount);
        assert_eq!(fx.quantity(fx.products[0]).await, 20);
        assert_eq!(fx.quantity(fx.products[1]).await, 8);
    }

    #[tokio::test]
    async fn test_void_twice_is_a_noop() {
        let fx = Fixture::new().await;
        let sale = stocked_sale(&fx).await;
        let engine = fx.db.reversal_engine();

        let first = engine.void_sale(sale.id).await.unwrap();
        let after_first = (fx.quantity(fx.products[0]).await, fx.quantity(fx.products[1]).await);

        let second = engine.void_sale(sale.id).await.unwrap();
        let after_second = (fx.quantity(fx.products[0]).await, fx.quantity(fx.products[1]).await);

        assert_eq!(after_first, after_second);
        assert_eq!(second.status, SaleStatus::Voided);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_voids_restore_once() {
        let fx = Fixture::new().await;
        let sale_id = stocked_sale(&fx).await.id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = fx.db.reversal_engine();
                tokio::spawn(async move { engine.void_sale(sale_id).await })
            })
            .collect();

        for handle in handles {
            let voided = handle.await.unwrap().unwrap();
            assert_eq!(voided.status, SaleStatus::Voided);
        }

        assert_eq!(fx.quantity(fx.products[0]).await, 20);
        assert_eq!(fx.quantity(fx.products[1]).await, 8);
    }

    #[tokio::test]
    async fn test_void_missing_sale() {
        let fx = Fixture::new().await;
        let err = fx.db.reversal_engine().void_sale(12345).await.unwrap_err();
        assert!(matches!(err, UpliftError::Core(CoreError::SaleNotFound(12345))));
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_set_status_transitions() {
        let fx = Fixture::new().await;
        let sale = stocked_sale(&fx).await;
        let engine = fx.db.reversal_engine();

        let completed = engine.set_status(sale.id, "completed").await.unwrap();
        assert_eq!(completed.status, SaleStatus::Completed);

        let custom = engine.set_status(sale.id, " awaiting_delivery ").await.unwrap();
        assert_eq!(custom.status.as_str(), "awaiting_delivery");
        assert_eq!(fx.quantity(fx.products[0]).await, 15);

        let voided = engine.set_status(sale.id, "voided").await.unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(fx.quantity(fx.products[0]).await, 20);

        let err = engine.set_status(sale.id, "pending").await.unwrap_err();
        assert!(matches!(
            err,
            UpliftError::Core(CoreError::InvalidSaleStatus { .. })
        ));
        assert_eq!(err.code(), "INVALID_STATUS");

        let err = engine.set_status(sale.id, "  ").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = engine.set_status(999, "completed").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_pending_sale_restores_stock() {
        let fx = Fixture::new().await;
        let sale = stocked_sale(&fx).await;
        let engine = fx.db.reversal_engine();

        let removed = engine.delete_sale(sale.id).await.unwrap();

        assert_eq!(removed.id, sale.id);
        assert_eq!(removed.items, sale.items);
        assert_eq!(fx.quantity(fx.products[0]).await, 20);
        assert_eq!(fx.quantity(fx.products[1]).await, 8);
        assert_eq!(fx.sale_count().await, 0);
        assert!(fx.db.sales().get_by_id(sale.id).await.unwrap().is_none());

        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uplift_sale_items")
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
        assert_eq!(items, 0);

        let err = engine.void_sale(sale.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_voided_sale_leaves_stock() {
        let fx = Fixture::new().await;
        let sale = stocked_sale(&fx).await;
        let engine = fx.db.reversal_engine();

        engine.void_sale(sale.id).await.unwrap();
        let removed = engine.delete_sale(sale.id).await.unwrap();

        assert_eq!(removed.status, SaleStatus::Voided);
        assert_eq!(fx.quantity(fx.products[0]).await, 20);
        assert_eq!(fx.quantity(fx.products[1]).await, 8);
        assert_eq!(fx.sale_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_sale() {
        let fx = Fixture::new().await;
        let err = fx.db.reversal_engine().delete_sale(4242).await.unwrap_err();
        assert!(matches!(err, UpliftError::Core(CoreError::SaleNotFound(4242))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_racing_void_restores_once() {
        let fx = Fixture::new().await;
        let sale_id = stocked_sale(&fx).await.id;

        let voider = fx.db.reversal_engine();
        let deleter = fx.db.reversal_engine();
        let void = tokio::spawn(async move { voider.void_sale(sale_id).await });
        let delete = tokio::spawn(async move { deleter.delete_sale(sale_id).await });

        delete.await.unwrap().unwrap();
        if let Err(err) = void.await.unwrap() {
            assert_eq!(err.code(), "NOT_FOUND");
        }

        assert_eq!(fx.quantity(fx.products[0]).await, 20);
        assert_eq!(fx.quantity(fx.products[1]).await, 8);
        assert_eq!(fx.sale_count().await, 0);
    }
}
