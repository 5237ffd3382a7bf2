//! # Bulk Adjustment Engine
//!
//! Applies a batch of independent stock entries. Each entry succeeds or
//! fails on its own; the call itself always returns a report.
//!
//! ## Flow
//! ```text
//! bulk_adjust(entries)
//!      │
//!      ├── validate every entry              → per-entry VALIDATION_ERROR
//!      │
//!      └── commit_bounded("bulk_adjust")
//!            ├── lock every valid key
//!            ├── BEGIN
//!            ├── INSERT stock_adjustment_batches   ← first statement, a write
//!            ├── batch-read ledger rows, clients, products
//!            ├── for each entry, in submitted order:
//!            │     catalog check → policy on the in-memory balance
//!            │     SAVEPOINT → write → RELEASE   (ROLLBACK TO on failure)
//!            ├── UPDATE batch counts
//!      └── COMMIT
//! ```
//! Later entries on a key see the balance earlier entries left. If the unit
//! of work itself fails, nothing is committed and every validated entry is
//! reported with that error.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uplift_core::ledger as policy;
use uplift_core::validation::{validate_adjustment, ValidatedAdjustment};
use uplift_core::{
    AdjustmentFailure, AdjustmentSuccess, BulkAdjustmentReport, CoreError, LedgerKey,
    StockAdjustment, StockOperation,
};
use uuid::Uuid;

use crate::engine::unit_of_work::{commit_bounded, Prepared};
use crate::error::{DbResult, UpliftError, UpliftResult};
use crate::locks::KeyLocks;
use crate::repository::catalog::{existing_ids_in, CatalogTable};
use crate::repository::ledger::{adjust_in, quantities_for_keys_in, upsert_set_in};

/// Applies batches of stock adjustments.
#[derive(Debug, Clone)]
pub struct BulkAdjustmentEngine {
    pool: SqlitePool,
    locks: Arc<KeyLocks>,
    timeout: Duration,
}

/// What the unit of work produced for the validated entries.
#[derive(Debug, Default)]
struct BatchOutcome {
    successes: Vec<AdjustmentSuccess>,
    failures: Vec<AdjustmentFailure>,
}

impl BulkAdjustmentEngine {
    pub fn new(pool: SqlitePool, locks: Arc<KeyLocks>, timeout: Duration) -> Self {
        BulkAdjustmentEngine {
            pool,
            locks,
            timeout,
        }
    }

    /// Applies `entries` in order and reports each one.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let report = db.bulk_engine().bulk_adjust(vec![
    ///     StockAdjustment::new(1, 2, 5, StockOperation::Set),
    ///     StockAdjustment::new(1, 2, 3, StockOperation::Subtract),
    /// ]).await;
    /// assert_eq!(report.successes[1].quantity, 2);
    /// ```
    pub async fn bulk_adjust(&self, entries: Vec<StockAdjustment>) -> BulkAdjustmentReport {
        let batch_id = Uuid::new_v4().to_string();
        let mut report = BulkAdjustmentReport {
            batch_id: batch_id.clone(),
            successes: Vec::new(),
            failures: Vec::new(),
        };

        if entries.is_empty() {
            return report;
        }

        let mut valid = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match validate_adjustment(entry) {
                Ok(adjustment) => valid.push((index, adjustment)),
                Err(err) => {
                    let err = UpliftError::from(err);
                    report.failures.push(AdjustmentFailure {
                        index,
                        client_id: entry.client_id,
                        product_id: entry.product_id,
                        code: err.code().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if valid.is_empty() {
            debug!(batch_id = %batch_id, entries = entries.len(), "No valid entries");
            return report;
        }

        let rejected = report.failures.len();
        let work = self.apply_batch(&batch_id, entries.len(), rejected, &valid);

        match commit_bounded("bulk_adjust", self.timeout, work).await {
            Ok(outcome) => {
                report.successes = outcome.successes;
                report.failures.extend(outcome.failures);
            }
            Err(err) => {
                warn!(batch_id = %batch_id, error = %err, "Bulk adjustment rolled back");
                report
                    .failures
                    .extend(valid.iter().map(|(index, adjustment)| {
                        failure(*index, adjustment.key, &err)
                    }));
            }
        }

        report.failures.sort_by_key(|failure| failure.index);

        info!(
            batch_id = %batch_id,
            entries = entries.len(),
            successes = report.successes.len(),
            failures = report.failures.len(),
            "Bulk adjustment finished"
        );
        report
    }

    async fn apply_batch(
        &self,
        batch_id: &str,
        entry_count: usize,
        rejected: usize,
        valid: &[(usize, ValidatedAdjustment)],
    ) -> UpliftResult<Prepared<BatchOutcome>> {
        let keys: Vec<LedgerKey> = valid.iter().map(|(_, adjustment)| adjustment.key).collect();
        let guards = self.locks.lock_all(keys.iter().copied()).await;

        let mut tx = self.pool.begin().await?;
        insert_batch_in(&mut tx, batch_id, entry_count).await?;

        let mut balances = quantities_for_keys_in(&mut tx, &keys).await?;
        let client_ids: Vec<i64> = distinct(keys.iter().map(|key| key.client_id));
        let product_ids: Vec<i64> = distinct(keys.iter().map(|key| key.product_id));
        let clients = existing_ids_in(&mut tx, CatalogTable::Clients, &client_ids).await?;
        let products = existing_ids_in(&mut tx, CatalogTable::Products, &product_ids).await?;

        let mut outcome = BatchOutcome::default();

        for (index, adjustment) in valid {
            let key = adjustment.key;
            let previous = balances.get(&key).copied();

            let expected = match check_entry(adjustment, previous, &clients, &products) {
                Ok(expected) => expected,
                Err(err) => {
                    outcome.failures.push(failure(*index, key, &err));
                    continue;
                }
            };

            let mut savepoint = sqlx::Connection::begin(&mut *tx).await?;
            match write_entry(&mut savepoint, adjustment).await {
                Ok(quantity) => {
                    savepoint.commit().await?;
                    if quantity != expected {
                        warn!(
                            client_id = key.client_id,
                            product_id = key.product_id,
                            expected,
                            quantity,
                            "Ledger moved under a held key lock"
                        );
                    }
                    balances.insert(key, quantity);
                    outcome.successes.push(AdjustmentSuccess {
                        index: *index,
                        client_id: key.client_id,
                        product_id: key.product_id,
                        operation: adjustment.operation,
                        previous_quantity: previous,
                        quantity,
                    });
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    outcome.failures.push(failure(*index, key, &err));
                }
            }
        }

        let failure_count = rejected + outcome.failures.len();
        complete_batch_in(&mut tx, batch_id, outcome.successes.len(), failure_count).await?;

        Ok(Prepared::new(tx, outcome).holding(guards))
    }
}

/// Catalog checks, then the ledger policy against the batch's running balance.
fn check_entry(
    adjustment: &ValidatedAdjustment,
    previous: Option<i64>,
    clients: &HashSet<i64>,
    products: &HashSet<i64>,
) -> UpliftResult<i64> {
    let key = adjustment.key;

    if !clients.contains(&key.client_id) {
        return Err(CoreError::ClientNotFound(key.client_id).into());
    }
    if !products.contains(&key.product_id) {
        return Err(CoreError::ProductNotFound(key.product_id).into());
    }

    Ok(policy::apply_operation(
        key.client_id,
        key.product_id,
        previous,
        adjustment.operation,
        adjustment.quantity,
    )?)
}

async fn write_entry(
    conn: &mut SqliteConnection,
    adjustment: &ValidatedAdjustment,
) -> UpliftResult<i64> {
    let key = adjustment.key;
    match adjustment.operation {
        StockOperation::Set => Ok(upsert_set_in(conn, key, adjustment.quantity).await?.quantity),
        StockOperation::Add => adjust_in(conn, key, adjustment.quantity).await,
        StockOperation::Subtract => adjust_in(conn, key, -adjustment.quantity).await,
    }
}

fn failure(index: usize, key: LedgerKey, err: &UpliftError) -> AdjustmentFailure {
    AdjustmentFailure {
        index,
        client_id: Some(key.client_id),
        product_id: Some(key.product_id),
        code: err.code().to_string(),
        error: err.to_string(),
    }
}

fn distinct(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

// =============================================================================
// Audit rows
// =============================================================================

async fn insert_batch_in(
    conn: &mut SqliteConnection,
    batch_id: &str,
    entry_count: usize,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO stock_adjustment_batches (id, entry_count, created_at) VALUES (?1, ?2, ?3)",
    )
    .bind(batch_id)
    .bind(entry_count as i64)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn complete_batch_in(
    conn: &mut SqliteConnection,
    batch_id: &str,
    success_count: usize,
    failure_count: usize,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE stock_adjustment_batches \
         SET success_count = ?2, failure_count = ?3, completed_at = ?4 \
         WHERE id = ?1",
    )
    .bind(batch_id)
    .bind(success_count as i64)
    .bind(failure_count as i64)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Audit view of a finished batch, as `(entry_count, success_count, failure_count)`.
pub async fn batch_counts(pool: &SqlitePool, batch_id: &str) -> DbResult<Option<(i64, i64, i64)>> {
    let counts = sqlx::query_as(
        "SELECT entry_count, success_count, failure_count \
         FROM stock_adjustment_batches WHERE id = ?1 AND completed_at IS NOT NULL",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;
    Ok(counts)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::Fixture;

    fn entry(client_id: i64, product_id: i64, quantity: i64, op: StockOperation) -> StockAdjustment {
        StockAdjustment::new(client_id, product_id, quantity, op)
    }

    #[tokio::test]
    async fn test_later_entries_see_earlier_ones() {
        let fx = Fixture::new().await;
        let p = fx.products[1];

        let report = fx
            .db
            .bulk_engine()
            .bulk_adjust(vec![
                entry(fx.client, p, 5, StockOperation::Set),
                entry(fx.client, p, 3, StockOperation::Subtract),
            ])
            .await;

        assert!(report.is_complete_success());
        assert_eq!(report.successes.len(), 2);
        assert_eq!(report.successes[0].previous_quantity, None);
        assert_eq!(report.successes[0].quantity, 5);
        assert_eq!(report.successes[1].previous_quantity, Some(5));
        assert_eq!(report.successes[1].quantity, 2);
        assert_eq!(fx.quantity(p).await, 2);
    }

    #[tokio::test]
    async fn test_subtract_from_absent_row() {
        let fx = Fixture::new().await;
        let key = LedgerKey::new(fx.client, fx.products[1]);

        let report = fx
            .db
            .bulk_engine()
            .bulk_adjust(vec![entry(fx.client, fx.products[1], 10, StockOperation::Subtract)])
            .await;

        assert!(report.successes.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, "NO_SUCH_STOCK");
        assert!(fx.db.ledger().get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_fail_independently() {
        let fx = Fixture::new().await;
        let [a, b, c] = [fx.products[0], fx.products[1], fx.products[2]];
        fx.db
            .ledger()
            .upsert_set(LedgerKey::new(fx.client, a), 4)
            .await
            .unwrap();

        let entries = vec![
            entry(fx.client, a, 10, StockOperation::Subtract),
            StockAdjustment {
                client_id: None,
                product_id: Some(b),
                quantity: Some(1),
                operation: StockOperation::Add,
            },
            entry(fx.client, b, 0, StockOperation::Add),
            entry(fx.client, b, -1, StockOperation::Set),
            entry(777, b, 1, StockOperation::Add),
            entry(fx.client, 888, 1, StockOperation::Add),
            entry(fx.client, c, 7, StockOperation::Add),
            entry(fx.client, a, 4, StockOperation::Subtract),
        ];

        let report = fx.db.bulk_engine().bulk_adjust(entries).await;

        let codes: Vec<(usize, &str)> = report
            .failures
            .iter()
            .map(|f| (f.index, f.code.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec![
                (0, "INSUFFICIENT_STOCK"),
                (1, "VALIDATION_ERROR"),
                (2, "VALIDATION_ERROR"),
                (3, "VALIDATION_ERROR"),
                (4, "NOT_FOUND"),
                (5, "NOT_FOUND"),
            ]
        );
        assert_eq!(report.failures[1].client_id, None);

        let applied: Vec<usize> = report.successes.iter().map(|s| s.index).collect();
        assert_eq!(applied, vec![6, 7]);
        assert_eq!(fx.quantity(a).await, 0);
        assert_eq!(fx.quantity(c).await, 7);
        assert_eq!(fx.quantity(b).await, 0);
    }

    #[tokio::test]
    async fn test_batch_audit_row() {
        let fx = Fixture::new().await;
        let p = fx.products[0];

        let report = fx
            .db
            .bulk_engine()
            .bulk_adjust(vec![
                entry(fx.client, p, 3, StockOperation::Add),
                entry(fx.client, p, 9, StockOperation::Subtract),
                entry(fx.client, p, -2, StockOperation::Add),
            ])
            .await;

        assert!(Uuid::parse_str(&report.batch_id).is_ok());
        let counts = batch_counts(fx.db.pool(), &report.batch_id).await.unwrap();
        assert_eq!(counts, Some((3, 1, 2)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let fx = Fixture::new().await;
        let report = fx.db.bulk_engine().bulk_adjust(Vec::new()).await;

        assert_eq!(report.entry_count(), 0);
        assert_eq!(batch_counts(fx.db.pool(), &report.batch_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_timeout_fails_every_validated_entry() {
        let db = Database::new(
            DbConfig::in_memory().unit_of_work_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        let fx = Fixture::with_db(db).await;
        let a = LedgerKey::new(fx.client, fx.products[0]);
        let b = LedgerKey::new(fx.client, fx.products[1]);

        let held = fx.db.locks().lock_all([b]).await;
        let report = fx
            .db
            .bulk_engine()
            .bulk_adjust(vec![
                entry(a.client_id, a.product_id, 5, StockOperation::Set),
                entry(b.client_id, b.product_id, 0, StockOperation::Subtract),
                entry(b.client_id, b.product_id, 5, StockOperation::Set),
            ])
            .await;
        drop(held);

        assert!(report.successes.is_empty());
        let codes: Vec<&str> = report.failures.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["TIMEOUT", "VALIDATION_ERROR", "TIMEOUT"]);
        assert!(fx.db.ledger().get(a).await.unwrap().is_none());
        assert_eq!(batch_counts(fx.db.pool(), &report.batch_id).await.unwrap(), None);
    }
}
