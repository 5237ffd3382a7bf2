//! # Database Migrations
//!
//! Embedded SQL migrations for the uplift stock core.
//!
//! ## Tables
//! ```text
//! clients, users, products      ← catalogue (existence checks only)
//! client_stock                  ← the stock ledger, CHECK (quantity >= 0)
//! uplift_sales                  ← one row per sale
//! uplift_sale_items             ← ordered lines, owned by their sale
//! stock_adjustment_batches      ← audit row per bulk call
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `crates/uplift-db/migrations/` with the next sequence number
//! 2. Name format: `NNNN_description.sql`
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Migrations embedded at compile time from `crates/uplift-db/migrations`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs all pending database migrations.
///
/// ## Safety
/// - Idempotent: safe to run multiple times
/// - Transactional: each migration runs in a transaction
/// - Ordered: migrations run in filename order
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns (total_migrations, applied_migrations).
///
/// For diagnostics and health checks.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
