//! Time bound for a unit of work.
//!
//! Everything a unit of work does before it commits (waiting for key locks,
//! acquiring a connection, statements) runs inside [`bounded`]. On expiry
//! the future is dropped, which drops its open `Transaction`; sqlx rolls an
//! uncommitted transaction back when it is dropped, so nothing is visible.
//!
//! The commit itself runs outside the bound ([`commit_bounded`]). Dropping a
//! pending `COMMIT` does not stop the SQLite worker from finishing it, so a
//! timeout that fired there could report `Timeout` for work that was in fact
//! committed. Keeping it outside means `Timeout` always means nothing was
//! committed, and a retry cannot apply the same work twice.
//!
//! ```text
//! commit_bounded(op, limit, work)
//!      │
//!      ├── timeout(limit) { locks → BEGIN → statements }  → Prepared
//!      ├── COMMIT                                          (unbounded)
//!      └── release locks → value
//! ```

use std::future::Future;
use std::time::Duration;

use sqlx::{Sqlite, Transaction};
use tracing::warn;
use uplift_core::CoreError;

use crate::error::UpliftResult;
use crate::locks::KeyGuards;

/// A unit of work that finished inside its bound and only has to commit.
///
/// Holds the key locks until the commit is done.
pub struct Prepared<T> {
    tx: Transaction<'static, Sqlite>,
    guards: Option<KeyGuards>,
    value: T,
}

impl<T> Prepared<T> {
    pub fn new(tx: Transaction<'static, Sqlite>, value: T) -> Self {
        Prepared {
            tx,
            guards: None,
            value,
        }
    }

    /// Keeps `guards` locked until after the commit.
    pub fn holding(mut self, guards: KeyGuards) -> Self {
        self.guards = Some(guards);
        self
    }
}

/// Runs `work` with an upper bound of `limit`.
///
/// ## Errors
/// `CoreError::Timeout` naming `operation` when the bound is hit, otherwise
/// whatever `work` returns.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, work: F) -> UpliftResult<T>
where
    F: Future<Output = UpliftResult<T>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            let limit_ms = limit.as_millis() as u64;
            warn!(operation, limit_ms, "Unit of work timed out and was rolled back");
            Err(CoreError::Timeout {
                operation: operation.to_string(),
                limit_ms,
            }
            .into())
        }
    }
}

/// Runs `work` under [`bounded`], then commits what it prepared.
///
/// ## Errors
/// - `CoreError::Timeout` if `work` did not finish within `limit`
/// - a database error if the commit fails
pub async fn commit_bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    work: F,
) -> UpliftResult<T>
where
    F: Future<Output = UpliftResult<Prepared<T>>>,
{
    let Prepared { tx, guards, value } = bounded(operation, limit, work).await?;
    tx.commit().await?;
    drop(guards);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpliftError;
    use crate::pool::Database;
    use crate::test_support::Fixture;
    use uplift_core::LedgerKey;

    async fn client_names(db: &Database) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM clients ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = bounded("noop", Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_expiry_reports_timeout() {
        let err = bounded("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "slow timed out after 10ms; nothing was committed");
    }

    #[tokio::test]
    async fn test_prepared_work_commits_and_releases_locks() {
        let fx = Fixture::new().await;
        let key = LedgerKey::new(fx.client, fx.products[0]);
        let pool = fx.db.pool().clone();
        let locks = fx.db.locks().clone();

        let name = commit_bounded("rename", Duration::from_secs(5), async {
            let guards = locks.lock_all([key]).await;
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE clients SET name = 'Renamed' WHERE id = ?1")
                .bind(fx.client)
                .execute(&mut *tx)
                .await?;
            Ok::<_, UpliftError>(Prepared::new(tx, "Renamed").holding(guards))
        })
        .await
        .unwrap();

        assert_eq!(name, "Renamed");
        assert_eq!(client_names(&fx.db).await, vec!["Renamed".to_string()]);

        let relock = tokio::time::timeout(Duration::from_secs(1), fx.db.locks().lock_all([key]));
        assert!(relock.await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_before_commit_leaves_nothing() {
        let fx = Fixture::new().await;
        let pool = fx.db.pool().clone();

        let err = commit_bounded("stalled", Duration::from_millis(50), async {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE clients SET name = 'Stalled' WHERE id = ?1")
                .bind(fx.client)
                .execute(&mut *tx)
                .await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, UpliftError>(Prepared::new(tx, ()))
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), "TIMEOUT");
        assert_eq!(client_names(&fx.db).await, vec!["Corner Shop".to_string()]);
    }
}
