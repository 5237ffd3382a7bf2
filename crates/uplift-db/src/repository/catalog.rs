//! # Catalogue Repository
//!
//! Clients (outlets), users (sales reps) and products. The uplift core only
//! asks whether they exist; inserts are here for seeding and tests.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Catalogue tables the core checks ids against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogTable {
    Clients,
    Users,
    Products,
}

impl CatalogTable {
    fn table(&self) -> &'static str {
        match self {
            CatalogTable::Clients => "clients",
            CatalogTable::Users => "users",
            CatalogTable::Products => "products",
        }
    }
}

/// Repository for catalogue lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    pub async fn client_exists(&self, id: i64) -> DbResult<bool> {
        self.exists(CatalogTable::Clients, id).await
    }

    /// Whether the sales rep exists.
    pub async fn user_exists(&self, id: i64) -> DbResult<bool> {
        self.exists(CatalogTable::Users, id).await
    }

    pub async fn product_exists(&self, id: i64) -> DbResult<bool> {
        self.exists(CatalogTable::Products, id).await
    }

    async fn exists(&self, table: CatalogTable, id: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let found = existing_ids_in(&mut conn, table, &[id]).await?;
        Ok(found.contains(&id))
    }

    pub async fn insert_client(&self, name: &str) -> DbResult<i64> {
        self.insert(CatalogTable::Clients, name).await
    }

    /// Inserts a sales rep.
    pub async fn insert_user(&self, name: &str) -> DbResult<i64> {
        self.insert(CatalogTable::Users, name).await
    }

    pub async fn insert_product(&self, name: &str) -> DbResult<i64> {
        self.insert(CatalogTable::Products, name).await
    }

    async fn insert(&self, table: CatalogTable, name: &str) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (name, created_at) VALUES (?1, ?2)",
            table.table()
        );

        let result = sqlx::query(&sql)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        debug!(table = table.table(), id, name, "Catalogue row inserted");
        Ok(id)
    }

    /// Row count of a catalogue table.
    pub async fn count(&self, table: CatalogTable) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (used inside units of work)
// =============================================================================

/// Returns the subset of `ids` present in `table`.
pub async fn existing_ids_in(
    conn: &mut SqliteConnection,
    table: CatalogTable,
    ids: &[i64],
) -> DbResult<HashSet<i64>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT id FROM {} WHERE id IN (", table.table()));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found = query
        .build_query_scalar::<i64>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_existence_checks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let client = catalog.insert_client("Mama Mboga Kiosk").await.unwrap();
        let rep = catalog.insert_user("Achieng").await.unwrap();
        let product = catalog.insert_product("Maize Flour 2kg").await.unwrap();

        assert!(catalog.client_exists(client).await.unwrap());
        assert!(catalog.user_exists(rep).await.unwrap());
        assert!(catalog.product_exists(product).await.unwrap());
        assert!(!catalog.product_exists(product + 100).await.unwrap());
        assert_eq!(catalog.count(CatalogTable::Products).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_ids_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let a = catalog.insert_product("A").await.unwrap();
        let b = catalog.insert_product("B").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let found = existing_ids_in(&mut conn, CatalogTable::Products, &[a, b, 999])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([a, b]));

        let none = existing_ids_in(&mut conn, CatalogTable::Products, &[]).await.unwrap();
        assert!(none.is_empty());
    }
}
