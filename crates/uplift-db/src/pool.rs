//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite, and the
//! [`Database`] handle that hands out repositories and engines.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Process startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Settings::from_env().db_config() ← or DbConfig::new(path)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐    │
//! │  │            SqlitePool                    │   │    KeyLocks      │    │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │ (client,product) │    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   │  → async mutex   │    │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │   └──────────────────┘    │
//! │  └─────────────────────────────────────────┘            │              │
//! │       │                                                  │              │
//! │       └──────────────┬───────────────────────────────────┘              │
//! │                      ▼                                                  │
//! │  db.ledger() / db.sale_engine() / db.reversal_engine() / ...           │
//! │  (all share one pool and one lock registry)                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode and Busy Timeout
//! WAL lets readers proceed while one writer commits. Writers still take
//! turns; a connection that finds the write lock held waits up to
//! `busy_timeout` before failing with [`DbError::Busy`].

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::engine::{BulkAdjustmentEngine, ReversalEngine, SaleEngine};
use crate::error::{DbError, DbResult};
use crate::locks::KeyLocks;
use crate::migrations;
use crate::repository::catalog::CatalogRepository;
use crate::repository::ledger::StockLedger;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/uplift.db")
///     .max_connections(5)
///     .unit_of_work_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Time to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a statement waits on SQLite's write lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Upper bound on one unit of work, lock waits included.
    /// Default: 10 seconds
    pub unit_of_work_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            unit_of_work_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn unit_of_work_timeout(mut self, timeout: Duration) -> Self {
        self.unit_of_work_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let config = DbConfig::in_memory();
    /// let db = Database::new(config).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            busy_timeout: Duration::from_secs(5),
            unit_of_work_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and engine access.
///
/// Cloning is cheap: the pool and the lock registry are shared. There is
/// no global instance; callers pass the handle explicitly.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./uplift.db")).await?;
///
/// let sale = db.sale_engine().create_sale(request).await?;
/// let voided = db.reversal_engine().void_sale(sale.id).await?;
/// let report = db.bulk_engine().bulk_adjust(entries).await;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Per-(client, product) locks shared by the ledger and every engine.
    locks: Arc<KeyLocks>,

    unit_of_work_timeout: Duration,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout so concurrent writers wait instead of failing
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            unit_of_work_timeout_ms = config.unit_of_work_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database {
            pool,
            locks: Arc::new(KeyLocks::new()),
            unit_of_work_timeout: config.unit_of_work_timeout,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// - Automatically called by `new()` if `run_migrations` is true
    /// - Idempotent: safe to run multiple times
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// Stock must not be written through it; use [`Database::ledger`].
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the lock registry shared by the ledger and the engines.
    pub fn locks(&self) -> &Arc<KeyLocks> {
        &self.locks
    }

    pub fn unit_of_work_timeout(&self) -> Duration {
        self.unit_of_work_timeout
    }

    /// Returns the stock ledger.
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(
            self.pool.clone(),
            Arc::clone(&self.locks),
            self.unit_of_work_timeout,
        )
    }

    /// Returns the client / sales rep / product catalogue.
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    /// Returns the uplift sale read side.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn sale_engine(&self) -> SaleEngine {
        SaleEngine::new(
            self.pool.clone(),
            Arc::clone(&self.locks),
            self.unit_of_work_timeout,
        )
    }

    pub fn reversal_engine(&self) -> ReversalEngine {
        ReversalEngine::new(
            self.pool.clone(),
            Arc::clone(&self.locks),
            self.unit_of_work_timeout,
        )
    }

    pub fn bulk_engine(&self) -> BulkAdjustmentEngine {
        BulkAdjustmentEngine::new(
            self.pool.clone(),
            Arc::clone(&self.locks),
            self.unit_of_work_timeout,
        )
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
