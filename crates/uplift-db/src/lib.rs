//! # uplift-db: Storage and Transaction Engines for Uplift Stock
//!
//! SQLite storage for per-client stock, uplift sales and bulk adjustments,
//! plus the engines that change stock as part of a larger unit of work.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Uplift Stock Data Flow                           │
//! │                                                                         │
//! │  HTTP handler / seed binary                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     uplift-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Engines     │    │  Repositories │    │   Database   │   │   │
//! │  │   │               │    │               │    │   (pool.rs)  │   │   │
//! │  │   │ SaleEngine    │───►│ StockLedger   │───►│ SqlitePool   │   │   │
//! │  │   │ ReversalEngine│    │ SaleRepo      │    │ KeyLocks     │   │   │
//! │  │   │ BulkEngine    │    │ CatalogRepo   │    │ Migrations   │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SQLite Database (WAL mode)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment settings
//! - [`pool`] - Connection pool and handle factory
//! - [`migrations`] - Embedded schema migrations
//! - [`locks`] - Per-(client, product) lock registry
//! - [`repository`] - Stock ledger, sales and catalog lookups
//! - [`engine`] - Sale, reversal and bulk adjustment units of work
//! - [`error`] - Storage and operation errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use uplift_db::{Database, Settings};
//!
//! let db = Database::new(Settings::from_env()?.db_config()).await?;
//!
//! db.ledger().upsert_set(LedgerKey::new(1, 1), 20).await?;
//! let sale = db.sale_engine().create_sale(request).await?;
//! db.reversal_engine().void_sale(sale.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, Settings};
pub use engine::{BulkAdjustmentEngine, ReversalEngine, SaleEngine};
pub use error::{DbError, DbResult, UpliftError, UpliftResult};
pub use locks::KeyLocks;
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::ledger::StockLedger;
pub use repository::sale::SaleRepository;

// =============================================================================
// Test Fixture
// =============================================================================
