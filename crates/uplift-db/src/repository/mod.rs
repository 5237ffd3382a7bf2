//! # Repository Module
//!
//! Database access for the uplift stock core.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Levels of Access                                 │
//! │                                                                         │
//! │  Pool-level (each call is its own unit of work)                        │
//! │  ├── StockLedger::get / quantity / upsert_set / adjust / delete        │
//! │  ├── CatalogRepository::client_exists / user_exists / product_exists   │
//! │  └── SaleRepository::get_by_id / list                                  │
//! │                                                                         │
//! │  Connection-level `*_in` functions                                     │
//! │  ├── take `&mut SqliteConnection` (a Transaction or savepoint)         │
//! │  └── used by the engines to compose one atomic unit of work            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StockLedger`](ledger::StockLedger) - On-hand stock per (client, product)
//! - [`SaleRepository`](sale::SaleRepository) - Uplift sales and items
//! - [`CatalogRepository`](catalog::CatalogRepository) - Existence checks

pub mod catalog;
pub mod ledger;
pub mod sale;
