//! # Transaction Engines
//!
//! The three operations that move stock as part of a larger unit of work.
//!
//! ## Unit of Work Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate input            (pure, uplift-core)                         │
//! │  ┌─────────────── bounded(timeout) ──────────────────────────────────┐ │
//! │  │ existence checks       (pool reads, no locks held)                │ │
//! │  │ lock_all(keys)         sorted, per (client, product)              │ │
//! │  │ BEGIN                                                             │ │
//! │  │ first statement is a write (takes SQLite's write lock up front)   │ │
//! │  │ reads → policy → ledger primitives → sale rows                    │ │
//! │  └───────────────────────────────────────────────── → Prepared ──────┘ │
//! │  COMMIT                    (outside the bound)                         │
//! │  drop guards                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Starting with a write matters on SQLite: a deferred transaction that
//! reads first and then writes fails with `SQLITE_BUSY_SNAPSHOT` if another
//! connection committed in between, and the busy timeout cannot help.

pub mod bulk;
pub mod reversal;
pub mod sale;
pub mod unit_of_work;

pub use bulk::BulkAdjustmentEngine;
pub use reversal::ReversalEngine;
pub use sale::SaleEngine;
