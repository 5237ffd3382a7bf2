//! # uplift-core: Pure Business Logic for the Uplift Stock Core
//!
//! This crate holds the rules of the stock-adjustment / uplift-sale core as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Uplift Stock Core Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                HTTP layer (outside this workspace)              │   │
//! │  │     POST /uplift-sales, PATCH /uplift-sales/:id/status, ...     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 uplift-db (engines + ledger)                    │   │
//! │  │   SaleEngine, ReversalEngine, BulkAdjustmentEngine, StockLedger │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ uplift-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │ validation│  │   │
//! │  │   │ StockEntry│  │   Money   │  │ set/add/  │  │   rules   │  │   │
//! │  │   │UpliftSale │  │           │  │ subtract  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StockEntry, UpliftSale, StockAdjustment, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`ledger`] - Stock arithmetic and the per-operation bulk policy
//! - [`sale`] - Sale line pricing and totals
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use uplift_core::ledger::apply_operation;
//! use uplift_core::StockOperation;
//!
//! // Set 5, then subtract 3 from the result
//! let after_set = apply_operation(1, 1, None, StockOperation::Set, 5).unwrap();
//! let after_sub = apply_operation(1, 1, Some(after_set), StockOperation::Subtract, 3).unwrap();
//! assert_eq!(after_sub, 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod sale;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines allowed in a single uplift sale.
///
/// ## Business Reason
/// Keeps one unit of work well inside its timeout budget.
pub const MAX_SALE_LINES: usize = 100;

/// Default page size for paginated listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on a requested page size.
pub const MAX_PAGE_SIZE: u32 = 200;
