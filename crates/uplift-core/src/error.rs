//! # Error Types
//!
//! Domain-specific error types for uplift-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  uplift-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed / missing input                      │
//! │                                                                         │
//! │  uplift-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── UpliftError      - What engine callers see (Core | Db)            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → UpliftError → HTTP layer          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every error names the offending entity (client, product, sale)
//! 3. Errors are enum variants, never String
//! 4. Each variant maps to a stable machine code via [`CoreError::code`]

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock on the ledger key to satisfy a decrement.
    ///
    /// ## When This Occurs
    /// - A sale line requests more than the client holds
    /// - A bulk `subtract` would drive the quantity negative
    /// - A direct `adjust` with a negative delta larger than the balance
    ///
    /// ## User Workflow
    /// ```text
    /// Create sale (product 7, qty: 5)
    ///      │
    ///      ▼
    /// Ledger (client 3, product 7) = 3
    ///      │
    ///      ▼
    /// InsufficientStock { client 3, product 7, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Rep must add stock before retrying
    /// ```
    #[error(
        "Insufficient stock for product {product_id} at client {client_id}: \
         available {available}, requested {requested}"
    )]
    InsufficientStock {
        client_id: i64,
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// Subtract against a ledger key that has never been stocked.
    #[error("No stock entry for product {product_id} at client {client_id}")]
    NoSuchStock { client_id: i64, product_id: i64 },

    /// A ledger quantity would be negative.
    #[error("Invalid stock quantity {quantity}: must not be negative")]
    InvalidQuantity { quantity: i64 },

    #[error("Client not found: {0}")]
    ClientNotFound(i64),

    /// Sales representative referenced by a sale does not exist.
    #[error("Sales representative not found: {0}")]
    UserNotFound(i64),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Uplift sale not found: {0}")]
    SaleNotFound(i64),

    /// Sale is not in a state that allows the requested transition.
    ///
    /// ## When This Occurs
    /// - Moving a voided sale back to pending/completed
    #[error("Uplift sale {sale_id} is {current_status}, cannot move to {requested}")]
    InvalidSaleStatus {
        sale_id: i64,
        current_status: String,
        requested: String,
    },

    /// The unit of work exceeded its time bound and was rolled back.
    #[error("{operation} timed out after {limit_ms}ms; nothing was committed")]
    Timeout { operation: String, limit_ms: u64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable machine-readable code for the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::NoSuchStock { .. } => "NO_SUCH_STOCK",
            CoreError::InvalidQuantity { .. } | CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::ClientNotFound(_)
            | CoreError::UserNotFound(_)
            | CoreError::ProductNotFound(_)
            | CoreError::SaleNotFound(_) => "NOT_FOUND",
            CoreError::InvalidSaleStatus { .. } => "INVALID_STATUS",
            CoreError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Whether the caller may retry the whole operation unchanged.
    ///
    /// Only timeouts qualify: nothing partial was committed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Used for early validation before any unit of work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Arithmetic on the value would overflow.
    #[error("{field} is too large")]
    Overflow { field: String },

    /// Invalid format (e.g., blank status).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
