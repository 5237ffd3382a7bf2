//! # Validation Module
//!
//! Input validation for the uplift stock core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer                                                   │
//! │  ├── JSON shape (deserialization)                                      │
//! │  └── Auth                                                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any unit of work starts)                 │
//! │  ├── Presence of ids / quantities                                      │
//! │  └── Sign rules: sale qty > 0, price ≥ 0, bulk qty per operation       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0) on client_stock                             │
//! │  ├── UNIQUE (client_id, product_id)                                    │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{LedgerKey, NewSale, StockAdjustment, StockOperation};
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a database id (must be a positive integer).
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Sale Validators
// =============================================================================

/// Validates a sale line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_sale_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a unit price.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free uplift samples)
///
/// ## Example
/// ```rust
/// use uplift_core::money::Money;
/// use uplift_core::validation::validate_unit_price;
///
/// assert!(validate_unit_price(Money::from_cents(200)).is_ok());
/// assert!(validate_unit_price(Money::zero()).is_ok());
/// assert!(validate_unit_price(Money::from_cents(-1)).is_err());
/// ```
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "unitPrice".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a complete sale request before any stock is touched.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Rep submits: { clientId, userId, items: [...] }                        │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_new_sale ← THIS FUNCTION                                     │
/// │       │                                                                 │
/// │       ├── ids ≤ 0?           → "clientId must be positive"             │
/// │       ├── items empty?       → "items is required"                     │
/// │       ├── > 100 lines?       → "items must be between 1 and 100"       │
/// │       ├── qty ≤ 0?           → "quantity must be positive"             │
/// │       ├── price < 0?         → "unitPrice must be between ..."         │
/// │       │                                                                 │
/// │       └── OK → existence checks, then the unit of work                 │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    validate_id("clientId", sale.client_id)?;
    validate_id("userId", sale.user_id)?;

    if sale.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if sale.items.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    for line in &sale.items {
        validate_id("productId", line.product_id)?;
        validate_sale_quantity(line.quantity)?;
        validate_unit_price(line.unit_price)?;
    }

    Ok(())
}

/// Validates a requested sale status label.
///
/// ## Returns
/// The trimmed status string.
pub fn validate_status(status: &str) -> ValidationResult<String> {
    let status = status.trim();

    if status.is_empty() {
        return Err(ValidationError::Required {
            field: "status".to_string(),
        });
    }

    if status.len() > 50 {
        return Err(ValidationError::InvalidFormat {
            field: "status".to_string(),
            reason: "must be at most 50 characters".to_string(),
        });
    }

    Ok(status.to_string())
}

// =============================================================================
// Bulk Adjustment Validators
// =============================================================================

/// A bulk entry whose presence and sign rules have been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedAdjustment {
    pub key: LedgerKey,
    pub quantity: i64,
    pub operation: StockOperation,
}

/// Validates one bulk entry.
///
/// ## Rules
/// - clientId, productId and quantity are required
/// - `set`: quantity ≥ 0
/// - `add` / `subtract`: quantity > 0
pub fn validate_adjustment(entry: &StockAdjustment) -> ValidationResult<ValidatedAdjustment> {
    let (client_id, product_id, quantity) =
        match (entry.client_id, entry.product_id, entry.quantity) {
            (Some(c), Some(p), Some(q)) => (c, p, q),
            _ => {
                return Err(ValidationError::Required {
                    field: "clientId, productId, and quantity".to_string(),
                })
            }
        };

    validate_id("clientId", client_id)?;
    validate_id("productId", product_id)?;

    match entry.operation {
        StockOperation::Set if quantity < 0 => {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: i64::MAX,
            })
        }
        StockOperation::Add | StockOperation::Subtract if quantity <= 0 => {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            })
        }
        _ => {}
    }

    Ok(ValidatedAdjustment {
        key: LedgerKey::new(client_id, product_id),
        quantity,
        operation: entry.operation,
    })
}

// =============================================================================
// Pagination
// =============================================================================

/// Resolves optional page/limit query values.
///
/// ## Returns
/// `(page, limit)` with page ≥ 1 and 1 ≤ limit ≤ MAX_PAGE_SIZE.
pub fn validate_page(page: Option<u32>, limit: Option<u32>) -> ValidationResult<(u32, u32)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page == 0 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }

    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE as i64,
        });
    }

    Ok((page, limit))
}

// =============================================================================
// Unit Tests
// =============================================================================
