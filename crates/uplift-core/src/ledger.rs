//! # Ledger Policy
//!
//! Pure stock arithmetic. The db crate reads the current quantity, asks this
//! module what the new quantity must be, then writes it with a guarded
//! statement. Keeping the rules here means the set/add/subtract table below is
//! tested without a database.
//!
//! ## Operation Table
//! ```text
//! ┌────────────┬──────────────────────────┬─────────────────────────────────┐
//! │ operation  │ row absent               │ row present (qty = q)           │
//! ├────────────┼──────────────────────────┼─────────────────────────────────┤
//! │ set n      │ create with n            │ overwrite with n                │
//! │ add n      │ create with n            │ q + n                           │
//! │ subtract n │ NoSuchStock              │ q - n, InsufficientStock if < 0 │
//! │ delta d    │ d if d ≥ 0               │ q + d, InsufficientStock if < 0 │
//! └────────────┴──────────────────────────┴─────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{LedgerKey, StockOperation};

/// Rejects a negative target quantity for `set`.
pub fn check_set_quantity(quantity: i64) -> CoreResult<()> {
    if quantity < 0 {
        return Err(CoreError::InvalidQuantity { quantity });
    }
    Ok(())
}

/// Computes the quantity after adding `delta` to an existing balance.
///
/// `existing` is `None` when the key has no row; that counts as zero, so a
/// negative delta against an absent key reports `available: 0`.
///
/// ## Example
/// ```rust
/// use uplift_core::ledger::apply_delta;
/// use uplift_core::LedgerKey;
///
/// let key = LedgerKey::new(3, 7);
/// assert_eq!(apply_delta(key, Some(10), -4).unwrap(), 6);
/// assert!(apply_delta(key, Some(3), -5).is_err());
/// ```
pub fn apply_delta(key: LedgerKey, existing: Option<i64>, delta: i64) -> CoreResult<i64> {
    let available = existing.unwrap_or(0);

    let next = available
        .checked_add(delta)
        .ok_or_else(|| ValidationError::Overflow {
            field: "quantity".to_string(),
        })?;

    if next < 0 {
        return Err(CoreError::InsufficientStock {
            client_id: key.client_id,
            product_id: key.product_id,
            available,
            requested: delta.saturating_neg(),
        });
    }

    Ok(next)
}

/// Computes the quantity a bulk entry leaves behind.
///
/// `quantity` is the entry's operand and is assumed to have passed
/// [`crate::validation::validate_adjustment`]; the sign checks here only
/// guard the ledger invariant.
pub fn apply_operation(
    client_id: i64,
    product_id: i64,
    existing: Option<i64>,
    operation: StockOperation,
    quantity: i64,
) -> CoreResult<i64> {
    let key = LedgerKey::new(client_id, product_id);

    match operation {
        StockOperation::Set => {
            check_set_quantity(quantity)?;
            Ok(quantity)
        }
        StockOperation::Add => apply_delta(key, existing, quantity),
        StockOperation::Subtract => match existing {
            None => Err(CoreError::NoSuchStock {
                client_id,
                product_id,
            }),
            Some(current) => apply_delta(key, Some(current), quantity.saturating_neg()),
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_creates_and_overwrites() {
        assert_eq!(apply_operation(1, 1, None, StockOperation::Set, 5).unwrap(), 5);
        assert_eq!(apply_operation(1, 1, Some(40), StockOperation::Set, 0).unwrap(), 0);
        assert!(matches!(
            apply_operation(1, 1, Some(40), StockOperation::Set, -1),
            Err(CoreError::InvalidQuantity { quantity: -1 })
        ));
    }

    #[test]
    fn test_add_creates_missing_row() {
        assert_eq!(apply_operation(1, 2, None, StockOperation::Add, 4).unwrap(), 4);
        assert_eq!(apply_operation(1, 2, Some(6), StockOperation::Add, 4).unwrap(), 10);
    }

    #[test]
    fn test_subtract_requires_existing_row() {
        let err = apply_operation(1, 2, None, StockOperation::Subtract, 10).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NoSuchStock {
                client_id: 1,
                product_id: 2
            }
        ));
        assert_eq!(err.code(), "NO_SUCH_STOCK");
    }

    #[test]
    fn test_subtract_reports_available_and_requested() {
        assert_eq!(apply_operation(1, 1, Some(5), StockOperation::Subtract, 3).unwrap(), 2);
        assert_eq!(apply_operation(1, 1, Some(5), StockOperation::Subtract, 5).unwrap(), 0);

        match apply_operation(1, 1, Some(2), StockOperation::Subtract, 3) {
            Err(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[test]
    fn test_delta_against_absent_key() {
        let key = LedgerKey::new(9, 9);
        assert_eq!(apply_delta(key, None, 3).unwrap(), 3);
        assert!(matches!(
            apply_delta(key, None, -1),
            Err(CoreError::InsufficientStock { available: 0, requested: 1, .. })
        ));
    }

    #[test]
    fn test_delta_overflow_is_validation_error() {
        let key = LedgerKey::new(1, 1);
        let err = apply_delta(key, Some(i64::MAX), 1).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
