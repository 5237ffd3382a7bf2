//! # Sale Pricing and Stock Draws
//!
//! Pure halves of the sale transaction engine: how much stock a sale takes
//! from each ledger key, and what each line and the whole sale cost.
//!
//! ## Flow
//! ```text
//! NewSale.items ──► plan_draws(on_hand) ──► Vec<StockDraw>  (one per product)
//!        │
//!        └───────► price_lines()       ──► PricedSale { lines, total }
//! ```

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{LedgerKey, SaleLine};

// =============================================================================
// Stock Draws
// =============================================================================

/// Total quantity a sale takes from one ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDraw {
    pub key: LedgerKey,
    pub quantity: i64,
}

/// Checks every line against on-hand stock and sums draws per product.
///
/// Lines are checked in submitted order against a running balance, so two
/// lines for the same product share one balance. A product missing from
/// `on_hand` has no stock.
///
/// ## Returns
/// One draw per distinct product, ordered by ledger key.
///
/// ## Errors
/// `InsufficientStock` for the first line the remaining balance can't cover.
pub fn plan_draws(
    client_id: i64,
    lines: &[SaleLine],
    on_hand: &BTreeMap<i64, i64>,
) -> CoreResult<Vec<StockDraw>> {
    let mut remaining: BTreeMap<i64, i64> = BTreeMap::new();
    let mut drawn: BTreeMap<i64, i64> = BTreeMap::new();

    for line in lines {
        let balance = remaining
            .entry(line.product_id)
            .or_insert_with(|| on_hand.get(&line.product_id).copied().unwrap_or(0));

        if *balance < line.quantity {
            return Err(CoreError::InsufficientStock {
                client_id,
                product_id: line.product_id,
                available: *balance,
                requested: line.quantity,
            });
        }

        *balance -= line.quantity;
        *drawn.entry(line.product_id).or_insert(0) += line.quantity;
    }

    Ok(drawn
        .into_iter()
        .map(|(product_id, quantity)| StockDraw {
            key: LedgerKey::new(client_id, product_id),
            quantity,
        })
        .collect())
}

// =============================================================================
// Pricing
// =============================================================================

/// A sale line with its computed total.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub position: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedSale {
    pub lines: Vec<PricedLine>,
    pub total: Money,
}

/// Prices every line and sums the sale total.
///
/// ## Example
/// ```rust
/// use uplift_core::sale::price_lines;
/// use uplift_core::{Money, SaleLine};
///
/// let priced = price_lines(&[SaleLine {
///     product_id: 1,
///     quantity: 5,
///     unit_price: Money::from_cents(200),
/// }])
/// .unwrap();
/// assert_eq!(priced.total, Money::from_cents(1000));
/// ```
pub fn price_lines(lines: &[SaleLine]) -> CoreResult<PricedSale> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut total = Money::zero();

    for (position, line) in lines.iter().enumerate() {
        let line_total = line
            .unit_price
            .checked_multiply_quantity(line.quantity)
            .ok_or_else(|| ValidationError::Overflow {
                field: "total".to_string(),
            })?;

        total = total
            .checked_add(line_total)
            .ok_or_else(|| ValidationError::Overflow {
                field: "totalAmount".to_string(),
            })?;

        priced.push(PricedLine {
            position: position as i64,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total: line_total,
        });
    }

    Ok(PricedSale {
        lines: priced,
        total,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: i64, quantity: i64, cents: i64) -> SaleLine {
        SaleLine {
            product_id,
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_plan_draws_sums_per_product() {
        let on_hand = BTreeMap::from([(1, 20), (2, 4)]);
        let draws = plan_draws(7, &[line(2, 1, 0), line(1, 5, 0), line(2, 3, 0)], &on_hand).unwrap();
        assert_eq!(
            draws,
            vec![
                StockDraw { key: LedgerKey::new(7, 1), quantity: 5 },
                StockDraw { key: LedgerKey::new(7, 2), quantity: 4 },
            ]
        );
    }

    #[test]
    fn test_repeated_product_shares_running_balance() {
        let on_hand = BTreeMap::from([(1, 5)]);
        match plan_draws(7, &[line(1, 3, 0), line(1, 3, 0)], &on_hand) {
            Err(CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            }) => {
                assert_eq!(product_id, 1);
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_stock_counts_as_zero() {
        let err = plan_draws(7, &[line(9, 1, 0)], &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { product_id: 9, available: 0, requested: 1, .. }
        ));
    }

    #[test]
    fn test_price_lines_keeps_positions() {
        let priced = price_lines(&[line(3, 2, 150), line(1, 1, 0)]).unwrap();
        assert_eq!(priced.lines[0].position, 0);
        assert_eq!(priced.lines[0].total, Money::from_cents(300));
        assert_eq!(priced.lines[1].position, 1);
        assert_eq!(priced.lines[1].total, Money::zero());
        assert_eq!(priced.total, Money::from_cents(300));
    }

    #[test]
    fn test_price_overflow_is_validation_error() {
        let err = price_lines(&[line(1, 2, i64::MAX)]).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
