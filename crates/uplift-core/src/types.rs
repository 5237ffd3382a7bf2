//! # Domain Types
//!
//! Core domain types used throughout the uplift stock core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StockEntry    │   │   UpliftSale    │   │ UpliftSaleItem  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  client_id ┐key │   │  id             │   │  position       │       │
//! │  │  product_id┘    │   │  client_id      │   │  product_id     │       │
//! │  │  quantity ≥ 0   │   │  user_id        │   │  quantity > 0   │       │
//! │  └─────────────────┘   │  status         │   │  unit_price     │       │
//! │                        │  total_amount   │   │  total          │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐                        │
//! │  │ StockAdjustment │──►│ BulkAdjustmentReport │  (transient, not       │
//! │  │  set/add/sub    │   │  successes/failures  │   persisted per entry) │
//! │  └─────────────────┘   └──────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! JSON shapes use camelCase to match the field names the mobile clients
//! already send (`clientId`, `productId`, `unitPrice`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Ledger Key
// =============================================================================

/// Identifies one StockEntry: the (client, product) pair.
///
/// `Ord` is derived so multi-key units of work can lock keys in one global
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKey {
    pub client_id: i64,
    pub product_id: i64,
}

impl LedgerKey {
    #[inline]
    pub const fn new(client_id: i64, product_id: i64) -> Self {
        LedgerKey {
            client_id,
            product_id,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {} / product {}", self.client_id, self.product_id)
    }
}

// =============================================================================
// Stock Entry
// =============================================================================

/// On-hand quantity of one product at one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub id: i64,
    pub client_id: i64,
    pub product_id: i64,
    /// Never negative after a committed operation.
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    #[inline]
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.client_id, self.product_id)
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// Status of an uplift sale.
///
/// The set is open-ended: reps and back office use their own labels, so any
/// string round-trips through [`SaleStatus::Other`]. `Voided` is the one
/// status with structural meaning: stock has been restored and the sale can
/// never leave that state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SaleStatus {
    Pending,
    Completed,
    Voided,
    Other(String),
}

impl SaleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
            SaleStatus::Other(s) => s.as_str(),
        }
    }

    #[inline]
    pub fn is_voided(&self) -> bool {
        matches!(self, SaleStatus::Voided)
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl From<&str> for SaleStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => SaleStatus::Pending,
            "completed" => SaleStatus::Completed,
            "voided" => SaleStatus::Voided,
            other => SaleStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for SaleStatus {
    fn from(s: String) -> Self {
        SaleStatus::from(s.as_str())
    }
}

impl From<SaleStatus> for String {
    fn from(status: SaleStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Uplift Sale
// =============================================================================

/// A line item of an uplift sale. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpliftSaleItem {
    pub id: i64,
    pub sale_id: i64,
    /// Zero-based index of the line in the submitted request.
    pub position: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One uplift sale with its items in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpliftSale {
    pub id: i64,
    pub client_id: i64,
    /// The sales representative who made the sale.
    pub user_id: i64,
    #[ts(type = "string")]
    pub status: SaleStatus,
    /// Always equal to the sum of `items[].total`.
    pub total_amount: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub items: Vec<UpliftSaleItem>,
}

impl UpliftSale {
    /// Sum of the item totals (what `total_amount` must equal).
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.total).sum()
    }

    /// Ledger keys this sale touched, one per item.
    pub fn ledger_keys(&self) -> Vec<LedgerKey> {
        self.items
            .iter()
            .map(|item| LedgerKey::new(self.client_id, item.product_id))
            .collect()
    }
}

// =============================================================================
// Sale Requests
// =============================================================================

/// One requested line of a new sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Input to the sale transaction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub client_id: i64,
    pub user_id: i64,
    pub items: Vec<SaleLine>,
}

// =============================================================================
// Bulk Adjustment
// =============================================================================

/// What a bulk entry does to its ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum StockOperation {
    /// Overwrite the quantity (creating the row if absent).
    #[default]
    Set,
    /// Increase the quantity (creating the row if absent).
    Add,
    /// Decrease an existing quantity.
    Subtract,
}

impl StockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperation::Set => "set",
            StockOperation::Add => "add",
            StockOperation::Subtract => "subtract",
        }
    }
}

/// One entry of a bulk adjustment request.
///
/// Ids and quantity are optional so a malformed entry fails on its own
/// instead of rejecting the whole batch at deserialization. A missing
/// `operation` means `set`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub client_id: Option<i64>,
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub operation: StockOperation,
}

impl StockAdjustment {
    pub fn new(client_id: i64, product_id: i64, quantity: i64, operation: StockOperation) -> Self {
        StockAdjustment {
            client_id: Some(client_id),
            product_id: Some(product_id),
            quantity: Some(quantity),
            operation,
        }
    }
}

/// A bulk entry that was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentSuccess {
    /// Index of the entry in the submitted batch.
    pub index: usize,
    pub client_id: i64,
    pub product_id: i64,
    pub operation: StockOperation,
    /// `None` when the entry created the row.
    pub previous_quantity: Option<i64>,
    pub quantity: i64,
}

/// A bulk entry that was rejected. Other entries are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentFailure {
    pub index: usize,
    pub client_id: Option<i64>,
    pub product_id: Option<i64>,
    /// Machine code, e.g. `NO_SUCH_STOCK`.
    pub code: String,
    pub error: String,
}

/// Outcome of one bulk adjustment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BulkAdjustmentReport {
    pub batch_id: String,
    pub successes: Vec<AdjustmentSuccess>,
    pub failures: Vec<AdjustmentFailure>,
}

impl BulkAdjustmentReport {
    pub fn entry_count(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Filters for listing uplift sales. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub client_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// One-based page number.
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Pagination block returned with listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    /// Builds the block from a one-based page, a page size and the row count.
    pub fn new(current_page: u32, limit: u32, total_count: i64) -> Self {
        let limit = limit.max(1);
        let total_count = total_count.max(0);
        let total_pages = ((total_count + limit as i64 - 1) / limit as i64) as u32;
        Pagination {
            current_page,
            limit,
            total_pages,
            total_count,
            has_next_page: current_page < total_pages,
            has_previous_page: current_page > 1,
        }
    }

    /// Rows to skip for this page.
    pub fn offset(&self) -> i64 {
        (self.current_page.saturating_sub(1) as i64) * self.limit as i64
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

// =============================================================================
// Unit Tests
// =============================================================================
