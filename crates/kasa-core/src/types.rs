//! # Domain Types
//!
//! Core domain types used throughout the settlement engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │    SaleItem     │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  sale_id (FK)   │   │  sale_id (FK)   │       │
//! │  │  bill_number    │   │  product_id     │   │  method         │       │
//! │  │  bill discount  │   │  unit_cost      │   │  amount_cents   │       │
//! │  │  total_amount   │   │  line_total     │   └─────────────────┘       │
//! │  └─────────────────┘   └────────┬────────┘                              │
//! │                                 │ reference_id                          │
//! │  ┌─────────────────┐   ┌────────▼────────┐                              │
//! │  │   StockBatch    │◄──│  StockMovement  │  append-only                 │
//! │  │  received_qty   │   │  movement_type  │                              │
//! │  │  available_qty  │   │  signed qty     │                              │
//! │  │  unit_cost      │   │  actor_id       │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, bill_number, batch_number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::discount::DiscountSpec;
use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Collaborators: Product, Customer, User
// =============================================================================

/// A product available for sale.
///
/// Only what settlement needs: existence, active flag, list price and
/// category (for discount rules). Catalog management lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Category, used by category discount rules.
    pub category_id: Option<String>,

    /// List price in cents.
    pub price_cents: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the list price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A customer attached to a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An operator (cashier) account. Every sale references one.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Direct bank transfer.
    BankTransfer,
    /// Mobile wallet.
    #[serde(rename = "e_wallet")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "e_wallet"))]
    EWallet,
    /// Paper check.
    Check,
}

impl PaymentMethod {
    /// Every recognized method, in display order.
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::BankTransfer,
        PaymentMethod::EWallet,
        PaymentMethod::Check,
    ];

    /// Wire name, identical to the serde and database representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::EWallet => "e_wallet",
            PaymentMethod::Check => "check",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses caller-supplied method names.
///
/// ## Example
/// ```rust
/// use kasa_core::PaymentMethod;
///
/// assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
/// assert!("bitcoin".parse::<PaymentMethod>().is_err());
/// ```
impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: PaymentMethod::ALL
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            })
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale (bill) being built or already settled.
///
/// `subtotal_cents`, `discount_cents` and `total_amount_cents` are only ever
/// written by [`crate::aggregate::recompute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-readable, unique, never reused.
    pub bill_number: String,
    pub customer_id: Option<String>,
    pub cashier_id: String,
    #[ts(as = "String")]
    pub sale_date: DateTime<Utc>,
    /// Bill-level percentage discount in basis points.
    pub discount_percentage_bps: i64,
    /// Bill-level fixed discount in cents.
    pub discount_fixed_cents: i64,
    /// Sum of line totals.
    pub subtotal_cents: i64,
    /// Bill discount actually applied (after clamping).
    pub discount_cents: i64,
    pub total_amount_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// The bill-level discount terms.
    #[inline]
    pub fn bill_discount(&self) -> DiscountSpec {
        DiscountSpec::new(self.discount_percentage_bps, self.discount_fixed_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item in a sale.
///
/// `unit_cost_cents` is the FIFO weighted average resolved when the line was
/// created. Later quantity edits do not re-derive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub discount_percentage_bps: i64,
    pub discount_fixed_cents: i64,
    /// Line discount actually applied (after clamping).
    pub discount_cents: i64,
    /// `unit_price × quantity − discount`, never negative.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SaleItem {
    /// The line-level discount terms.
    #[inline]
    pub fn line_discount(&self) -> DiscountSpec {
        DiscountSpec::new(self.discount_percentage_bps, self.discount_fixed_cents)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a sale.
/// A sale can have multiple payments for split tender scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    /// Amount paid in cents.
    pub amount_cents: i64,
    /// External reference (card auth code, transfer id, check number).
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Stock
// =============================================================================

/// A discrete receipt of inventory.
///
/// Never physically deleted: exhausted batches stay for costing history.
/// `0 <= available_quantity <= received_quantity` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockBatch {
    pub id: String,
    pub product_id: String,
    pub batch_number: Option<String>,
    pub lot_number: Option<String>,
    pub received_quantity: i64,
    pub available_quantity: i64,
    pub unit_cost_cents: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<DateTime<Utc>>,
    /// FIFO ordering key.
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    pub is_active: bool,
}

impl StockBatch {
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }
}

/// Why a stock quantity changed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Units drawn for a sale line (negative quantity).
    Sale,
    /// Units received into a batch (positive quantity).
    Receipt,
    /// Manual correction, or units returned from an edited line.
    Adjustment,
    /// Between locations. Recorded, never generated by settlement.
    Transfer,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::Receipt => "receipt",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
        }
    }
}

/// An immutable ledger entry recording a quantity change and its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub batch_id: Option<String>,
    pub movement_type: MovementType,
    /// Signed: negative takes stock out, positive puts it back.
    pub quantity: i64,
    /// Originating document kind, e.g. "sale_item".
    pub reference_type: Option<String>,
    /// Originating document id, e.g. a sale item id.
    pub reference_id: Option<String>,
    pub actor_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reporting
// =============================================================================

/// Roll-up of sales in a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub sale_count: i64,
    pub units_sold: i64,
    /// Sum of line totals (after line discounts).
    pub subtotal_cents: i64,
    /// Sum of line discounts.
    pub line_discount_cents: i64,
    /// Sum of bill discounts.
    pub bill_discount_cents: i64,
    pub total_amount_cents: i64,
    pub total_paid_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
