//! # kasa-core: Pure Settlement Logic
//!
//! The settlement engine's rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kasa Settlement Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              kasa-settlement (use cases, locks, tx)             │   │
//! │  │   SaleService ─ PaymentReconciler ─ StockLedger ─ CartSessions  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐        │   │
//! │  │   │ discount │ │   fifo   │ │ aggregate │ │ payment  │        │   │
//! │  │   │ calculate│ │plan_draws│ │ recompute │ │  check   │        │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────┘        │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐        │   │
//! │  │   │  profit  │ │  rules   │ │   bill    │ │  state   │        │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kasa-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, SaleItem, Payment, StockBatch, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`discount`] - The one discount routine for lines and bills
//! - [`fifo`] - FIFO draw and return planning
//! - [`aggregate`] - Line pricing and sale total recomputation
//! - [`payment`] - Overpayment check and payment status
//! - [`profit`] - Item profit and per-product roll-up
//! - [`rules`] - Tagged discount rule conditions
//! - [`bill`] - Bill number format
//! - [`state`] - Derived sale state
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kasa_core::aggregate::price_line;
//! use kasa_core::discount::DiscountSpec;
//! use kasa_core::Money;
//!
//! // 100.00 × 1 with 10% off
//! let line = price_line(Money::from_cents(10000), 1, DiscountSpec::percentage(1000));
//! assert_eq!(line.line_total.cents(), 9000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregate;
pub mod bill;
pub mod discount;
pub mod error;
pub mod fifo;
pub mod money;
pub mod payment;
pub mod profit;
pub mod rules;
pub mod state;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use discount::{DiscountOutcome, DiscountSpec};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use payment::{MethodTotal, PaymentStatus};
pub use state::SaleState;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches fat-finger entries (1000 instead of 10) before stock moves.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest price, fixed discount or payment accepted, in cents.
///
/// 999 units of a line at this price across every line of a sale still fit
/// in an `i64`.
pub const MAX_MONEY_CENTS: i64 = 1_000_000_000_000;

/// Maximum lines in a single sale or cart.
pub const MAX_SALE_ITEMS: usize = 100;

/// Largest outstanding balance that still counts as fully paid.
///
/// Zero: integer cents leave no rounding residue to absorb.
pub const SETTLEMENT_TOLERANCE: Money = Money::from_cents(0);

/// Bill number prefix used when none is configured.
pub const DEFAULT_BILL_PREFIX: &str = "INV";

/// `reference_type` written on movements caused by sale lines.
pub const SALE_ITEM_REFERENCE: &str = "sale_item";
