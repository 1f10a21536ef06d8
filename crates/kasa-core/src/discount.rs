//! # Discount Calculator
//!
//! The single discount routine used for both line discounts and bill
//! discounts, by the cart preview and by settlement alike.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  calculate(base, { percentage_bps, fixed })                            │
//! │                                                                         │
//! │  1. Sanitize (lenient, never an error):                                │
//! │       base < 0                 → 0                                      │
//! │       percentage ∉ [0, 10000]  → 0                                      │
//! │       fixed < 0                → 0                                      │
//! │                                                                         │
//! │  2. pct_part   = round_half_up(base × bps / 10000)                     │
//! │     fixed_part = fixed  (taken off the percentage remainder)            │
//! │                                                                         │
//! │  3. discount = pct_part + fixed_part                                   │
//! │     if discount > base:  discount = base, final = 0   (clamp)          │
//! │     else:                final = base − discount                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rejecting out-of-range input is a caller concern. See
//! [`crate::validation::validate_discount`].
//!
//! ## Example
//! ```rust
//! use kasa_core::discount::{calculate, DiscountSpec};
//! use kasa_core::Money;
//!
//! // 100.00 with 10% off → 90.00
//! let line = calculate(Money::from_cents(10000), DiscountSpec::percentage(1000));
//! assert_eq!(line.final_amount.cents(), 9000);
//!
//! // 90.00 with 5.00 off → 85.00
//! let bill = calculate(line.final_amount, DiscountSpec::fixed(500));
//! assert_eq!(bill.final_amount.cents(), 8500);
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, BPS_SCALE};

// =============================================================================
// Discount Terms
// =============================================================================

/// A percentage and/or fixed discount, as entered by the cashier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountSpec {
    /// Percentage in basis points (1000 = 10%).
    #[serde(default)]
    pub percentage_bps: i64,
    /// Fixed amount in cents.
    #[serde(default)]
    pub fixed_cents: i64,
}

impl DiscountSpec {
    pub const fn new(percentage_bps: i64, fixed_cents: i64) -> Self {
        DiscountSpec {
            percentage_bps,
            fixed_cents,
        }
    }

    /// No discount.
    pub const fn none() -> Self {
        DiscountSpec::new(0, 0)
    }

    /// Percentage only.
    pub const fn percentage(bps: i64) -> Self {
        DiscountSpec::new(bps, 0)
    }

    /// Fixed amount only.
    pub const fn fixed(cents: i64) -> Self {
        DiscountSpec::new(0, cents)
    }

    pub const fn is_none(&self) -> bool {
        self.percentage_bps == 0 && self.fixed_cents == 0
    }
}

/// Result of a discount calculation.
///
/// `discount + final_amount == base` (after sanitizing) always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountOutcome {
    pub discount: Money,
    pub final_amount: Money,
}

// =============================================================================
// Calculation
// =============================================================================

/// Applies a discount to a base amount.
///
/// Pure and deterministic. Never fails: invalid parts of the discount
/// count as zero and an over-discount is clamped to the base.
pub fn calculate(base: Money, spec: DiscountSpec) -> DiscountOutcome {
    let base = base.non_negative();

    let bps = if (0..=BPS_SCALE).contains(&spec.percentage_bps) {
        spec.percentage_bps
    } else {
        0
    };
    let fixed = Money::from_cents(spec.fixed_cents).non_negative();

    let percentage_part = base.percentage(bps);
    let combined = percentage_part.saturating_add(fixed);

    if combined > base {
        return DiscountOutcome {
            discount: base,
            final_amount: Money::zero(),
        };
    }

    DiscountOutcome {
        discount: combined,
        final_amount: base - combined,
    }
}

/// Positional form of [`calculate`].
#[inline]
pub fn calculate_parts(base: Money, percentage_bps: i64, fixed: Money) -> DiscountOutcome {
    calculate(base, DiscountSpec::new(percentage_bps, fixed.cents()))
}

// =============================================================================
// Unit Tests
// =============================================================================
