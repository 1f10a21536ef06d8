//! # Payment Reconciliation
//!
//! Pure checks behind the Payment Reconciler.
//!
//! ## Split Tender
//! ```text
//! total 85.00
//!   cash  50.00   ✓  paid 50.00   balance 35.00
//!   card  40.00   ✗  50 + 40 > 85 → Overpayment, nothing stored
//!   card  35.00   ✓  paid 85.00   balance 0.00   → fully paid
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Payment, PaymentMethod};
use crate::SETTLEMENT_TOLERANCE;

/// Paid amount per method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub count: i64,
}

/// Where a sale stands against its payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentStatus {
    pub total_amount_cents: i64,
    pub total_paid_cents: i64,
    pub balance_cents: i64,
    pub is_fully_paid: bool,
    pub payment_count: i64,
    /// Sorted by method.
    pub by_method: Vec<MethodTotal>,
}

/// Checks that a payment of `amount` may be accepted.
///
/// `replacing` names a payment being updated; its current amount is left out
/// of the existing total.
///
/// ## Errors
/// - `Validation` if `amount <= 0`
/// - `Overpayment` if existing payments plus `amount` exceed `total`, or
///   overflow
pub fn check_payment(
    total: Money,
    existing: &[Payment],
    replacing: Option<&str>,
    amount: Money,
) -> CoreResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        }
        .into());
    }

    let paid: Money = existing
        .iter()
        .filter(|p| Some(p.id.as_str()) != replacing)
        .map(Payment::amount)
        .sum();

    let exceeds = match paid.checked_add(amount) {
        Some(after) => after > total,
        None => true,
    };
    if exceeds {
        return Err(CoreError::Overpayment {
            total_cents: total.cents(),
            paid_cents: paid.cents(),
            attempted_cents: amount.cents(),
        });
    }

    Ok(())
}

/// Summarizes payments against a sale total.
pub fn summarize(total: Money, payments: &[Payment]) -> PaymentStatus {
    let paid: Money = payments.iter().map(Payment::amount).sum();
    let balance = total - paid;

    let mut by_method: Vec<MethodTotal> = Vec::new();
    for payment in payments {
        match by_method.iter_mut().find(|m| m.method == payment.method) {
            Some(entry) => {
                entry.amount_cents += payment.amount_cents;
                entry.count += 1;
            }
            None => by_method.push(MethodTotal {
                method: payment.method,
                amount_cents: payment.amount_cents,
                count: 1,
            }),
        }
    }
    by_method.sort_by_key(|m| m.method);

    PaymentStatus {
        total_amount_cents: total.cents(),
        total_paid_cents: paid.cents(),
        balance_cents: balance.cents(),
        is_fully_paid: balance <= SETTLEMENT_TOLERANCE,
        payment_count: payments.len() as i64,
        by_method,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
