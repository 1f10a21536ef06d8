//! # Sale State
//!
//! Derived on read, never stored.
//!
//! ```text
//!  ┌────────┐  first item   ┌────────┐  payments cover total  ┌─────────┐
//!  │  Open  │ ────────────► │ Priced │ ─────────────────────► │ Settled │
//!  └────────┘ ◄──────────── └────────┘                        └─────────┘
//!              last item removed                          (no more mutations)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::payment::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    /// No items yet.
    Open,
    /// Items costed and totals computed, balance outstanding.
    Priced,
    /// At least one payment and the balance is within tolerance.
    Settled,
}

impl SaleState {
    /// Derives the state from the item count and payment status.
    pub fn derive(item_count: usize, status: &PaymentStatus) -> Self {
        if status.payment_count > 0 && status.is_fully_paid {
            SaleState::Settled
        } else if item_count == 0 {
            SaleState::Open
        } else {
            SaleState::Priced
        }
    }

    /// Items, bill discount and the sale itself may still change.
    pub const fn is_mutable(&self) -> bool {
        !matches!(self, SaleState::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(total: i64, paid: i64, count: i64) -> PaymentStatus {
        PaymentStatus {
            total_amount_cents: total,
            total_paid_cents: paid,
            balance_cents: total - paid,
            is_fully_paid: total - paid <= 0,
            payment_count: count,
            by_method: vec![],
        }
    }

    #[test]
    fn test_derive() {
        assert_eq!(SaleState::derive(0, &status(0, 0, 0)), SaleState::Open);
        assert_eq!(SaleState::derive(2, &status(8500, 0, 0)), SaleState::Priced);
        assert_eq!(SaleState::derive(2, &status(8500, 5000, 1)), SaleState::Priced);
        assert_eq!(SaleState::derive(2, &status(8500, 8500, 2)), SaleState::Settled);
    }

    #[test]
    fn test_zero_total_without_payment_is_not_settled() {
        // fully discounted bill: nothing owed, but nobody has paid
        assert_eq!(SaleState::derive(1, &status(0, 0, 0)), SaleState::Priced);
        assert!(SaleState::Priced.is_mutable());
        assert!(!SaleState::Settled.is_mutable());
    }
}
