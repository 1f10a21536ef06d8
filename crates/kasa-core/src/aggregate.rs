//! # Sale Aggregator
//!
//! Line pricing and sale total recomputation. `recompute` is the only code
//! that produces a sale's subtotal, bill discount and total.
//!
//! ```text
//! line:  gross = unit_price × qty ──► calculate(gross, line spec) ──► line_total
//! sale:  subtotal = Σ line_total  ──► calculate(subtotal, bill spec) ──► total
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::{calculate, DiscountSpec};
use crate::money::Money;
use crate::types::{Sale, SaleItem};

/// Priced line before it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinePricing {
    pub gross: Money,
    pub discount: Money,
    pub line_total: Money,
}

/// Sale totals derived from the current lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
}

/// Prices a single line through the shared discount routine.
pub fn price_line(unit_price: Money, quantity: i64, spec: DiscountSpec) -> LinePricing {
    let gross = unit_price.multiply_quantity(quantity);
    let outcome = calculate(gross, spec);
    LinePricing {
        gross,
        discount: outcome.discount,
        line_total: outcome.final_amount,
    }
}

/// Totals for a set of line totals and a bill discount.
pub fn totals<I>(line_totals: I, bill: DiscountSpec) -> SaleTotals
where
    I: IntoIterator<Item = Money>,
{
    let subtotal: Money = line_totals.into_iter().sum();
    let outcome = calculate(subtotal, bill);
    SaleTotals {
        subtotal,
        discount: outcome.discount,
        total_amount: outcome.final_amount,
    }
}

/// Returns `sale` with totals recomputed from `items`.
///
/// Pure and idempotent: recomputing an unchanged sale yields the same sale.
pub fn recompute(sale: &Sale, items: &[SaleItem]) -> Sale {
    let t = totals(items.iter().map(SaleItem::line_total), sale.bill_discount());
    Sale {
        subtotal_cents: t.subtotal.cents(),
        discount_cents: t.discount.cents(),
        total_amount_cents: t.total_amount.cents(),
        ..sale.clone()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sale(bill: DiscountSpec) -> Sale {
        let now = Utc::now();
        Sale {
            id: "s-1".into(),
            bill_number: "INV-20260101-000001".into(),
            customer_id: None,
            cashier_id: "u-1".into(),
            sale_date: now,
            discount_percentage_bps: bill.percentage_bps,
            discount_fixed_cents: bill.fixed_cents,
            subtotal_cents: 0,
            discount_cents: 0,
            total_amount_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(unit_price: i64, quantity: i64, spec: DiscountSpec) -> SaleItem {
        let priced = price_line(Money::from_cents(unit_price), quantity, spec);
        let now = Utc::now();
        SaleItem {
            id: "i".into(),
            sale_id: "s-1".into(),
            product_id: "p".into(),
            quantity,
            unit_price_cents: unit_price,
            unit_cost_cents: 0,
            discount_percentage_bps: spec.percentage_bps,
            discount_fixed_cents: spec.fixed_cents,
            discount_cents: priced.discount.cents(),
            line_total_cents: priced.line_total.cents(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_price_line() {
        let p = price_line(Money::from_cents(10000), 1, DiscountSpec::percentage(1000));
        assert_eq!(p.gross.cents(), 10000);
        assert_eq!(p.discount.cents(), 1000);
        assert_eq!(p.line_total.cents(), 9000);
    }

    #[test]
    fn test_recompute_with_bill_discount() {
        let s = sale(DiscountSpec::fixed(500));
        let items = vec![item(10000, 1, DiscountSpec::percentage(1000))];
        let out = recompute(&s, &items);
        assert_eq!(out.subtotal_cents, 9000);
        assert_eq!(out.discount_cents, 500);
        assert_eq!(out.total_amount_cents, 8500);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let s = sale(DiscountSpec::new(1500, 125));
        let items = vec![
            item(1999, 3, DiscountSpec::none()),
            item(450, 7, DiscountSpec::fixed(50)),
        ];
        let once = recompute(&s, &items);
        let twice = recompute(&once, &items);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_recompute_empty_sale() {
        let s = sale(DiscountSpec::fixed(500));
        let out = recompute(&s, &[]);
        assert_eq!(out.subtotal_cents, 0);
        assert_eq!(out.discount_cents, 0);
        assert_eq!(out.total_amount_cents, 0);
    }
}
