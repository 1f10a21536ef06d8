//! # Profit
//!
//! Per-line profit and the per-product profit roll-up.
//!
//! Profit is floored at zero: a loss-making line reports 0, not a negative
//! number.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

/// `max(0, (unit_price × qty − line_discount) − unit_cost × qty)`.
///
/// ## Example
/// ```rust
/// use kasa_core::profit::item_profit;
/// use kasa_core::Money;
///
/// let p = item_profit(Money::from_cents(1000), Money::from_cents(1500), Money::zero(), 2);
/// assert_eq!(p.cents(), 1000);
/// ```
pub fn item_profit(unit_cost: Money, unit_price: Money, line_discount: Money, quantity: i64) -> Money {
    let revenue = unit_price * quantity - line_discount;
    let cost = unit_cost * quantity;
    (revenue - cost).non_negative()
}

/// A sold line as seen by profit analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfitLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub unit_cost: Money,
    pub line_discount: Money,
    pub line_total: Money,
}

/// Profit of one product over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductProfit {
    pub product_id: String,
    pub product_name: String,
    pub quantity_sold: i64,
    pub revenue_cents: i64,
    pub cost_cents: i64,
    pub profit_cents: i64,
}

/// Profit over a period, broken down by product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfitAnalysis {
    pub revenue_cents: i64,
    pub cost_cents: i64,
    pub profit_cents: i64,
    /// Highest profit first.
    pub by_product: Vec<ProductProfit>,
}

/// Rolls lines up per product. Each line's profit is clamped on its own
/// before summing.
pub fn analyze<I>(lines: I) -> ProfitAnalysis
where
    I: IntoIterator<Item = ProfitLine>,
{
    let mut by_product: Vec<ProductProfit> = Vec::new();

    for line in lines {
        let profit = item_profit(line.unit_cost, line.unit_price, line.line_discount, line.quantity);
        let cost = line.unit_cost * line.quantity;

        let idx = match by_product.iter().position(|p| p.product_id == line.product_id) {
            Some(idx) => idx,
            None => {
                by_product.push(ProductProfit {
                    product_id: line.product_id.clone(),
                    product_name: line.product_name.clone(),
                    quantity_sold: 0,
                    revenue_cents: 0,
                    cost_cents: 0,
                    profit_cents: 0,
                });
                by_product.len() - 1
            }
        };
        let entry = &mut by_product[idx];
        entry.quantity_sold += line.quantity;
        entry.revenue_cents += line.line_total.cents();
        entry.cost_cents += cost.cents();
        entry.profit_cents += profit.cents();
    }

    by_product.sort_by(|a, b| {
        b.profit_cents
            .cmp(&a.profit_cents)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });

    ProfitAnalysis {
        revenue_cents: by_product.iter().map(|p| p.revenue_cents).sum(),
        cost_cents: by_product.iter().map(|p| p.cost_cents).sum(),
        profit_cents: by_product.iter().map(|p| p.profit_cents).sum(),
        by_product,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_item_profit() {
        assert_eq!(item_profit(cents(10), cents(15), cents(0), 2), cents(10));
    }

    #[test]
    fn test_loss_is_clamped() {
        assert_eq!(item_profit(cents(20), cents(15), cents(0), 1), Money::zero());
    }

    #[test]
    fn test_discount_reduces_profit() {
        // revenue 30.00 - 4.00 = 26.00, cost 20.00
        assert_eq!(item_profit(cents(1000), cents(1500), cents(400), 2), cents(600));
    }

    #[test]
    fn test_analyze_groups_by_product() {
        let line = |id: &str, qty, price, cost| ProfitLine {
            product_id: id.into(),
            product_name: id.to_uppercase(),
            quantity: qty,
            unit_price: cents(price),
            unit_cost: cents(cost),
            line_discount: Money::zero(),
            line_total: cents(price * qty),
        };
        let analysis = analyze(vec![
            line("a", 2, 1500, 1000),
            line("b", 1, 1500, 2000),
            line("a", 1, 1500, 1000),
        ]);

        assert_eq!(analysis.by_product.len(), 2);
        assert_eq!(analysis.by_product[0].product_id, "a");
        assert_eq!(analysis.by_product[0].quantity_sold, 3);
        assert_eq!(analysis.by_product[0].profit_cents, 1500);
        // b lost money: clamped, not negative
        assert_eq!(analysis.by_product[1].profit_cents, 0);
        assert_eq!(analysis.revenue_cents, 6000);
        assert_eq!(analysis.cost_cents, 5000);
        assert_eq!(analysis.profit_cents, 1500);
    }
}
