//! # Discount Rules
//!
//! Automatic bill discounts offered when a cart meets a condition.
//!
//! Conditions are a closed, tagged enum. Adding a kind means adding a
//! variant, and every `match` over it stops compiling until the new kind is
//! handled.
//!
//! ## Wire Shape
//! ```json
//! {
//!   "name": "Big basket",
//!   "condition": {
//!     "kind": "all_of",
//!     "conditions": [
//!       { "kind": "min_subtotal", "amount_cents": 50000 },
//!       { "kind": "category", "category_id": "dairy", "min_quantity": 3 }
//!     ]
//!   },
//!   "discount": { "percentage_bps": 500, "fixed_cents": 0 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::{calculate, DiscountOutcome, DiscountSpec};
use crate::money::Money;

// =============================================================================
// Rule Types
// =============================================================================

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Cart subtotal is at least `amount_cents`.
    MinSubtotal { amount_cents: i64 },
    /// Cart holds at least `quantity` units in total.
    MinQuantity { quantity: i64 },
    /// Cart holds at least `min_quantity` units from `category_id`.
    Category { category_id: String, min_quantity: i64 },
    /// Every nested condition holds. Empty is true.
    AllOf { conditions: Vec<RuleCondition> },
    /// At least one nested condition holds. Empty is false.
    AnyOf { conditions: Vec<RuleCondition> },
}

/// A named discount with the condition that unlocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRule {
    pub name: String,
    pub condition: RuleCondition,
    pub discount: DiscountSpec,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// One cart line as seen by rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLine {
    pub category_id: Option<String>,
    pub quantity: i64,
    pub line_total: Money,
}

/// The cart facts a condition is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleContext {
    pub lines: Vec<RuleLine>,
}

impl RuleContext {
    pub fn new(lines: Vec<RuleLine>) -> Self {
        RuleContext { lines }
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.line_total).sum()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn category_quantity(&self, category_id: &str) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.category_id.as_deref() == Some(category_id))
            .map(|l| l.quantity)
            .sum()
    }
}

// =============================================================================
// Evaluation
// =============================================================================

impl RuleCondition {
    /// Evaluates the condition. Exhaustive over every kind.
    pub fn matches(&self, ctx: &RuleContext) -> bool {
        match self {
            RuleCondition::MinSubtotal { amount_cents } => {
                ctx.subtotal() >= Money::from_cents(*amount_cents)
            }
            RuleCondition::MinQuantity { quantity } => ctx.total_quantity() >= *quantity,
            RuleCondition::Category {
                category_id,
                min_quantity,
            } => {
                let held = ctx.category_quantity(category_id);
                held > 0 && held >= *min_quantity
            }
            RuleCondition::AllOf { conditions } => conditions.iter().all(|c| c.matches(ctx)),
            RuleCondition::AnyOf { conditions } => conditions.iter().any(|c| c.matches(ctx)),
        }
    }
}

impl DiscountRule {
    pub fn applies_to(&self, ctx: &RuleContext) -> bool {
        self.is_active && self.condition.matches(ctx)
    }
}

/// The matching rule that takes the most off the cart subtotal.
///
/// Ties keep the earlier rule.
pub fn best_rule<'a>(
    rules: &'a [DiscountRule],
    ctx: &RuleContext,
) -> Option<(&'a DiscountRule, DiscountOutcome)> {
    let subtotal = ctx.subtotal();
    rules
        .iter()
        .filter(|r| r.applies_to(ctx))
        .map(|r| (r, calculate(subtotal, r.discount)))
        .fold(None, |best, (rule, outcome)| match best {
            Some((_, b)) if b.discount >= outcome.discount => best,
            _ => Some((rule, outcome)),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
