//! # FIFO Planning
//!
//! Pure half of the FIFO Cost Resolver: decides how much to draw from each
//! batch and what the drawn units cost. The database half lives in
//! `kasa-settlement::fifo`.
//!
//! ## The Fold
//! ```text
//! batches (oldest first)      remaining
//! ──────────────────────      ─────────
//!                                 8
//! B1 avail 5 @ 10.00  ──take 5──► 3
//! B2 avail 10 @ 12.00 ──take 3──► 0
//! B3 avail 4 @ 13.00  ──skip────► 0
//!
//! draws      = [(B1, 5), (B2, 3)]
//! total_cost = 5×10.00 + 3×12.00 = 86.00
//! unit_cost  = 86.00 / 8 = 10.75   (weighted, half-up to the cent)
//! ```
//!
//! If the fold ends with `remaining > 0` the whole plan is rejected; a
//! partial plan is never returned.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::StockBatch;

// =============================================================================
// Types
// =============================================================================

/// What the planner needs to know about a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLevel {
    pub batch_id: String,
    pub available: i64,
    pub unit_cost: Money,
}

impl From<&StockBatch> for BatchLevel {
    fn from(batch: &StockBatch) -> Self {
        BatchLevel {
            batch_id: batch.id.clone(),
            available: batch.available_quantity,
            unit_cost: batch.unit_cost(),
        }
    }
}

/// Units taken from a single batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Draw {
    pub batch_id: String,
    pub quantity: i64,
    pub unit_cost: Money,
}

/// A complete, satisfiable draw plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FifoPlan {
    pub draws: Vec<Draw>,
    pub quantity: i64,
    pub total_cost: Money,
    /// Quantity-weighted average of the costs drawn.
    pub unit_cost: Money,
}

/// Net units a line holds from a batch (draws minus returns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchQuantity {
    pub batch_id: String,
    pub quantity: i64,
}

// =============================================================================
// Planning
// =============================================================================

/// Plans a FIFO draw of `quantity` units over `batches`.
///
/// `batches` must already be ordered oldest-received first. Batches with no
/// available units are skipped.
///
/// ## Errors
/// - `Validation` if `quantity <= 0`
/// - `InsufficientStock` if the batches together cannot cover `quantity`
pub fn plan_draws(product_id: &str, batches: &[BatchLevel], quantity: i64) -> CoreResult<FifoPlan> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let (draws, remaining) = batches
        .iter()
        .filter(|b| b.available > 0)
        .fold((Vec::new(), quantity), |(mut draws, remaining), batch| {
            if remaining == 0 {
                return (draws, remaining);
            }
            let take = remaining.min(batch.available);
            draws.push(Draw {
                batch_id: batch.batch_id.clone(),
                quantity: take,
                unit_cost: batch.unit_cost,
            });
            (draws, remaining - take)
        });

    if remaining > 0 {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: quantity - remaining,
            requested: quantity,
        });
    }

    let total_cost: Money = draws.iter().map(|d| d.unit_cost * d.quantity).sum();

    Ok(FifoPlan {
        unit_cost: total_cost.per_unit(quantity),
        total_cost,
        quantity,
        draws,
    })
}

/// Plans giving `quantity` units back to the batches a line drew from.
///
/// `held` is in draw order; the most recently drawn batch is refilled first.
///
/// ## Errors
/// - `Validation` if `quantity <= 0`
/// - `ReturnExceedsDrawn` if the line holds fewer than `quantity` units
pub fn plan_returns(held: &[BatchQuantity], quantity: i64) -> CoreResult<Vec<BatchQuantity>> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let drawn: i64 = held.iter().map(|h| h.quantity).sum();
    if quantity > drawn {
        return Err(CoreError::ReturnExceedsDrawn {
            requested: quantity,
            drawn,
        });
    }

    let (returns, _) = held
        .iter()
        .rev()
        .filter(|h| h.quantity > 0)
        .fold((Vec::new(), quantity), |(mut returns, remaining), h| {
            if remaining > 0 {
                let give = remaining.min(h.quantity);
                returns.push(BatchQuantity {
                    batch_id: h.batch_id.clone(),
                    quantity: give,
                });
                return (returns, remaining - give);
            }
            (returns, remaining)
        });

    Ok(returns)
}

/// Folds a line's movement trail into the units it still holds per batch.
///
/// `entries` are `(batch_id, signed_quantity)` in chronological order, where
/// a draw is negative and a return is positive. Output keeps first-draw order
/// and drops batches the line no longer holds anything from.
pub fn net_holdings<'a, I>(entries: I) -> Vec<BatchQuantity>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut held: Vec<BatchQuantity> = Vec::new();
    for (batch_id, signed) in entries {
        match held.iter_mut().find(|h| h.batch_id == batch_id) {
            Some(h) => h.quantity -= signed,
            None => held.push(BatchQuantity {
                batch_id: batch_id.to_string(),
                quantity: -signed,
            }),
        }
    }
    held.retain(|h| h.quantity > 0);
    held
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level(id: &str, available: i64, cost: i64) -> BatchLevel {
        BatchLevel {
            batch_id: id.to_string(),
            available,
            unit_cost: Money::from_cents(cost),
        }
    }

    #[test]
    fn test_weighted_average_across_batches() {
        let batches = vec![level("b1", 5, 1000), level("b2", 10, 1200)];
        let plan = plan_draws("p", &batches, 8).unwrap();

        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].quantity, 5);
        assert_eq!(plan.draws[1].quantity, 3);
        assert_eq!(plan.total_cost.cents(), 8600);
        assert_eq!(plan.unit_cost.cents(), 1075);
    }

    #[test]
    fn test_single_batch_uses_its_cost() {
        let batches = vec![level("b1", 5, 1000), level("b2", 10, 1200)];
        let plan = plan_draws("p", &batches, 5).unwrap();
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.unit_cost.cents(), 1000);
    }

    #[test]
    fn test_skips_empty_batches() {
        let batches = vec![level("b0", 0, 500), level("b1", 2, 1000)];
        let plan = plan_draws("p", &batches, 2).unwrap();
        assert_eq!(plan.draws[0].batch_id, "b1");
    }

    #[test]
    fn test_insufficient_stock() {
        let batches = vec![level("b1", 5, 1000), level("b2", 2, 1200)];
        let err = plan_draws("p", &batches, 8).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 7,
                requested: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let batches = vec![level("b1", 5, 1000)];
        assert!(matches!(
            plan_draws("p", &batches, 0),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_returns_newest_first() {
        let held = vec![
            BatchQuantity { batch_id: "b1".into(), quantity: 5 },
            BatchQuantity { batch_id: "b2".into(), quantity: 3 },
        ];
        let returns = plan_returns(&held, 4).unwrap();
        assert_eq!(
            returns,
            vec![
                BatchQuantity { batch_id: "b2".into(), quantity: 3 },
                BatchQuantity { batch_id: "b1".into(), quantity: 1 },
            ]
        );
    }

    #[test]
    fn test_return_more_than_drawn() {
        let held = vec![BatchQuantity { batch_id: "b1".into(), quantity: 2 }];
        assert!(matches!(
            plan_returns(&held, 3),
            Err(CoreError::ReturnExceedsDrawn { requested: 3, drawn: 2 })
        ));
    }

    #[test]
    fn test_net_holdings() {
        let trail = vec![("b1", -5), ("b2", -3), ("b2", 2), ("b1", -1), ("b2", 1)];
        let held = net_holdings(trail);
        assert_eq!(
            held,
            vec![BatchQuantity { batch_id: "b1".into(), quantity: 6 }]
        );
    }

    proptest! {
        #[test]
        fn prop_draws_cover_request_exactly(
            levels in prop::collection::vec((0i64..50, 1i64..5000), 1..8),
            quantity in 1i64..200,
        ) {
            let batches: Vec<BatchLevel> = levels
                .iter()
                .enumerate()
                .map(|(i, (avail, cost))| level(&format!("b{i}"), *avail, *cost))
                .collect();
            let available: i64 = batches.iter().map(|b| b.available).sum();

            match plan_draws("p", &batches, quantity) {
                Ok(plan) => {
                    let drawn: i64 = plan.draws.iter().map(|d| d.quantity).sum();
                    prop_assert_eq!(drawn, quantity);
                    for draw in &plan.draws {
                        let batch = batches.iter().find(|b| b.batch_id == draw.batch_id).unwrap();
                        prop_assert!(draw.quantity > 0);
                        prop_assert!(draw.quantity <= batch.available);
                    }
                }
                Err(CoreError::InsufficientStock { .. }) => prop_assert!(available < quantity),
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
