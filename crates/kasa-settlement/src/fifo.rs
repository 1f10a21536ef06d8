//! # FIFO Cost Resolver
//!
//! Resolves what a quantity of a product cost, and moves the stock.
//!
//! ## Consumption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(product, 8) for sale_item I1                                   │
//! │                                                                         │
//! │  fifo_batches ──► [B1 5 @ 10.00, B2 10 @ 12.00]   (oldest first)        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  plan_draws ──► B1 ×5, B2 ×3   unit cost 10.75                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  per draw:  decrement_batch (guarded)  +  sale movement −n ref I1       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Release
//! Returns walk the line's own movement trail, not the batch table: the
//! units go back to the batches the line actually drew from, most recent
//! draw first, each with a positive `adjustment` movement.

use sqlx::SqliteConnection;
use tracing::debug;

use kasa_core::fifo::{net_holdings, plan_draws, plan_returns, BatchLevel, BatchQuantity, FifoPlan};
use kasa_core::{Money, MovementType};
use kasa_db::repository::stock;
use kasa_db::Database;

use crate::error::SettlementResult;
use crate::ledger::{record, MovementEntry, Reference};

#[derive(Debug, Clone)]
pub struct FifoCostResolver {
    db: Database,
}

impl FifoCostResolver {
    pub fn new(db: Database) -> Self {
        FifoCostResolver { db }
    }

    /// Weighted unit cost `quantity` units would have right now. Read-only.
    ///
    /// ## Errors
    /// `InsufficientStock` if active batches cannot cover `quantity`.
    pub async fn resolve_cost(&self, product_id: &str, quantity: i64) -> SettlementResult<Money> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(Self::plan(&mut conn, product_id, quantity).await?.unit_cost)
    }

    /// Plans a draw against the batches visible on `conn`.
    pub async fn plan(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> SettlementResult<FifoPlan> {
        let batches = stock::fifo_batches(conn, product_id).await?;
        let levels: Vec<BatchLevel> = batches.iter().map(BatchLevel::from).collect();
        Ok(plan_draws(product_id, &levels, quantity)?)
    }

    /// Draws `quantity` units oldest batch first and writes one `sale`
    /// movement per batch touched.
    ///
    /// Nothing is written if the batches cannot cover the quantity. A guard
    /// failure mid-way leaves partial writes on `conn`; the caller's
    /// transaction must be dropped.
    pub async fn consume(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
        reference: Reference<'_>,
        actor_id: &str,
    ) -> SettlementResult<FifoPlan> {
        let plan = Self::plan(conn, product_id, quantity).await?;

        for draw in &plan.draws {
            stock::decrement_batch(conn, &draw.batch_id, draw.quantity).await?;
            record(
                conn,
                MovementEntry::new(
                    product_id,
                    &draw.batch_id,
                    MovementType::Sale,
                    -draw.quantity,
                    reference,
                    actor_id,
                ),
            )
            .await?;
        }

        debug!(product_id = %product_id, quantity, draws = plan.draws.len(), unit_cost = %plan.unit_cost, "Stock consumed");
        Ok(plan)
    }

    /// Units `reference` still holds per batch, in first-draw order.
    pub async fn holdings(
        conn: &mut SqliteConnection,
        reference: Reference<'_>,
    ) -> SettlementResult<Vec<BatchQuantity>> {
        let trail = stock::movements_for_reference(conn, reference.kind, reference.id).await?;
        Ok(net_holdings(trail.iter().filter_map(|m| {
            m.batch_id.as_deref().map(|batch| (batch, m.quantity))
        })))
    }

    /// Gives `quantity` units back to the batches `reference` drew from.
    pub async fn release(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
        reference: Reference<'_>,
        actor_id: &str,
    ) -> SettlementResult<Vec<BatchQuantity>> {
        let held = Self::holdings(conn, reference).await?;
        let returns = plan_returns(&held, quantity)?;

        for back in &returns {
            stock::increment_batch(conn, &back.batch_id, back.quantity).await?;
            record(
                conn,
                MovementEntry::new(
                    product_id,
                    &back.batch_id,
                    MovementType::Adjustment,
                    back.quantity,
                    reference,
                    actor_id,
                ),
            )
            .await?;
        }

        debug!(product_id = %product_id, quantity, batches = returns.len(), "Stock released");
        Ok(returns)
    }

    /// Gives back everything `reference` holds. Returns the unit count.
    pub async fn release_all(
        conn: &mut SqliteConnection,
        product_id: &str,
        reference: Reference<'_>,
        actor_id: &str,
    ) -> SettlementResult<i64> {
        let held: i64 = Self::holdings(conn, reference)
            .await?
            .iter()
            .map(|h| h.quantity)
            .sum();
        if held > 0 {
            Self::release(conn, product_id, held, reference, actor_id).await?;
        }
        Ok(held)
    }
}
