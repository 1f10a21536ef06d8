//! # Stock Ledger
//!
//! Stock levels and the movement trail that explains them.
//!
//! ## Movement Trail
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  batch B1 (received 10)                                                 │
//! │                                                                         │
//! │  receipt     +10   ref stock_batch/B1                                   │
//! │  sale         -4   ref sale_item/I1      available 6                    │
//! │  adjustment   +1   ref sale_item/I1      available 7  (line 4 → 3)      │
//! │  adjustment   -2   ref stock_batch/B1    available 5  (breakage)        │
//! │                                                                         │
//! │  Σ movements on B1 = received − … = available                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are only ever inserted. A correction is a new movement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use kasa_core::validation::{validate_optional_text, MAX_NOTES_LEN};
use kasa_core::{MovementType, StockBatch, StockMovement, ValidationError};
use kasa_db::repository::stock;
use kasa_db::Database;

use crate::error::{SettlementError, SettlementResult};
use crate::locks::ProductLocks;

/// Reference type written on receipt and manual adjustment movements.
pub const BATCH_REFERENCE: &str = "stock_batch";

/// The document a movement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub kind: &'a str,
    pub id: &'a str,
}

impl<'a> Reference<'a> {
    pub fn sale_item(id: &'a str) -> Self {
        Reference {
            kind: kasa_core::SALE_ITEM_REFERENCE,
            id,
        }
    }

    pub fn batch(id: &'a str) -> Self {
        Reference {
            kind: BATCH_REFERENCE,
            id,
        }
    }
}

/// A movement before it gets an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub product_id: String,
    pub batch_id: Option<String>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub actor_id: String,
    pub notes: Option<String>,
}

impl MovementEntry {
    pub fn new(
        product_id: &str,
        batch_id: &str,
        movement_type: MovementType,
        quantity: i64,
        reference: Reference<'_>,
        actor_id: &str,
    ) -> Self {
        MovementEntry {
            product_id: product_id.to_string(),
            batch_id: Some(batch_id.to_string()),
            movement_type,
            quantity,
            reference_type: Some(reference.kind.to_string()),
            reference_id: Some(reference.id.to_string()),
            actor_id: actor_id.to_string(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    fn into_movement(self, at: DateTime<Utc>) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4().to_string(),
            product_id: self.product_id,
            batch_id: self.batch_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            actor_id: self.actor_id,
            notes: self.notes,
            created_at: at,
        }
    }
}

/// A batch arriving on the shelf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub product_id: String,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    /// Defaults to now. Decides the batch's place in FIFO order.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// Writes a movement on the caller's connection.
pub async fn record(conn: &mut SqliteConnection, entry: MovementEntry) -> SettlementResult<StockMovement> {
    if entry.quantity == 0 {
        return Err(ValidationError::MustBePositive {
            field: "movement quantity".to_string(),
        }
        .into());
    }
    let movement = entry.into_movement(Utc::now());
    stock::insert_movement(conn, &movement).await?;
    Ok(movement)
}

#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
    locks: ProductLocks,
}

impl StockLedger {
    pub fn new(db: Database, locks: ProductLocks) -> Self {
        StockLedger { db, locks }
    }

    /// Units on hand across the product's active batches.
    pub async fn get_available(&self, product_id: &str) -> SettlementResult<i64> {
        Ok(self.db.stock().available(product_id).await?)
    }

    /// Appends one movement in its own transaction.
    pub async fn record_movement(&self, entry: MovementEntry) -> SettlementResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let movement = record(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Puts a received batch on the shelf with its `receipt` movement.
    pub async fn receive_batch(&self, input: NewBatch, actor_id: &str) -> SettlementResult<StockBatch> {
        if input.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if input.unit_cost_cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "unit_cost_cents".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        if self.db.catalog().get_product(&input.product_id).await?.is_none() {
            return Err(SettlementError::not_found("Product", &input.product_id));
        }

        let _guard = self.locks.lock(&input.product_id).await;
        let mut tx = self.db.begin().await?;

        let batch = StockBatch {
            id: Uuid::new_v4().to_string(),
            product_id: input.product_id,
            batch_number: input.batch_number,
            lot_number: input.lot_number,
            received_quantity: input.quantity,
            available_quantity: input.quantity,
            unit_cost_cents: input.unit_cost_cents,
            expiry_date: input.expiry_date,
            received_at: input.received_at.unwrap_or_else(Utc::now),
            is_active: true,
        };
        stock::insert_batch(&mut tx, &batch).await?;
        record(
            &mut tx,
            MovementEntry::new(
                &batch.product_id,
                &batch.id,
                MovementType::Receipt,
                batch.received_quantity,
                Reference::batch(&batch.id),
                actor_id,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(batch_id = %batch.id, product_id = %batch.product_id, quantity = batch.received_quantity, "Batch received");
        Ok(batch)
    }

    /// Manual correction of one batch. Negative `delta` takes units out.
    ///
    /// A positive `delta` may not refill units that sale lines still hold,
    /// since those come back to the batch when the lines shrink or go.
    pub async fn adjust(
        &self,
        product_id: &str,
        batch_id: &str,
        delta: i64,
        actor_id: &str,
        notes: Option<String>,
    ) -> SettlementResult<StockMovement> {
        if delta == 0 {
            return Err(ValidationError::MustBePositive {
                field: "adjustment".to_string(),
            }
            .into());
        }
        validate_optional_text("notes", notes.as_deref(), MAX_NOTES_LEN)?;

        let _guard = self.locks.lock(product_id).await;
        let batch = self
            .db
            .stock()
            .get_batch(batch_id)
            .await?
            .filter(|b| b.product_id == product_id)
            .ok_or_else(|| SettlementError::not_found("StockBatch", batch_id))?;

        if delta > 0 {
            let held = self.db.stock().held_by_sale_lines(&batch.id).await?;
            let headroom = batch.received_quantity - batch.available_quantity - held;
            if delta > headroom {
                warn!(batch_id = %batch.id, delta, held, headroom, "Adjustment rejected");
                return Err(ValidationError::OutOfRange {
                    field: "adjustment".to_string(),
                    min: -batch.available_quantity,
                    max: headroom.max(0),
                }
                .into());
            }
        }

        let mut tx = self.db.begin().await?;

        let applied = if delta < 0 {
            stock::decrement_batch(&mut tx, &batch.id, -delta).await
        } else {
            stock::increment_batch(&mut tx, &batch.id, delta).await
        };
        if let Err(err) = applied {
            warn!(batch_id = %batch.id, delta, available = batch.available_quantity, "Adjustment rejected");
            return Err(match err {
                kasa_db::DbError::GuardFailed { .. } if delta < 0 => {
                    SettlementError::InsufficientStock {
                        product_id: product_id.to_string(),
                        available: batch.available_quantity,
                        requested: -delta,
                    }
                }
                other => other.into(),
            });
        }

        let movement = record(
            &mut tx,
            MovementEntry::new(
                product_id,
                &batch.id,
                MovementType::Adjustment,
                delta,
                Reference::batch(&batch.id),
                actor_id,
            )
            .with_notes(notes),
        )
        .await?;

        tx.commit().await?;

        info!(batch_id = %batch.id, delta, "Stock adjusted");
        Ok(movement)
    }

    pub async fn batches(&self, product_id: &str) -> SettlementResult<Vec<StockBatch>> {
        Ok(self.db.stock().all_batches(product_id).await?)
    }

    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: i64,
    ) -> SettlementResult<Vec<StockMovement>> {
        Ok(self.db.stock().movements_for_product(product_id, limit).await?)
    }

    pub async fn movements_for_reference(
        &self,
        reference: Reference<'_>,
    ) -> SettlementResult<Vec<StockMovement>> {
        Ok(self
            .db
            .stock()
            .movements_for_reference(reference.kind, reference.id)
            .await?)
    }
}
