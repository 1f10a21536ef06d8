//! # Stock Repository
//!
//! Batches and the append-only movement ledger.
//!
//! ## Guarded Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  decrement_batch(batch, 3)                                             │
//! │                                                                         │
//! │    UPDATE stock_batches                                                │
//! │       SET available_quantity = available_quantity - 3                  │
//! │     WHERE id = ? AND is_active = 1                                     │
//! │       AND available_quantity >= 3        ← guard                       │
//! │                                                                         │
//! │    rows_affected == 0  →  GuardFailed, caller rolls back               │
//! │                                                                         │
//! │  increment_batch(batch, 2)                                             │
//! │       AND available_quantity + 2 <= received_quantity   ← guard        │
//! │                                                                         │
//! │  The table CHECK constraint backs both guards up.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Movements have an insert path and read paths only. The schema rejects
//! UPDATE and DELETE on `stock_movements` with a trigger.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasa_core::{StockBatch, StockMovement, SALE_ITEM_REFERENCE};

const BATCH_COLUMNS: &str = "id, product_id, batch_number, lot_number, received_quantity, \
     available_quantity, unit_cost_cents, expiry_date, received_at, is_active";

const MOVEMENT_COLUMNS: &str = "id, product_id, batch_id, movement_type, quantity, \
     reference_type, reference_id, actor_id, notes, created_at";

/// Repository for stock batches and movements.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Sum of `available_quantity` over the product's active batches.
    pub async fn available(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        available(&mut conn, product_id).await
    }

    /// Active batches with stock, oldest received first.
    pub async fn fifo_batches(&self, product_id: &str) -> DbResult<Vec<StockBatch>> {
        let mut conn = self.pool.acquire().await?;
        fifo_batches(&mut conn, product_id).await
    }

    /// Every batch of a product, exhausted and inactive ones included.
    pub async fn all_batches(&self, product_id: &str) -> DbResult<Vec<StockBatch>> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE product_id = ?1 ORDER BY received_at, rowid"
        );
        let batches = sqlx::query_as::<_, StockBatch>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(batches)
    }

    pub async fn get_batch(&self, id: &str) -> DbResult<Option<StockBatch>> {
        let mut conn = self.pool.acquire().await?;
        get_batch(&mut conn, id).await
    }

    /// Most recent movements of a product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: i64,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    pub async fn held_by_sale_lines(&self, batch_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        held_by_sale_lines(&mut conn, batch_id).await
    }

    /// Movements caused by one document, oldest first.
    pub async fn movements_for_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let mut conn = self.pool.acquire().await?;
        movements_for_reference(&mut conn, reference_type, reference_id).await
    }
}

// =============================================================================
// Connection-level functions (usable inside a transaction)
// =============================================================================

pub async fn available(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(available_quantity) FROM stock_batches WHERE product_id = ?1 AND is_active = 1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(total.unwrap_or(0))
}

/// Units drawn from a batch by sale lines and not yet returned.
pub async fn held_by_sale_lines(conn: &mut SqliteConnection, batch_id: &str) -> DbResult<i64> {
    let net: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(quantity) FROM stock_movements WHERE batch_id = ?1 AND reference_type = ?2",
    )
    .bind(batch_id)
    .bind(SALE_ITEM_REFERENCE)
    .fetch_one(&mut *conn)
    .await?;
    Ok(-net.unwrap_or(0))
}

/// Active batches with stock, oldest received first; ties broken by insert
/// order.
pub async fn fifo_batches(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<StockBatch>> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM stock_batches \
         WHERE product_id = ?1 AND is_active = 1 AND available_quantity > 0 \
         ORDER BY received_at ASC, rowid ASC"
    );
    let batches = sqlx::query_as::<_, StockBatch>(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(batches)
}

pub async fn get_batch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StockBatch>> {
    let sql = format!("SELECT {BATCH_COLUMNS} FROM stock_batches WHERE id = ?1");
    let batch = sqlx::query_as::<_, StockBatch>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(batch)
}

pub async fn insert_batch(conn: &mut SqliteConnection, batch: &StockBatch) -> DbResult<()> {
    debug!(id = %batch.id, product_id = %batch.product_id, quantity = batch.received_quantity, "Inserting stock batch");

    sqlx::query(
        r#"
        INSERT INTO stock_batches (
            id, product_id, batch_number, lot_number,
            received_quantity, available_quantity, unit_cost_cents,
            expiry_date, received_at, is_active
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&batch.id)
    .bind(&batch.product_id)
    .bind(&batch.batch_number)
    .bind(&batch.lot_number)
    .bind(batch.received_quantity)
    .bind(batch.available_quantity)
    .bind(batch.unit_cost_cents)
    .bind(batch.expiry_date)
    .bind(batch.received_at)
    .bind(batch.is_active)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Takes `quantity` units out of an active batch.
///
/// ## Errors
/// `GuardFailed` if the batch is inactive, missing, or holds fewer units.
pub async fn decrement_batch(conn: &mut SqliteConnection, batch_id: &str, quantity: i64) -> DbResult<()> {
    debug!(batch_id = %batch_id, quantity, "Decrementing batch");

    let result = sqlx::query(
        r#"
        UPDATE stock_batches
        SET available_quantity = available_quantity - ?2
        WHERE id = ?1 AND is_active = 1 AND available_quantity >= ?2
        "#,
    )
    .bind(batch_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::guard_failed(
            "StockBatch",
            batch_id,
            format!("fewer than {quantity} units available"),
        ));
    }

    Ok(())
}

/// Puts `quantity` units back into a batch.
///
/// ## Errors
/// `GuardFailed` if the batch is missing or would exceed its received quantity.
pub async fn increment_batch(conn: &mut SqliteConnection, batch_id: &str, quantity: i64) -> DbResult<()> {
    debug!(batch_id = %batch_id, quantity, "Incrementing batch");

    let result = sqlx::query(
        r#"
        UPDATE stock_batches
        SET available_quantity = available_quantity + ?2
        WHERE id = ?1 AND available_quantity + ?2 <= received_quantity
        "#,
    )
    .bind(batch_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::guard_failed(
            "StockBatch",
            batch_id,
            format!("returning {quantity} units would exceed received quantity"),
        ));
    }

    Ok(())
}

/// Appends a movement to the ledger.
pub async fn insert_movement(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
    debug!(
        product_id = %movement.product_id,
        movement_type = movement.movement_type.as_str(),
        quantity = movement.quantity,
        "Recording stock movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, batch_id, movement_type, quantity,
            reference_type, reference_id, actor_id, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(&movement.batch_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.actor_id)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn movements_for_reference(
    conn: &mut SqliteConnection,
    reference_type: &str,
    reference_id: &str,
) -> DbResult<Vec<StockMovement>> {
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
         WHERE reference_type = ?1 AND reference_id = ?2 ORDER BY created_at, rowid"
    );
    let movements = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(movements)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{seeded, CASHIER_ID, PRODUCT_ID};
    use chrono::{Duration, Utc};
    use kasa_core::MovementType;

    fn batch(id: &str, qty: i64, cost: i64, age_days: i64) -> StockBatch {
        StockBatch {
            id: id.into(),
            product_id: PRODUCT_ID.into(),
            batch_number: Some(id.to_uppercase()),
            lot_number: None,
            received_quantity: qty,
            available_quantity: qty,
            unit_cost_cents: cost,
            expiry_date: None,
            received_at: Utc::now() - Duration::days(age_days),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_fifo_order_and_available() {
        let db = seeded().await;
        let mut tx = db.begin().await.unwrap();
        insert_batch(&mut tx, &batch("newer", 10, 1200, 1)).await.unwrap();
        insert_batch(&mut tx, &batch("older", 5, 1000, 5)).await.unwrap();
        let mut inactive = batch("inactive", 7, 900, 9);
        inactive.is_active = false;
        insert_batch(&mut tx, &inactive).await.unwrap();
        tx.commit().await.unwrap();

        let batches = db.stock().fifo_batches(PRODUCT_ID).await.unwrap();
        let ids: Vec<_> = batches.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["older", "newer"]);
        assert_eq!(db.stock().available(PRODUCT_ID).await.unwrap(), 15);
        assert_eq!(db.stock().all_batches(PRODUCT_ID).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_guarded_decrement_and_increment() {
        let db = seeded().await;
        let mut tx = db.begin().await.unwrap();
        insert_batch(&mut tx, &batch("b1", 5, 1000, 1)).await.unwrap();

        decrement_batch(&mut tx, "b1", 5).await.unwrap();
        assert!(matches!(
            decrement_batch(&mut tx, "b1", 1).await,
            Err(DbError::GuardFailed { .. })
        ));

        increment_batch(&mut tx, "b1", 5).await.unwrap();
        assert!(matches!(
            increment_batch(&mut tx, "b1", 1).await,
            Err(DbError::GuardFailed { .. })
        ));
        tx.commit().await.unwrap();

        let stored = db.stock().get_batch("b1").await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 5);
    }

    #[tokio::test]
    async fn test_movements_are_append_only() {
        let db = seeded().await;
        let mut tx = db.begin().await.unwrap();
        insert_batch(&mut tx, &batch("b1", 5, 1000, 1)).await.unwrap();
        insert_movement(
            &mut tx,
            &StockMovement {
                id: "m1".into(),
                product_id: PRODUCT_ID.into(),
                batch_id: Some("b1".into()),
                movement_type: MovementType::Receipt,
                quantity: 5,
                reference_type: Some("stock_batch".into()),
                reference_id: Some("b1".into()),
                actor_id: CASHIER_ID.into(),
                notes: None,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let trail = db
            .stock()
            .movements_for_reference("stock_batch", "b1")
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].movement_type, MovementType::Receipt);

        let deleted = sqlx::query("DELETE FROM stock_movements WHERE id = 'm1'")
            .execute(db.pool())
            .await;
        assert!(deleted.is_err());

        let recent = db.stock().movements_for_product(PRODUCT_ID, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_held_by_sale_lines_nets_returns() {
        let db = seeded().await;
        let movement = |id: &str,
                        movement_type: MovementType,
                        quantity: i64,
                        reference_type: &str,
                        reference_id: &str| StockMovement {
            id: id.into(),
            product_id: PRODUCT_ID.into(),
            batch_id: Some("b1".into()),
            movement_type,
            quantity,
            reference_type: Some(reference_type.into()),
            reference_id: Some(reference_id.into()),
            actor_id: CASHIER_ID.into(),
            notes: None,
            created_at: Utc::now(),
        };

        let mut tx = db.begin().await.unwrap();
        insert_batch(&mut tx, &batch("b1", 10, 1000, 1)).await.unwrap();
        assert_eq!(held_by_sale_lines(&mut tx, "b1").await.unwrap(), 0);

        for m in [
            movement("m1", MovementType::Receipt, 10, "stock_batch", "b1"),
            movement("m2", MovementType::Sale, -4, SALE_ITEM_REFERENCE, "i1"),
            movement("m3", MovementType::Sale, -2, SALE_ITEM_REFERENCE, "i2"),
            movement("m4", MovementType::Adjustment, 1, SALE_ITEM_REFERENCE, "i1"),
            movement("m5", MovementType::Adjustment, -3, "stock_batch", "b1"),
        ] {
            insert_movement(&mut tx, &m).await.unwrap();
        }
        tx.commit().await.unwrap();

        // 4 + 2 out, 1 back; the manual write-off is not held by any line
        assert_eq!(db.stock().held_by_sale_lines("b1").await.unwrap(), 5);
        assert_eq!(db.stock().held_by_sale_lines("other").await.unwrap(), 0);
    }
}
