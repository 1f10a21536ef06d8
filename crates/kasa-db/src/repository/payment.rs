//! # Payment Repository
//!
//! Stores payments. The overpayment check runs in the caller's transaction
//! against [`list_for_sale`] before any insert or update here.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasa_core::Payment;

const PAYMENT_COLUMNS: &str = "id, sale_id, method, amount_cents, reference, notes, created_at";

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        get_by_id(&mut conn, id).await
    }

    /// Gets all payments for a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        list_for_sale(&mut conn, sale_id).await
    }

    /// Gets total amount paid for a sale.
    pub async fn total_paid(&self, sale_id: &str) -> DbResult<i64> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(amount_cents) FROM payments WHERE sale_id = ?1")
                .bind(sale_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(total.unwrap_or(0))
    }
}

// =============================================================================
// Connection-level functions (usable inside a transaction)
// =============================================================================

pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1");
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(payment)
}

pub async fn list_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<Payment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE sale_id = ?1 ORDER BY created_at, rowid"
    );
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(payments)
}

pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(sale_id = %payment.sale_id, method = %payment.method, amount = payment.amount_cents, "Recording payment");

    sqlx::query(
        r#"
        INSERT INTO payments (id, sale_id, method, amount_cents, reference, notes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sale_id)
    .bind(payment.method)
    .bind(payment.amount_cents)
    .bind(&payment.reference)
    .bind(&payment.notes)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rewrites method, amount, reference and notes.
pub async fn update(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(id = %payment.id, amount = payment.amount_cents, "Updating payment");

    let result = sqlx::query(
        r#"
        UPDATE payments SET method = ?2, amount_cents = ?3, reference = ?4, notes = ?5
        WHERE id = ?1
        "#,
    )
    .bind(&payment.id)
    .bind(payment.method)
    .bind(payment.amount_cents)
    .bind(&payment.reference)
    .bind(&payment.notes)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Payment", &payment.id));
    }

    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting payment");

    let result = sqlx::query("DELETE FROM payments WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Payment", id));
    }

    Ok(())
}
