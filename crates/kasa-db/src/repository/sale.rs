//! # Sale Repository
//!
//! Database operations for sale headers.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert          → new sale, zero totals                               │
//! │  update_header   → customer, notes, bill discount spec                 │
//! │  update_totals   → subtotal / discount / total  (aggregator output)    │
//! │  touch           → bumps updated_at; first write of every settlement   │
//! │                    transaction so SQLite's write lock is taken early   │
//! │  delete          → cascades items and payments, leaves movements      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasa_core::Sale;

const SALE_COLUMNS: &str = "id, bill_number, customer_id, cashier_id, sale_date, \
     discount_percentage_bps, discount_fixed_cents, subtotal_cents, discount_cents, \
     total_amount_cents, notes, created_at, updated_at";

/// Default page size for sale listings.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for sale listings.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Search criteria for sales. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFilter {
    /// Substring of the bill number.
    pub bill_number: Option<String>,
    pub customer_id: Option<String>,
    pub cashier_id: Option<String>,
    /// Inclusive lower bound on `sale_date`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `sale_date`.
    pub to: Option<DateTime<Utc>>,
    /// Defaults to 50, capped at 500.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        get_by_id(&mut conn, id).await
    }

    /// Gets a sale by its bill number.
    pub async fn get_by_bill_number(&self, bill_number: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE bill_number = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(bill_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    /// Inserts a sale outside any transaction.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, sale).await
    }

    /// Lists sales matching `filter`, newest first.
    pub async fn search(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE 1 = 1"));

        if let Some(fragment) = filter.bill_number.as_deref().map(str::trim) {
            if !fragment.is_empty() {
                qb.push(" AND bill_number LIKE ")
                    .push_bind(format!("%{}%", escape_like(fragment)))
                    .push(" ESCAPE '\\'");
            }
        }
        if let Some(customer_id) = &filter.customer_id {
            qb.push(" AND customer_id = ").push_bind(customer_id.clone());
        }
        if let Some(cashier_id) = &filter.cashier_id {
            qb.push(" AND cashier_id = ").push_bind(cashier_id.clone());
        }
        if let Some(from) = filter.from {
            qb.push(" AND sale_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND sale_date < ").push_bind(to);
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);

        qb.push(" ORDER BY sale_date DESC, created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        debug!(?filter, "Searching sales");

        let sales = qb.build_query_as::<Sale>().fetch_all(&self.pool).await?;
        Ok(sales)
    }
}

/// Escapes LIKE wildcards so a bill number fragment matches literally.
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// =============================================================================
// Connection-level functions (usable inside a transaction)
// =============================================================================

pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

/// Inserts a sale.
///
/// A taken bill number surfaces as `UniqueViolation` on `sales.bill_number`.
pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, bill_number = %sale.bill_number, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, bill_number, customer_id, cashier_id, sale_date,
            discount_percentage_bps, discount_fixed_cents,
            subtotal_cents, discount_cents, total_amount_cents,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.bill_number)
    .bind(&sale.customer_id)
    .bind(&sale.cashier_id)
    .bind(sale.sale_date)
    .bind(sale.discount_percentage_bps)
    .bind(sale.discount_fixed_cents)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_amount_cents)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Bumps `updated_at`.
///
/// Issued first in every settlement transaction: the write takes SQLite's
/// reserved lock before anything is read, so the transaction never has to
/// upgrade a read lock later.
pub async fn touch(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE sales SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", id));
    }

    Ok(())
}

/// Writes the caller-editable header fields.
pub async fn update_header(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, "Updating sale header");

    let result = sqlx::query(
        r#"
        UPDATE sales SET
            customer_id = ?2,
            notes = ?3,
            discount_percentage_bps = ?4,
            discount_fixed_cents = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.customer_id)
    .bind(&sale.notes)
    .bind(sale.discount_percentage_bps)
    .bind(sale.discount_fixed_cents)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", &sale.id));
    }

    Ok(())
}

/// Writes recomputed totals.
pub async fn update_totals(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(
        id = %sale.id,
        subtotal = sale.subtotal_cents,
        total = sale.total_amount_cents,
        "Updating sale totals"
    );

    let result = sqlx::query(
        r#"
        UPDATE sales SET
            subtotal_cents = ?2,
            discount_cents = ?3,
            total_amount_cents = ?4,
            updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(&sale.id)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_amount_cents)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", &sale.id));
    }

    Ok(())
}

/// Deletes a sale with its items and payments.
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting sale");

    let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", id));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{sale, seeded, CASHIER_ID, SALE_ID};
    use chrono::Duration;

    #[tokio::test]
    async fn test_get_and_touch() {
        let db = seeded().await;
        let before = db.sales().get_by_id(SALE_ID).await.unwrap().unwrap();

        let mut tx = db.begin().await.unwrap();
        touch(&mut tx, SALE_ID).await.unwrap();
        tx.commit().await.unwrap();

        let after = db.sales().get_by_id(SALE_ID).await.unwrap().unwrap();
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.bill_number, before.bill_number);
    }

    #[tokio::test]
    async fn test_touch_missing_sale() {
        let db = seeded().await;
        let mut tx = db.begin().await.unwrap();
        let err = touch(&mut tx, "nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_bill_number() {
        let db = seeded().await;
        let err = db
            .sales()
            .insert(&sale("another", "INV-20260101-000001"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("sales.bill_number"));
    }

    #[tokio::test]
    async fn test_update_totals_and_header() {
        let db = seeded().await;
        let mut s = db.sales().get_by_id(SALE_ID).await.unwrap().unwrap();
        s.subtotal_cents = 9000;
        s.discount_cents = 500;
        s.total_amount_cents = 8500;
        s.discount_fixed_cents = 500;
        s.notes = Some("table 4".into());

        let mut tx = db.begin().await.unwrap();
        update_header(&mut tx, &s).await.unwrap();
        update_totals(&mut tx, &s).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.sales().get_by_id(SALE_ID).await.unwrap().unwrap();
        assert_eq!(stored.total_amount_cents, 8500);
        assert_eq!(stored.discount_fixed_cents, 500);
        assert_eq!(stored.notes.as_deref(), Some("table 4"));
    }

    #[tokio::test]
    async fn test_search_filters() {
        let db = seeded().await;
        let mut old = sale("old-sale", "INV-20250101-000007");
        old.sale_date = Utc::now() - Duration::days(30);
        db.sales().insert(&old).await.unwrap();

        let by_fragment = db
            .sales()
            .search(&SaleFilter {
                bill_number: Some("20250101".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_fragment.len(), 1);
        assert_eq!(by_fragment[0].id, "old-sale");

        let recent = db
            .sales()
            .search(&SaleFilter {
                cashier_id: Some(CASHIER_ID.into()),
                from: Some(Utc::now() - Duration::days(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, SALE_ID);

        let paged = db
            .sales()
            .search(&SaleFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, "old-sale");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("A_1%"), "A\\_1\\%");
    }
}
