//! # Report Repository
//!
//! Read-only aggregate queries over sales in a `[from, to)` date range.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kasa_core::profit::ProfitLine;
use kasa_core::{Money, SalesSummary};

/// A sold line joined to its product name.
#[derive(Debug, sqlx::FromRow)]
struct ProfitRow {
    product_id: String,
    product_name: String,
    quantity: i64,
    unit_price_cents: i64,
    unit_cost_cents: i64,
    discount_cents: i64,
    line_total_cents: i64,
}

impl From<ProfitRow> for ProfitLine {
    fn from(row: ProfitRow) -> Self {
        ProfitLine {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            unit_cost: Money::from_cents(row.unit_cost_cents),
            line_discount: Money::from_cents(row.discount_cents),
            line_total: Money::from_cents(row.line_total_cents),
        }
    }
}

/// Repository for reporting queries.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Counts and money totals for sales dated in `[from, to)`.
    pub async fn sales_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<SalesSummary> {
        debug!(%from, %to, "Building sales summary");

        let (sale_count, subtotal, bill_discount, total): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(subtotal_cents), 0),
                   COALESCE(SUM(discount_cents), 0),
                   COALESCE(SUM(total_amount_cents), 0)
            FROM sales
            WHERE sale_date >= ?1 AND sale_date < ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let (units_sold, line_discount): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(si.quantity), 0), COALESCE(SUM(si.discount_cents), 0)
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.sale_date >= ?1 AND s.sale_date < ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let total_paid: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(p.amount_cents), 0)
            FROM payments p
            JOIN sales s ON s.id = p.sale_id
            WHERE s.sale_date >= ?1 AND s.sale_date < ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(SalesSummary {
            sale_count,
            units_sold,
            subtotal_cents: subtotal,
            line_discount_cents: line_discount,
            bill_discount_cents: bill_discount,
            total_amount_cents: total,
            total_paid_cents: total_paid,
        })
    }

    /// Every sold line in `[from, to)`, ready for profit analysis.
    pub async fn profit_lines(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<ProfitLine>> {
        let rows = sqlx::query_as::<_, ProfitRow>(
            r#"
            SELECT si.product_id, p.name AS product_name, si.quantity,
                   si.unit_price_cents, si.unit_cost_cents,
                   si.discount_cents, si.line_total_cents
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            JOIN products p ON p.id = si.product_id
            WHERE s.sale_date >= ?1 AND s.sale_date < ?2
            ORDER BY s.sale_date, si.rowid
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProfitLine::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{seeded, PRODUCT_ID, SALE_ID};
    use crate::repository::{payment, sale_item};
    use chrono::Duration;
    use kasa_core::{Payment, PaymentMethod, SaleItem};

    #[tokio::test]
    async fn test_summary_and_profit_lines() {
        let db = seeded().await;
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        sale_item::insert(
            &mut tx,
            &SaleItem {
                id: "i1".into(),
                sale_id: SALE_ID.into(),
                product_id: PRODUCT_ID.into(),
                quantity: 2,
                unit_price_cents: 1500,
                unit_cost_cents: 1000,
                discount_percentage_bps: 0,
                discount_fixed_cents: 100,
                discount_cents: 100,
                line_total_cents: 2900,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();
        payment::insert(
            &mut tx,
            &Payment {
                id: "p1".into(),
                sale_id: SALE_ID.into(),
                method: PaymentMethod::Cash,
                amount_cents: 2000,
                reference: None,
                notes: None,
                created_at: now,
            },
        )
        .await
        .unwrap();
        sqlx::query("UPDATE sales SET subtotal_cents = 2900, total_amount_cents = 2900 WHERE id = ?1")
            .bind(SALE_ID)
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let from = now - Duration::days(1);
        let to = now + Duration::days(1);

        let summary = db.reports().sales_summary(from, to).await.unwrap();
        assert_eq!(summary.sale_count, 1);
        assert_eq!(summary.units_sold, 2);
        assert_eq!(summary.line_discount_cents, 100);
        assert_eq!(summary.total_amount_cents, 2900);
        assert_eq!(summary.total_paid_cents, 2000);

        let lines = db.reports().profit_lines(from, to).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_name, "Black Tea 500g");
        assert_eq!(lines[0].line_total.cents(), 2900);

        let empty = db
            .reports()
            .sales_summary(now + Duration::days(2), now + Duration::days(3))
            .await
            .unwrap();
        assert_eq!(empty, SalesSummary::default());
    }
}
