//! # Sale Item Repository
//!
//! Database operations for sale lines. Pricing and stock are handled by the
//! caller; this module only stores what it is given.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasa_core::SaleItem;

const ITEM_COLUMNS: &str = "id, sale_id, product_id, quantity, unit_price_cents, unit_cost_cents, \
     discount_percentage_bps, discount_fixed_cents, discount_cents, line_total_cents, \
     created_at, updated_at";

/// Repository for sale item database operations.
#[derive(Debug, Clone)]
pub struct SaleItemRepository {
    pool: SqlitePool,
}

impl SaleItemRepository {
    /// Creates a new SaleItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleItemRepository { pool }
    }

    /// Gets a sale item by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        get_by_id(&mut conn, id).await
    }

    /// Gets all items for a sale, in the order they were added.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        list_for_sale(&mut conn, sale_id).await
    }
}

// =============================================================================
// Connection-level functions (usable inside a transaction)
// =============================================================================

pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SaleItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE id = ?1");
    let item = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(item)
}

pub async fn list_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid"
    );
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

pub async fn count_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE sale_id = ?1")
        .bind(sale_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn insert(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    debug!(sale_id = %item.sale_id, product_id = %item.product_id, quantity = item.quantity, "Adding sale item");

    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, quantity,
            unit_price_cents, unit_cost_cents,
            discount_percentage_bps, discount_fixed_cents,
            discount_cents, line_total_cents,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.unit_cost_cents)
    .bind(item.discount_percentage_bps)
    .bind(item.discount_fixed_cents)
    .bind(item.discount_cents)
    .bind(item.line_total_cents)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes quantity, price and discount fields. `unit_cost_cents` is left as
/// resolved at creation.
pub async fn update(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    debug!(id = %item.id, quantity = item.quantity, "Updating sale item");

    let result = sqlx::query(
        r#"
        UPDATE sale_items SET
            quantity = ?2,
            unit_price_cents = ?3,
            discount_percentage_bps = ?4,
            discount_fixed_cents = ?5,
            discount_cents = ?6,
            line_total_cents = ?7,
            updated_at = ?8
        WHERE id = ?1
        "#,
    )
    .bind(&item.id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.discount_percentage_bps)
    .bind(item.discount_fixed_cents)
    .bind(item.discount_cents)
    .bind(item.line_total_cents)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("SaleItem", &item.id));
    }

    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting sale item");

    let result = sqlx::query("DELETE FROM sale_items WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("SaleItem", id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{seeded, PRODUCT_ID, SALE_ID};

    fn item(id: &str, quantity: i64) -> SaleItem {
        let now = Utc::now();
        SaleItem {
            id: id.into(),
            sale_id: SALE_ID.into(),
            product_id: PRODUCT_ID.into(),
            quantity,
            unit_price_cents: 1500,
            unit_cost_cents: 1000,
            discount_percentage_bps: 0,
            discount_fixed_cents: 0,
            discount_cents: 0,
            line_total_cents: 1500 * quantity,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_item_lifecycle() {
        let db = seeded().await;

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &item("i1", 2)).await.unwrap();
        insert(&mut tx, &item("i2", 1)).await.unwrap();
        assert_eq!(count_for_sale(&mut tx, SALE_ID).await.unwrap(), 2);
        tx.commit().await.unwrap();

        let items = db.sale_items().list_for_sale(SALE_ID).await.unwrap();
        assert_eq!(items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["i1", "i2"]);

        let mut changed = items[0].clone();
        changed.quantity = 5;
        changed.line_total_cents = 7500;
        changed.unit_cost_cents = 1;

        let mut tx = db.begin().await.unwrap();
        update(&mut tx, &changed).await.unwrap();
        delete(&mut tx, "i2").await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.sale_items().get_by_id("i1").await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        // cost is never rewritten by update
        assert_eq!(stored.unit_cost_cents, 1000);
        assert!(db.sale_items().get_by_id("i2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_item() {
        let db = seeded().await;
        let mut tx = db.begin().await.unwrap();
        assert!(matches!(
            delete(&mut tx, "ghost").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
