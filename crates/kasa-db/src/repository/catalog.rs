//! # Catalog Repository
//!
//! Lookups for the collaborators a sale references: products, customers and
//! cashiers. Their full management workflows live outside this engine; the
//! inserts here exist for seeding and tests.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kasa_core::{Customer, Product, User};

const PRODUCT_COLUMNS: &str =
    "id, sku, name, category_id, price_cents, is_active, created_at, updated_at";

/// Repository for product, customer and cashier lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a product by ID (active or not).
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        get_product(&mut conn, id).await
    }

    /// Gets a product by SKU.
    pub async fn get_product_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Gets several products at once, in no particular order.
    pub async fn get_products(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = get_product(&mut conn, id).await? {
                found.push(p);
            }
        }
        Ok(found)
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, category_id, price_cents, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category_id)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts active products.
    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Gets a customer by ID.
    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        get_customer(&mut conn, id).await
    }

    /// Inserts a customer.
    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            "INSERT INTO customers (id, name, phone, email, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a cashier by ID.
    pub async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        get_user(&mut conn, id).await
    }

    /// Inserts a cashier.
    pub async fn insert_user(&self, user: &User) -> DbResult<()> {
        debug!(username = %user.username, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Connection-level functions (usable inside a transaction)
// =============================================================================

pub async fn get_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub async fn get_customer(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, name, phone, email, created_at FROM customers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(customer)
}

pub async fn get_user(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, display_name, is_active, created_at FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use crate::repository::fixtures::{seeded, CASHIER_ID, PRODUCT_ID};
    use crate::DbError;
    use chrono::Utc;
    use kasa_core::Product;

    #[tokio::test]
    async fn test_lookups() {
        let db = seeded().await;
        let catalog = db.catalog();

        let product = catalog.get_product(PRODUCT_ID).await.unwrap().unwrap();
        assert_eq!(product.sku, "TEA-500");
        assert!(product.is_active);

        let by_sku = catalog.get_product_by_sku("TEA-500").await.unwrap().unwrap();
        assert_eq!(by_sku.id, PRODUCT_ID);

        let user = catalog.get_user(CASHIER_ID).await.unwrap().unwrap();
        assert_eq!(user.username, "ayse");

        assert!(catalog.get_customer("missing").await.unwrap().is_none());
        assert_eq!(catalog.count_products().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku() {
        let db = seeded().await;
        let now = Utc::now();
        let err = db
            .catalog()
            .insert_product(&Product {
                id: "other".into(),
                sku: "TEA-500".into(),
                name: "Copy".into(),
                category_id: None,
                price_cents: 100,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
