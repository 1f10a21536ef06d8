//! # Repository Module
//!
//! Database repository implementations for the settlement engine.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Access                                    │
//! │                                                                         │
//! │  Reads (own pooled connection per call)                                │
//! │       db.sales().get_by_id(id)                                         │
//! │       db.stock().available(product_id)                                 │
//! │                                                                         │
//! │  Writes (caller's transaction, one connection, one commit)             │
//! │       let mut tx = db.begin().await?;                                  │
//! │       sale::touch(&mut tx, id)                                         │
//! │       sale_item::insert(&mut tx, &item)                                │
//! │       stock::decrement_batch(&mut tx, batch_id, qty)                   │
//! │       tx.commit()                                                      │
//! │                                                                         │
//! │  Each struct method delegates to the module function of the same      │
//! │  name, so both paths run identical SQL.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`] - Product, customer and cashier lookups
//! - [`SaleRepository`] - Sale headers, totals, search
//! - [`SaleItemRepository`] - Sale lines
//! - [`PaymentRepository`] - Payments
//! - [`StockRepository`] - Batches and the movement ledger
//! - [`SequenceRepository`] - Bill number counters
//! - [`ReportRepository`] - Date-range roll-ups
//!
//! [`CatalogRepository`]: catalog::CatalogRepository
//! [`SaleRepository`]: sale::SaleRepository
//! [`SaleItemRepository`]: sale_item::SaleItemRepository
//! [`PaymentRepository`]: payment::PaymentRepository
//! [`StockRepository`]: stock::StockRepository
//! [`SequenceRepository`]: sequence::SequenceRepository
//! [`ReportRepository`]: report::ReportRepository

pub mod catalog;
pub mod payment;
pub mod report;
pub mod sale;
pub mod sale_item;
pub mod sequence;
pub mod stock;

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared rows for repository tests.

    use chrono::Utc;
    use kasa_core::{Product, Sale, User};

    use crate::{Database, DbConfig};

    pub const CASHIER_ID: &str = "00000000-0000-0000-0000-0000000000c1";
    pub const PRODUCT_ID: &str = "00000000-0000-0000-0000-0000000000a1";
    pub const SALE_ID: &str = "00000000-0000-0000-0000-0000000000b1";

    /// In-memory database with one cashier, one product and one empty sale.
    pub async fn seeded() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        db.catalog()
            .insert_user(&User {
                id: CASHIER_ID.into(),
                username: "ayse".into(),
                display_name: "Ayse".into(),
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();

        db.catalog()
            .insert_product(&Product {
                id: PRODUCT_ID.into(),
                sku: "TEA-500".into(),
                name: "Black Tea 500g".into(),
                category_id: Some("grocery".into()),
                price_cents: 1500,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        db.sales().insert(&sale(SALE_ID, "INV-20260101-000001")).await.unwrap();
        db
    }

    pub fn sale(id: &str, bill_number: &str) -> Sale {
        let now = Utc::now();
        Sale {
            id: id.into(),
            bill_number: bill_number.into(),
            customer_id: None,
            cashier_id: CASHIER_ID.into(),
            sale_date: now,
            discount_percentage_bps: 0,
            discount_fixed_cents: 0,
            subtotal_cents: 0,
            discount_cents: 0,
            total_amount_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}
