//! # kasa-settlement: Sale Settlement for Kasa Back Office
//!
//! Turns a cart of lines into a priced, discounted, FIFO-costed and
//! stock-adjusted sale, then reconciles payments against it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasa Settlement Flow                             │
//! │                                                                         │
//! │  Register / back office                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 kasa-settlement (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   SettlementEngine ──► SaleService ──► FifoCostResolver        │   │
//! │  │         │                   │                │                  │   │
//! │  │         │                   ▼                ▼                  │   │
//! │  │         ├──► PaymentReconciler          StockLedger            │   │
//! │  │         ├──► ReportService                                      │   │
//! │  │         └──► CartSessions         ProductLocks (shared)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │ pricing, FIFO plans, payment rules          │ SQL            │
//! │       ▼                                              ▼                │
//! │  kasa-core (pure)                               kasa-db (SQLite)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - One handle over everything below
//! - [`orchestrator`] - Sale and sale item lifecycle
//! - [`fifo`] - FIFO cost resolution and batch consumption
//! - [`ledger`] - Stock levels, receipts, adjustments, movement trail
//! - [`reconciler`] - Payments and payment status
//! - [`reports`] - Sales summary and profit analysis
//! - [`cart`] - In-progress carts keyed by session
//! - [`locks`] - Per-product async locks
//! - [`config`] - `kasa.toml` plus `KASA_*` overrides
//! - [`telemetry`] - tracing subscriber setup
//! - [`error`] - `SettlementError` and stable error codes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasa_settlement::{SettlementConfig, SettlementEngine};
//!
//! kasa_settlement::telemetry::init_tracing();
//! let engine = SettlementEngine::connect(SettlementConfig::load(None)?).await?;
//! let details = engine.checkout_cart(&cart_id, CreateSaleInput::new(cashier_id)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod config;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod ledger;
pub mod locks;
pub mod orchestrator;
pub mod reconciler;
pub mod reports;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use cart::{Cart, CartLine, CartPreview, CartSessions};
pub use config::SettlementConfig;
pub use engine::SettlementEngine;
pub use error::{ErrorCode, ErrorReport, SettlementError, SettlementResult};
pub use fifo::FifoCostResolver;
pub use ledger::{MovementEntry, NewBatch, Reference, StockLedger};
pub use locks::ProductLocks;
pub use orchestrator::{
    CreateItemInput, CreateSaleInput, SaleDetails, SaleService, UpdateItemInput, UpdateSaleInput,
};
pub use reconciler::{PaymentInput, PaymentReconciler};
pub use reports::ReportService;

#[cfg(test)]
pub(crate) mod testing {
    //! Shared rows for unit tests.

    use chrono::{Duration, Utc};
    use kasa_core::{Customer, Product, Sale, User};
    use kasa_db::{Database, DbConfig};
    use uuid::Uuid;

    use crate::ledger::{NewBatch, StockLedger};
    use crate::locks::ProductLocks;

    pub const CASHIER_ID: &str = "00000000-0000-0000-0000-0000000000c1";

    pub struct Fixture {
        pub db: Database,
        pub product_id: String,
        pub customer_id: String,
    }

    /// In-memory database with one cashier, one product and one customer.
    pub async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let catalog = db.catalog();

        catalog
            .insert_user(&User {
                id: CASHIER_ID.into(),
                username: "ayse".into(),
                display_name: "Ayse".into(),
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();

        let product_id = Uuid::new_v4().to_string();
        catalog
            .insert_product(&Product {
                id: product_id.clone(),
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

        let customer_id = Uuid::new_v4().to_string();
        catalog
            .insert_customer(&Customer {
                id: customer_id.clone(),
                name: "Mehmet".into(),
                phone: None,
                email: None,
                created_at: now,
            })
            .await
            .unwrap();

        Fixture {
            db,
            product_id,
            customer_id,
        }
    }

    /// Receives a batch dated `age_days` ago and returns its id.
    pub async fn add_batch(db: &Database, product_id: &str, quantity: i64, unit_cost_cents: i64, age_days: i64) -> String {
        StockLedger::new(db.clone(), ProductLocks::new())
            .receive_batch(
                NewBatch {
                    product_id: product_id.to_string(),
                    batch_number: None,
                    lot_number: None,
                    quantity,
                    unit_cost_cents,
                    expiry_date: None,
                    received_at: Some(Utc::now() - Duration::days(age_days)),
                },
                CASHIER_ID,
            )
            .await
            .unwrap()
            .id
    }

    /// A sale with stored totals and no items, for payment tests.
    pub async fn priced_sale(fx: &Fixture, total_cents: i64) -> String {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        fx.db
            .sales()
            .insert(&Sale {
                id: id.clone(),
                bill_number: format!("TEST-{}", &id[..8]),
                customer_id: None,
                cashier_id: CASHIER_ID.into(),
                sale_date: now,
                discount_percentage_bps: 0,
                discount_fixed_cents: 0,
                subtotal_cents: total_cents,
                discount_cents: 0,
                total_amount_cents: total_cents,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        id
    }
}
