//! Shared setup for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{Duration, Utc};
use kasa_core::{Product, User};
use kasa_settlement::{NewBatch, SettlementConfig, SettlementEngine};
use uuid::Uuid;

pub const CASHIER_ID: &str = "00000000-0000-0000-0000-0000000000c1";

/// Engine over a private in-memory database with one active cashier.
pub async fn engine() -> SettlementEngine {
    with_cashier(SettlementConfig::in_memory()).await
}

/// Engine over a fresh database file, for tests that need real
/// connection-level concurrency.
pub async fn file_engine(max_connections: u32) -> (SettlementEngine, PathBuf) {
    let path = std::env::temp_dir().join(format!("kasa-test-{}.db", Uuid::new_v4()));
    let mut config = SettlementConfig::default();
    config.database.path = path.display().to_string();
    config.database.max_connections = max_connections;
    (with_cashier(config).await, path)
}

async fn with_cashier(config: SettlementConfig) -> SettlementEngine {
    let engine = SettlementEngine::connect(config).await.unwrap();
    engine
        .database()
        .catalog()
        .insert_user(&User {
            id: CASHIER_ID.into(),
            username: "ayse".into(),
            display_name: "Ayse".into(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    engine
}

pub async fn product(engine: &SettlementEngine, sku: &str, price_cents: i64) -> String {
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    engine
        .database()
        .catalog()
        .insert_product(&Product {
            id: id.clone(),
            sku: sku.into(),
            name: format!("Product {sku}"),
            category_id: None,
            price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    id
}

/// Receives a batch dated `age_days` ago and returns its id.
pub async fn receive(engine: &SettlementEngine, product_id: &str, quantity: i64, unit_cost_cents: i64, age_days: i64) -> String {
    engine
        .ledger()
        .receive_batch(
            NewBatch {
                product_id: product_id.into(),
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
