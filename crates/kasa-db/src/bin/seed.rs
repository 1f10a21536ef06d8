//! # Seed Data Generator
//!
//! Populates a development database with cashiers, customers, products and
//! received stock so sales can be settled against it.
//!
//! ## Usage
//! ```bash
//! # Seed ./kasa_dev.db
//! cargo run -p kasa-db --bin seed
//!
//! # Specify database path and batches per product
//! cargo run -p kasa-db --bin seed -- --db ./data/kasa.db --batches 3
//! ```
//!
//! ## Generated Stock
//! Every product gets `--batches` batches received a day apart, oldest first,
//! each one a little more expensive than the last, so FIFO costing is visible
//! as soon as a batch runs out. Each batch is written with its `receipt`
//! movement in the same transaction.

use chrono::{Duration, Utc};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use kasa_core::{Customer, MovementType, Product, StockBatch, StockMovement, User};
use kasa_db::repository::stock;
use kasa_db::{Database, DbConfig};

/// (category, sku prefix, products as (name, price cents))
const CATALOG: &[(&str, &str, &[(&str, i64)])] = &[
    (
        "beverages",
        "BEV",
        &[
            ("Ayran 1L", 450),
            ("Mineral Water 6-Pack", 900),
            ("Orange Juice 1L", 1250),
            ("Black Tea 500g", 1500),
            ("Turkish Coffee 100g", 2200),
        ],
    ),
    (
        "bakery",
        "BAK",
        &[
            ("Simit", 150),
            ("Sourdough Loaf", 850),
            ("Pogaca", 300),
        ],
    ),
    (
        "dairy",
        "DRY",
        &[
            ("White Cheese 500g", 3200),
            ("Yogurt 1kg", 1100),
            ("Butter 250g", 1900),
        ],
    ),
    (
        "grocery",
        "GRO",
        &[
            ("Bulgur 1kg", 1400),
            ("Red Lentils 1kg", 1600),
            ("Olive Oil 1L", 5400),
            ("Tomato Paste 830g", 1750),
        ],
    ),
];

const CASHIERS: &[(&str, &str)] = &[("ayse", "Ayse Kaya"), ("mehmet", "Mehmet Demir")];

const CUSTOMERS: &[(&str, Option<&str>)] = &[
    ("Walk-in Regular", None),
    ("Zeynep Arslan", Some("+90 532 000 0001")),
    ("Corner Cafe", Some("+90 212 000 0002")),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kasa_dev.db");
    let mut batches_per_product: i64 = 2;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--batches" | "-b" => {
                if i + 1 < args.len() {
                    batches_per_product = args[i + 1].parse().unwrap_or(2).max(1);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasa Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: ./kasa_dev.db)");
                println!("  -b, --batches <N>     Stock batches per product (default: 2)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, batches_per_product, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.catalog().count_products().await?;
    if existing > 0 {
        println!("Database already has {existing} products, skipping seed.");
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    let mut first_cashier = None;
    for (username, display_name) in CASHIERS {
        let id = Uuid::new_v4().to_string();
        db.catalog()
            .insert_user(&User {
                id: id.clone(),
                username: username.to_string(),
                display_name: display_name.to_string(),
                is_active: true,
                created_at: now,
            })
            .await?;
        first_cashier.get_or_insert(id);
    }
    let actor_id = first_cashier.unwrap_or_default();

    for (name, phone) in CUSTOMERS {
        db.catalog()
            .insert_customer(&Customer {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                phone: phone.map(str::to_string),
                email: None,
                created_at: now,
            })
            .await?;
    }

    let mut products = 0;
    let mut batches = 0;

    for (category, prefix, items) in CATALOG {
        for (idx, (name, price_cents)) in items.iter().enumerate() {
            let product = Product {
                id: Uuid::new_v4().to_string(),
                sku: format!("{prefix}-{:03}", idx + 1),
                name: name.to_string(),
                category_id: Some(category.to_string()),
                price_cents: *price_cents,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            db.catalog().insert_product(&product).await?;
            products += 1;

            for n in 0..batches_per_product {
                // older batches are cheaper; cost sits at 60-70% of price
                let cost_cents = price_cents * (60 + 5 * n) / 100;
                let quantity = 20 + 10 * ((idx as i64 + n) % 3);
                let received_at = now - Duration::days(batches_per_product - n);

                let batch = StockBatch {
                    id: Uuid::new_v4().to_string(),
                    product_id: product.id.clone(),
                    batch_number: Some(format!("{}-B{}", product.sku, n + 1)),
                    lot_number: None,
                    received_quantity: quantity,
                    available_quantity: quantity,
                    unit_cost_cents: cost_cents,
                    expiry_date: None,
                    received_at,
                    is_active: true,
                };

                let mut tx = db.begin().await?;
                stock::insert_batch(&mut tx, &batch).await?;
                stock::insert_movement(
                    &mut tx,
                    &StockMovement {
                        id: Uuid::new_v4().to_string(),
                        product_id: product.id.clone(),
                        batch_id: Some(batch.id.clone()),
                        movement_type: MovementType::Receipt,
                        quantity,
                        reference_type: Some("stock_batch".into()),
                        reference_id: Some(batch.id.clone()),
                        actor_id: actor_id.clone(),
                        notes: Some("seed".into()),
                        created_at: received_at,
                    },
                )
                .await?;
                tx.commit().await?;
                batches += 1;
            }
        }
    }

    println!(
        "Seed complete: {} cashiers, {} customers, {products} products, {batches} batches",
        CASHIERS.len(),
        CUSTOMERS.len()
    );

    db.close().await;
    Ok(())
}
