//! # kasa-db: Database Layer for the Settlement Engine
//!
//! SQLite storage for sales, sale items, payments, stock batches, the stock
//! movement ledger and bill number sequences, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasa Data Flow                                   │
//! │                                                                         │
//! │  kasa-settlement (SaleService::create_sale_item)                        │
//! │       │  locks product, opens one transaction                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasa-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ sale          │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ sale_item     │    │ 001_initial  │  │   │
//! │  │   │ begin()       │    │ payment       │    │ _schema.sql  │  │   │
//! │  │   │               │    │ stock         │    │              │  │   │
//! │  │   │               │    │ sequence      │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL, foreign keys on)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two ways in
//!
//! Each repository struct holds the pool and serves standalone reads. The
//! module-level functions next to it take `&mut SqliteConnection` so a caller
//! can run several of them inside one transaction:
//!
//! ```rust,ignore
//! use kasa_db::repository::{sale, sale_item};
//!
//! let mut tx = db.begin().await?;
//! sale::touch(&mut tx, &sale_id).await?;
//! sale_item::insert(&mut tx, &item).await?;
//! tx.commit().await?;
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::payment::PaymentRepository;
pub use repository::report::ReportRepository;
pub use repository::sale::{SaleFilter, SaleRepository};
pub use repository::sale_item::SaleItemRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::stock::StockRepository;
