//! # Settlement Error Types
//!
//! One error type for every use case in this crate.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Settlement Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Lookup      │  │     Input       │  │     Business rule       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  Validation     │  │  InsufficientStock      │ │
//! │  │  Inactive       │  │  DuplicateBill  │  │  Overpayment            │ │
//! │  │                 │  │  Number         │  │  SaleSettled            │ │
//! │  │                 │  │                 │  │  SaleHasPayments        │ │
//! │  │                 │  │                 │  │  TotalBelowPaid         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Consistency   │  │    Database     │                              │
//! │  │                 │  │                 │                              │
//! │  │  guard failed,  │  │  DbError        │                              │
//! │  │  ledger drift   │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failed use case has rolled its transaction back before the error
//! reaches the caller.

use serde::Serialize;
use thiserror::Error;

use kasa_core::{CoreError, ValidationError};
use kasa_db::DbError;

/// Result type alias for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// Sale, sale item, payment, product, customer or cashier missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Referenced product or cashier exists but is deactivated.
    #[error("{entity} {id} is inactive")]
    Inactive { entity: String, id: String },

    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bill number already exists: {0}")]
    DuplicateBillNumber(String),

    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Payment of {attempted_cents} exceeds remaining balance: total {total_cents}, already paid {paid_cents}")]
    Overpayment {
        total_cents: i64,
        paid_cents: i64,
        attempted_cents: i64,
    },

    /// Items, bill discount and deletion are closed once a sale is settled.
    #[error("Sale {sale_id} is settled and can no longer change")]
    SaleSettled { sale_id: String },

    #[error("Sale {sale_id} has {payment_count} payment(s) and cannot be deleted")]
    SaleHasPayments { sale_id: String, payment_count: i64 },

    /// A change would leave the sale total below what has been paid.
    #[error("Sale {sale_id} total would drop to {total_cents}, below the {paid_cents} already paid")]
    TotalBelowPaid {
        sale_id: String,
        total_cents: i64,
        paid_cents: i64,
    },

    // =========================================================================
    // Consistency & Infrastructure
    // =========================================================================
    /// Stored state disagrees with what the operation expected.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl SettlementError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SettlementError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn inactive(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SettlementError::Inactive {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SettlementError::NotFound { .. } => ErrorCode::NotFound,
            SettlementError::Inactive { .. } => ErrorCode::Inactive,
            SettlementError::Validation(_) => ErrorCode::ValidationError,
            SettlementError::DuplicateBillNumber(_) => ErrorCode::DuplicateBillNumber,
            SettlementError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            SettlementError::Overpayment { .. } => ErrorCode::Overpayment,
            SettlementError::SaleSettled { .. } => ErrorCode::SaleSettled,
            SettlementError::SaleHasPayments { .. } => ErrorCode::SaleHasPayments,
            SettlementError::TotalBelowPaid { .. } => ErrorCode::TotalBelowPaid,
            SettlementError::Consistency(_) => ErrorCode::Consistency,
            SettlementError::Config(_) => ErrorCode::ConfigError,
            SettlementError::Database(_) => ErrorCode::DatabaseError,
        }
    }

    /// True when the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            SettlementError::Consistency(_)
                | SettlementError::Config(_)
                | SettlementError::Database(_)
        )
    }
}

/// Error codes for callers that switch on the kind of failure.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for product ..." }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Inactive,
    ValidationError,
    DuplicateBillNumber,
    InsufficientStock,
    Overpayment,
    SaleSettled,
    SaleHasPayments,
    TotalBelowPaid,
    Consistency,
    ConfigError,
    DatabaseError,
}

/// Error shape handed to a UI or API layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&SettlementError> for ErrorReport {
    fn from(err: &SettlementError) -> Self {
        ErrorReport {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SettlementError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::Overpayment {
                total_cents,
                paid_cents,
                attempted_cents,
            } => SettlementError::Overpayment {
                total_cents,
                paid_cents,
                attempted_cents,
            },
            CoreError::ReturnExceedsDrawn { requested, drawn } => SettlementError::Consistency(
                format!("ledger shows {drawn} units drawn, cannot return {requested}"),
            ),
            CoreError::QuantityTooLarge { max, .. } => {
                SettlementError::Validation(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max,
                })
            }
            CoreError::Validation(e) => SettlementError::Validation(e),
        }
    }
}

impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            DbError::GuardFailed { entity, id, reason } => {
                SettlementError::Consistency(format!("{entity} {id}: {reason}"))
            }
            DbError::CheckViolation { message } => SettlementError::Consistency(message),
            DbError::UniqueViolation { ref field, ref value } if field == "sales.bill_number" => {
                SettlementError::DuplicateBillNumber(value.clone())
            }
            other => SettlementError::Database(other),
        }
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        SettlementError::from(DbError::from(err))
    }
}

impl From<std::io::Error> for SettlementError {
    fn from(err: std::io::Error) -> Self {
        SettlementError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for SettlementError {
    fn from(err: toml::de::Error) -> Self {
        SettlementError::Config(err.to_string())
    }
}
