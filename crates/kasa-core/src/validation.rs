//! # Validation Module
//!
//! Input validation for settlement operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Use case (kasa-settlement)                                   │
//! │  └── THIS MODULE: reject bad quantities, prices, discounts, amounts   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Pure math (discount, fifo)                                   │
//! │  └── Lenient: out-of-range discount parts count as zero                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (0 <= available_quantity <= received_quantity)              │
//! │  ├── UNIQUE (bill_number)                                              │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kasa_core::validation::{validate_discount, validate_quantity};
//! use kasa_core::discount::DiscountSpec;
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_discount("discount", DiscountSpec::percentage(12000)).is_err());
//! ```

use chrono::{DateTime, Utc};

use crate::discount::DiscountSpec;
use crate::error::ValidationError;
use crate::money::BPS_SCALE;
use crate::{MAX_ITEM_QUANTITY, MAX_MONEY_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of free-text notes.
pub const MAX_NOTES_LEN: usize = 500;

/// Maximum length of a payment reference.
pub const MAX_REFERENCE_LEN: usize = 100;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
/// - Must not exceed MAX_MONEY_CENTS
///
/// ## Example
/// ```rust
/// use kasa_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_MONEY_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_MONEY_CENTS,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    if cents > MAX_MONEY_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_MONEY_CENTS,
        });
    }

    Ok(())
}

/// Validates a discount entered at the service boundary.
///
/// The calculator itself ignores out-of-range parts; callers entering a
/// discount get told instead.
///
/// ## Rules
/// - Percentage between 0 and 10000 bps (0% to 100%)
/// - Fixed amount between 0 and MAX_MONEY_CENTS
pub fn validate_discount(field: &str, spec: DiscountSpec) -> ValidationResult<()> {
    if !(0..=BPS_SCALE).contains(&spec.percentage_bps) {
        return Err(ValidationError::OutOfRange {
            field: format!("{field} percentage_bps"),
            min: 0,
            max: BPS_SCALE,
        });
    }

    if !(0..=MAX_MONEY_CENTS).contains(&spec.fixed_cents) {
        return Err(ValidationError::OutOfRange {
            field: format!("{field} fixed_cents"),
            min: 0,
            max: MAX_MONEY_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates optional free text against a maximum length.
pub fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use kasa_core::validation::validate_uuid;
///
/// assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates that a required reference is present.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates a half-open reporting range `[from, to)`.
pub fn validate_date_range(from: DateTime<Utc>, to: DateTime<Utc>) -> ValidationResult<()> {
    if from >= to {
        return Err(ValidationError::InvalidFormat {
            field: "date range".to_string(),
            reason: "start must be before end".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
