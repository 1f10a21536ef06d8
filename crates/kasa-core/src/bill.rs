//! # Bill Numbers
//!
//! Format: `<PREFIX>-<YYYYMMDD>-<NNNNNN>`, e.g. `INV-20260131-000042`.
//!
//! The sequence is kept per prefix and day in the database (`bill_sequences`)
//! and only ever moves forward, so a number is never handed out twice even
//! when its sale is deleted.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Maximum length of a caller-supplied bill number.
pub const MAX_BILL_NUMBER_LEN: usize = 50;

/// Sequence key for a prefix and day.
///
/// ```rust
/// use chrono::NaiveDate;
/// use kasa_core::bill::sequence_scope;
///
/// let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(sequence_scope("INV", day), "INV-20260131");
/// ```
pub fn sequence_scope(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}", prefix, date.format("%Y%m%d"))
}

/// Formats the `seq`-th bill number of a scope.
///
/// ```rust
/// use chrono::NaiveDate;
/// use kasa_core::bill::format_bill_number;
///
/// let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(format_bill_number("INV", day, 42), "INV-20260131-000042");
/// ```
pub fn format_bill_number(prefix: &str, date: NaiveDate, seq: i64) -> String {
    format!("{}-{:06}", sequence_scope(prefix, date), seq)
}

/// Validates a bill prefix: 1-10 ASCII uppercase letters or digits.
pub fn validate_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "bill_prefix".to_string(),
        });
    }
    if prefix.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "bill_prefix".to_string(),
            max: 10,
        });
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "bill_prefix".to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }
    Ok(())
}

/// Validates a caller-supplied bill number.
///
/// Any non-empty printable text up to 50 characters; uniqueness is the
/// database's job.
pub fn validate_bill_number(bill_number: &str) -> ValidationResult<()> {
    let trimmed = bill_number.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "bill_number".to_string(),
        });
    }
    if trimmed.len() > MAX_BILL_NUMBER_LEN {
        return Err(ValidationError::TooLong {
            field: "bill_number".to_string(),
            max: MAX_BILL_NUMBER_LEN,
        });
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "bill_number".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}
