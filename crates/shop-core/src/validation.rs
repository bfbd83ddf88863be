//! # Validation Module
//!
//! Input rules checked by the repositories before SQL is issued.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (Rust)                                           │
//! │  ├── Empty / length checks on text columns                             │
//! │  ├── Sign and upper-bound checks on prices and quantities              │
//! │  └── Scan limits and range bounds                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── PRIMARY KEY uniqueness                                            │
//! │  └── Foreign keys (CASCADE / RESTRICT / SET NULL)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shop_core::validation::{validate_language_code, validate_quantity};
//!
//! validate_language_code("en").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_SCAN_LIMIT, MAX_TEXT_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted language tag (BCP 47 practical maximum).
pub const MAX_LANGUAGE_CODE_LEN: usize = 35;

/// Bounds for a relative price change in basis points (-100% .. +1000%).
pub const MIN_PRICE_CHANGE_BPS: i64 = -10_000;
pub const MAX_PRICE_CHANGE_BPS: i64 = 100_000;

/// Largest accepted price: ten billion in major units. Keeps
/// `price * (10000 + MAX_PRICE_CHANGE_BPS)` inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;

/// Largest quantity a single order line may hold.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Largest factor accepted by a quantity multiplication.
pub const MAX_MULTIPLIER: i64 = 1_000;

// =============================================================================
// String Validators
// =============================================================================

fn validate_required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::too_long(field, max));
    }

    Ok(())
}

/// Validates a user's display name.
///
/// ## Rules
/// - Must not be blank
/// - At most 255 characters
pub fn validate_full_name(name: &str) -> ValidationResult<()> {
    validate_required_text("full_name", name, MAX_TEXT_LEN)
}

/// Validates an optional handle.
///
/// `None` is accepted. When present it must be non-blank, at most 255
/// characters, and contain no whitespace.
///
/// ```rust
/// use shop_core::validation::validate_username;
///
/// assert!(validate_username(None).is_ok());
/// assert!(validate_username(Some("johnny")).is_ok());
/// assert!(validate_username(Some("john doe")).is_err());
/// ```
pub fn validate_username(username: Option<&str>) -> ValidationResult<()> {
    let Some(username) = username else {
        return Ok(());
    };

    validate_required_text("username", username, MAX_TEXT_LEN)?;

    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates a language tag such as `en` or `pt-BR`.
pub fn validate_language_code(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::required("language_code"));
    }

    if code.len() > MAX_LANGUAGE_CODE_LEN {
        return Err(ValidationError::too_long(
            "language_code",
            MAX_LANGUAGE_CODE_LEN,
        ));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "language_code".to_string(),
            reason: "must contain only ASCII letters, digits, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates a product title.
pub fn validate_title(title: &str) -> ValidationResult<()> {
    validate_required_text("title", title, MAX_TEXT_LEN)
}

/// Validates an optional product description (length only).
pub fn validate_description(description: Option<&str>) -> ValidationResult<()> {
    match description {
        Some(text) if text.chars().count() > MAX_TEXT_LEN * 4 => {
            Err(ValidationError::too_long("description", MAX_TEXT_LEN * 4))
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: "price_cents".to_string(),
        });
    }
    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price_cents".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Validates an inclusive price range.
pub fn validate_price_range(min_cents: i64, max_cents: i64) -> ValidationResult<()> {
    validate_price_cents(min_cents)?;
    validate_price_cents(max_cents)?;

    if min_cents > max_cents {
        return Err(ValidationError::InvertedRange {
            field: "price_cents".to_string(),
            min: min_cents,
            max: max_cents,
        });
    }

    Ok(())
}

/// Validates an order-line quantity.
///
/// ```rust
/// use shop_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(i64::MAX).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    validate_bounded_count("quantity", qty, MAX_QUANTITY)
}

/// Validates a quantity multiplier. A non-positive factor would break the
/// positive-quantity invariant.
pub fn validate_multiplier(factor: i64) -> ValidationResult<()> {
    validate_bounded_count("multiplier", factor, MAX_MULTIPLIER)
}

fn validate_bounded_count(field: &str, value: i64, max: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    if value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max,
        });
    }
    Ok(())
}

/// Validates a relative price change in basis points.
pub fn validate_price_change_bps(bps: i64) -> ValidationResult<()> {
    if !(MIN_PRICE_CHANGE_BPS..=MAX_PRICE_CHANGE_BPS).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "price_change_bps".to_string(),
            min: MIN_PRICE_CHANGE_BPS,
            max: MAX_PRICE_CHANGE_BPS,
        });
    }
    Ok(())
}

/// Validates a scan limit (1 to [`MAX_SCAN_LIMIT`]).
pub fn validate_limit(limit: u32) -> ValidationResult<()> {
    if limit == 0 || limit > MAX_SCAN_LIMIT {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: i64::from(MAX_SCAN_LIMIT),
        });
    }
    Ok(())
}
