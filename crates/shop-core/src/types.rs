//! # Domain Types
//!
//! Records for the four shop tables plus the payloads used to insert them.
//!
//! ## Entity Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────────┐ referrer_id (SET NULL)                               │
//! │   │    User      │◄────────────┐                                        │
//! │   │  user_id PK  │─────────────┘                                        │
//! │   └──────┬───────┘                                                      │
//! │          │ user_id (CASCADE)                                            │
//! │   ┌──────▼───────┐      ┌──────────────────┐      ┌──────────────┐     │
//! │   │    Order     │◄─────│  OrderProduct    │─────►│   Product    │     │
//! │   │  order_id PK │ CASC │ (order, product) │ REST │ product_id PK│     │
//! │   └──────────────┘      │  quantity > 0    │      └──────────────┘     │
//! │                         └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - `user_id` is supplied by the caller (an external account id).
//! - `product_id` and `order_id` are generated by the database unless an
//!   upsert names them explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{
    validate_description, validate_full_name, validate_language_code, validate_price_cents,
    validate_quantity, validate_title, validate_username, ValidationResult,
};

// =============================================================================
// User
// =============================================================================

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    /// Primary key, supplied by the caller.
    pub user_id: i64,

    /// Display name.
    pub full_name: String,

    /// Optional handle.
    pub username: Option<String>,

    /// Language tag (e.g. "en").
    pub language_code: String,

    /// The user who referred this one. Nulled when the referrer is deleted.
    pub referrer_id: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for inserting or upserting a user.
///
/// ## Example
/// ```rust
/// use shop_core::NewUser;
///
/// let user = NewUser::new(42, "Jane Roe", "uk").referrer(7);
/// assert_eq!(user.referrer_id, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub user_id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub language_code: String,
    pub referrer_id: Option<i64>,
}

impl NewUser {
    pub fn new(
        user_id: i64,
        full_name: impl Into<String>,
        language_code: impl Into<String>,
    ) -> Self {
        NewUser {
            user_id,
            full_name: full_name.into(),
            username: None,
            language_code: language_code.into(),
            referrer_id: None,
        }
    }

    /// Sets the handle.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the referrer.
    pub fn referrer(mut self, referrer_id: i64) -> Self {
        self.referrer_id = Some(referrer_id);
        self
    }

    /// Checks every field against the column rules.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_full_name(&self.full_name)?;
        validate_username(self.username.as_deref())?;
        validate_language_code(&self.language_code)?;
        Ok(())
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product that can be placed on orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub product_id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Price in cents (smallest currency unit).
    pub price_cents: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price formatted as `major.minor` (e.g. `12.05`).
    pub fn price_display(&self) -> String {
        format_cents(self.price_cents)
    }
}

/// Payload for inserting or upserting a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
}

impl NewProduct {
    pub fn new(title: impl Into<String>, price_cents: i64) -> Self {
        NewProduct {
            title: title.into(),
            description: None,
            price_cents,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_title(&self.title)?;
        validate_description(self.description.as_deref())?;
        validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

// =============================================================================
// Order
// =============================================================================

/// An order owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for bulk order inserts.
///
/// `created_at` is optional so seeded data can carry historical timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    pub fn new(user_id: i64) -> Self {
        NewOrder {
            user_id,
            created_at: None,
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

// =============================================================================
// Order Product
// =============================================================================

/// One line of an order. At most one exists per `(order_id, product_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderProduct {
    pub order_id: i64,
    pub product_id: i64,

    /// Always positive.
    pub quantity: i64,
}

impl OrderProduct {
    pub fn new(order_id: i64, product_id: i64, quantity: i64) -> Self {
        OrderProduct {
            order_id,
            product_id,
            quantity,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_quantity(self.quantity)
    }
}

/// An order line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub order_id: i64,
    pub product_id: i64,
    pub title: String,
    pub price_cents: i64,
    pub quantity: i64,

    /// `price_cents * quantity`
    pub line_total_cents: i64,
}

/// A user joined with the name of whoever referred them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReferralRow {
    pub user_id: i64,
    pub full_name: String,
    pub referrer_id: i64,
    pub referrer_name: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Formats an amount in cents as `major.minor`.
///
/// ```rust
/// use shop_core::format_cents;
///
/// assert_eq!(format_cents(1099), "10.99");
/// assert_eq!(format_cents(-5), "-0.05");
/// ```
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
