//! # Scan Filters
//!
//! Predicate sets for the filtered/sorted scans. Orderings are closed enums
//! that map to fixed SQL fragments, so no caller text is ever spliced into
//! an `ORDER BY` clause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{validate_limit, validate_price_range, ValidationResult};

/// Default `limit` applied when a filter does not set one.
pub const DEFAULT_SCAN_LIMIT: u32 = 100;

// =============================================================================
// Users
// =============================================================================

/// Sort order for user scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    NameAsc,
    NameDesc,
    IdAsc,
}

impl UserOrder {
    /// The `ORDER BY` body for this ordering.
    pub fn as_sql(&self) -> &'static str {
        match self {
            UserOrder::NewestFirst => "created_at DESC, user_id DESC",
            UserOrder::OldestFirst => "created_at ASC, user_id ASC",
            UserOrder::NameAsc => "full_name ASC, user_id ASC",
            UserOrder::NameDesc => "full_name DESC, user_id DESC",
            UserOrder::IdAsc => "user_id ASC",
        }
    }
}

/// Predicates for `UserRepository::list_users`.
///
/// ## Example
/// ```rust
/// use shop_core::{UserFilter, UserOrder};
///
/// let filter = UserFilter::default()
///     .language("en")
///     .name_contains("doe")
///     .order(UserOrder::NameAsc)
///     .limit(10);
/// assert!(filter.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub language_code: Option<String>,

    /// Substring of `full_name`. Case folding covers ASCII letters only.
    pub name_contains: Option<String>,

    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,

    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,

    /// `Some(true)` keeps only referred users, `Some(false)` only unreferred.
    pub has_referrer: Option<bool>,

    pub order: UserOrder,
    pub limit: u32,
}

impl Default for UserFilter {
    fn default() -> Self {
        UserFilter {
            language_code: None,
            name_contains: None,
            created_after: None,
            created_before: None,
            has_referrer: None,
            order: UserOrder::default(),
            limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl UserFilter {
    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.language_code = Some(code.into());
        self
    }

    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn created_between(mut self, after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self.created_before = Some(before);
        self
    }

    pub fn has_referrer(mut self, referred: bool) -> Self {
        self.has_referrer = Some(referred);
        self
    }

    pub fn order(mut self, order: UserOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_limit(self.limit)?;
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(ValidationError::InvertedRange {
                    field: "created_at".to_string(),
                    min: after.timestamp(),
                    max: before.timestamp(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Products
// =============================================================================

/// Sort order for product scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductOrder {
    #[default]
    TitleAsc,
    PriceAsc,
    PriceDesc,
    NewestFirst,
}

impl ProductOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ProductOrder::TitleAsc => "title ASC, product_id ASC",
            ProductOrder::PriceAsc => "price_cents ASC, product_id ASC",
            ProductOrder::PriceDesc => "price_cents DESC, product_id ASC",
            ProductOrder::NewestFirst => "created_at DESC, product_id DESC",
        }
    }
}

/// Predicates for `ProductRepository::list_products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Substring of `title`. Case folding covers ASCII letters only.
    pub title_contains: Option<String>,

    /// Inclusive price bounds.
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,

    pub order: ProductOrder,
    pub limit: u32,
}

impl Default for ProductFilter {
    fn default() -> Self {
        ProductFilter {
            title_contains: None,
            min_price_cents: None,
            max_price_cents: None,
            order: ProductOrder::default(),
            limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl ProductFilter {
    pub fn title_contains(mut self, fragment: impl Into<String>) -> Self {
        self.title_contains = Some(fragment.into());
        self
    }

    pub fn price_between(mut self, min_cents: i64, max_cents: i64) -> Self {
        self.min_price_cents = Some(min_cents);
        self.max_price_cents = Some(max_cents);
        self
    }

    pub fn order(mut self, order: ProductOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_limit(self.limit)?;
        if let (Some(min), Some(max)) = (self.min_price_cents, self.max_price_cents) {
            validate_price_range(min, max)?;
        }
        Ok(())
    }
}

/// Wraps a fragment as a `LIKE` substring pattern, escaping `%`, `_` and
/// the escape character itself. Use with `ESCAPE '\'`.
///
/// SQLite's `LIKE` ignores case for ASCII letters only, so `"жан"` does not
/// match `"Жанна"`.
///
/// ```rust
/// use shop_core::filter::like_contains;
///
/// assert_eq!(like_contains("doe"), "%doe%");
/// assert_eq!(like_contains("50%_off"), "%50\\%\\_off%");
/// ```
pub fn like_contains(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_user_filter_defaults() {
        let filter = UserFilter::default();
        assert_eq!(filter.limit, DEFAULT_SCAN_LIMIT);
        assert_eq!(filter.order, UserOrder::NewestFirst);
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_user_filter_rejects_inverted_dates() {
        let now = Utc::now();
        let filter = UserFilter::default().created_between(now, now - Duration::days(1));
        assert!(matches!(
            filter.validate(),
            Err(ValidationError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_product_filter_limits() {
        assert!(ProductFilter::default().limit(0).validate().is_err());
        assert!(ProductFilter::default().limit(5000).validate().is_err());
        assert!(ProductFilter::default().limit(50).validate().is_ok());
    }

    #[test]
    fn test_product_filter_rejects_inverted_prices() {
        let filter = ProductFilter::default().price_between(1000, 10);
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_order_sql_is_fixed() {
        assert_eq!(ProductOrder::PriceDesc.as_sql(), "price_cents DESC, product_id ASC");
        assert_eq!(UserOrder::IdAsc.as_sql(), "user_id ASC");
    }

    #[test]
    fn test_like_contains_escapes_backslash() {
        assert_eq!(like_contains("a\\b"), "%a\\\\b%");
        assert_eq!(like_contains(""), "%%");
    }
}
