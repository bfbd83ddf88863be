//! # Report Rows
//!
//! Rows produced by the joined aggregates in `shop-db`'s report repository.
//! One row per group; aggregates over empty input come back as `0` for
//! counts/sums and `None` for min/max/average.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of users per language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LanguageCount {
    pub language_code: String,
    pub user_count: i64,
}

/// Price statistics across all products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PriceStats {
    pub product_count: i64,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub avg_price_cents: Option<f64>,
}

/// Totals for a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderTotal {
    pub order_id: i64,
    pub user_id: i64,

    /// Distinct products on the order.
    pub line_count: i64,

    /// Sum of quantities.
    pub item_count: i64,

    pub total_cents: i64,
}

/// Spending per user. Users without orders report zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserSpending {
    pub user_id: i64,
    pub full_name: String,
    pub order_count: i64,
    pub total_spent_cents: i64,
}

/// Sales per product, ranked by quantity sold (ties share a rank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductSales {
    pub product_id: i64,
    pub title: String,
    pub quantity_sold: i64,
    pub revenue_cents: i64,
    pub sales_rank: i64,
}

/// Order count per user with a dense rank (1 = most orders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserOrderRank {
    pub user_id: i64,
    pub full_name: String,
    pub order_count: i64,
    pub order_rank: i64,
}

/// One order in a user's history with its position and running total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderRunningTotal {
    pub order_id: i64,
    pub created_at: DateTime<Utc>,

    /// 1-based position in the user's history, oldest first.
    pub order_number: i64,

    pub order_total_cents: i64,
    pub running_total_cents: i64,
}

/// How many users each referrer brought in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReferralCount {
    pub referrer_id: i64,
    pub referrer_name: String,
    pub referred_count: i64,
}
