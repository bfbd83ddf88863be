//! # Fake-Data Seeding
//!
//! Fills an existing database with reproducible fake users, products,
//! orders, and order lines.
//!
//! ## Seeding Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  seed_fake_data(&db, &SeedPlan { seed: 42, .. })                        │
//! │       │                                                                 │
//! │       ├── 1. truncate_all (ids restart at 1)                           │
//! │       ├── 2. base users        (no referrer)                           │
//! │       ├── 3. referred users    (referrer = any earlier user)           │
//! │       ├── 4. products          (fake titles, random prices)            │
//! │       ├── 5. orders            (random owner, anchored timestamps)     │
//! │       └── 6. order lines       (distinct products, random quantity)    │
//! │                                                                         │
//! │  Same plan → same rows. All randomness comes from one ChaCha8Rng.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row timestamps set by the repositories (`users`, `products`) use the
//! current time and are the only values that differ between runs.

use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::raw::Username;
use fake::faker::lorem::raw::{Sentence, Words};
use fake::faker::name::raw::Name;
use fake::locales::EN;
use fake::Fake;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use shop_core::validation::MAX_QUANTITY;
use shop_core::{NewOrder, NewProduct, NewUser, OrderProduct, ValidationError};

/// Language tags assigned to fake users.
const LANGUAGE_CODES: &[&str] = &["en", "uk", "de", "fr", "es", "pl"];

/// 2024-01-01T00:00:00Z. Order timestamps fall within 90 days after it.
const ANCHOR_UNIX_SECS: i64 = 1_704_067_200;
const ORDER_WINDOW_MINUTES: i64 = 90 * 24 * 60;

const MIN_FAKE_PRICE_CENTS: i64 = 99;
const MAX_FAKE_PRICE_CENTS: i64 = 99_999;

/// Probability (out of 10) that a fake user has a username.
const USERNAME_ODDS: u32 = 7;

/// How much data to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPlan {
    /// RNG seed. Equal seeds produce equal data.
    pub seed: u64,
    pub base_users: usize,
    pub referred_users: usize,
    pub products: usize,
    pub orders: usize,
    pub max_lines_per_order: usize,
    pub max_quantity: i64,
}

impl Default for SeedPlan {
    fn default() -> Self {
        SeedPlan {
            seed: 42,
            base_users: 10,
            referred_users: 10,
            products: 10,
            orders: 10,
            max_lines_per_order: 3,
            max_quantity: 5,
        }
    }
}

impl SeedPlan {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.referred_users > 0 && self.base_users == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "referred_users".to_string(),
                reason: "referred users need at least one base user".to_string(),
            });
        }
        if self.orders > 0 && self.base_users == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "orders".to_string(),
                reason: "orders need at least one user".to_string(),
            });
        }
        if self.max_lines_per_order == 0 {
            return Err(ValidationError::MustBePositive {
                field: "max_lines_per_order".to_string(),
            });
        }
        if self.max_quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "max_quantity".to_string(),
            });
        }
        if self.max_quantity > MAX_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "max_quantity".to_string(),
                min: 1,
                max: MAX_QUANTITY,
            });
        }
        Ok(())
    }
}

/// Rows written by one seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeedSummary {
    pub users: u64,
    pub referred_users: u64,
    pub products: u64,
    pub orders: u64,
    pub order_lines: u64,
}

/// Replaces all data in `db` with fake data described by `plan`.
///
/// The plan is validated before anything is truncated. After that, the
/// truncation and each bulk insert commit on their own, so a failure
/// part-way leaves a partly seeded database. Running the same plan again
/// truncates it and produces the full data set.
///
/// ## Errors
/// * `DbError::Validation` - the plan is inconsistent (e.g. orders but no users)
pub async fn seed_fake_data(db: &Database, plan: &SeedPlan) -> DbResult<SeedSummary> {
    plan.validate()?;

    info!(?plan, "Seeding fake data");

    let mut rng = ChaCha8Rng::seed_from_u64(plan.seed);
    let mut summary = SeedSummary::default();

    db.truncate_all().await?;

    let base_users: Vec<NewUser> = (1..=plan.base_users as i64)
        .map(|user_id| fake_user(&mut rng, user_id))
        .collect();
    summary.users = db.users().bulk_insert_users(&base_users).await?;

    let first_referred = plan.base_users as i64 + 1;
    let referred_users: Vec<NewUser> = (first_referred..first_referred + plan.referred_users as i64)
        .map(|user_id| {
            let referrer = rng.random_range(1..user_id);
            fake_user(&mut rng, user_id).referrer(referrer)
        })
        .collect();
    summary.referred_users = db.users().bulk_insert_users(&referred_users).await?;

    let products: Vec<NewProduct> = (0..plan.products).map(|_| fake_product(&mut rng)).collect();
    summary.products = db.products().bulk_insert_products(&products).await?;

    let last_user_id = first_referred - 1 + plan.referred_users as i64;
    let orders = (0..plan.orders)
        .map(|_| -> DbResult<NewOrder> {
            let owner = rng.random_range(1..=last_user_id);
            Ok(NewOrder::new(owner).created_at(fake_order_time(&mut rng)?))
        })
        .collect::<DbResult<Vec<NewOrder>>>()?;
    summary.orders = db.orders().bulk_insert_orders(&orders).await?;

    let product_ids: Vec<i64> =
        sqlx::query_scalar("SELECT product_id FROM products ORDER BY product_id")
            .fetch_all(db.pool())
            .await?;
    let order_ids: Vec<i64> = sqlx::query_scalar("SELECT order_id FROM orders ORDER BY order_id")
        .fetch_all(db.pool())
        .await?;

    let mut lines = Vec::new();
    if !product_ids.is_empty() {
        for order_id in order_ids {
            let line_count = rng.random_range(1..=plan.max_lines_per_order.min(product_ids.len()));
            let chosen: Vec<i64> = product_ids
                .choose_multiple(&mut rng, line_count)
                .copied()
                .collect();
            for product_id in chosen {
                let quantity = rng.random_range(1..=plan.max_quantity);
                lines.push(OrderProduct::new(order_id, product_id, quantity));
            }
        }
    }
    summary.order_lines = db.orders().bulk_upsert_order_products(&lines).await?;

    info!(?summary, "Seeding complete");
    Ok(summary)
}

fn fake_user(rng: &mut ChaCha8Rng, user_id: i64) -> NewUser {
    let full_name: String = Name(EN).fake_with_rng(rng);
    let language = LANGUAGE_CODES[rng.random_range(0..LANGUAGE_CODES.len())];

    let user = NewUser::new(user_id, full_name, language);
    if rng.random_ratio(USERNAME_ODDS, 10) {
        let handle: String = Username(EN).fake_with_rng(rng);
        let handle: String = handle.chars().filter(|c| !c.is_whitespace()).collect();
        if !handle.is_empty() {
            return user.username(handle);
        }
    }
    user
}

fn fake_product(rng: &mut ChaCha8Rng) -> NewProduct {
    let words: Vec<String> = Words(EN, 1..4).fake_with_rng(rng);
    let title = capitalize(&words.join(" "));
    let description: String = Sentence(EN, 4..10).fake_with_rng(rng);
    let price = rng.random_range(MIN_FAKE_PRICE_CENTS..=MAX_FAKE_PRICE_CENTS);

    NewProduct::new(title, price).description(description)
}

fn fake_order_time(rng: &mut ChaCha8Rng) -> DbResult<DateTime<Utc>> {
    let anchor = DateTime::from_timestamp(ANCHOR_UNIX_SECS, 0)
        .ok_or_else(|| DbError::Internal("invalid seed anchor timestamp".to_string()))?;
    Ok(anchor + Duration::minutes(rng.random_range(0..ORDER_WINDOW_MINUTES)))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
