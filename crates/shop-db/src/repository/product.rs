//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Delete Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  order_products.product_id → products  ON DELETE RESTRICT              │
//! │                                                                         │
//! │  delete_product(7)                                                     │
//! │       │                                                                 │
//! │       ├── no order lines reference 7  → row deleted                    │
//! │       └── order lines reference 7     → ForeignKeyViolation            │
//! │                                                                         │
//! │  delete_products_in_price_range(min, max)   (one transaction)          │
//! │       │                                                                 │
//! │       ├── 1. DELETE order lines for products in range                  │
//! │       ├── 2. DELETE products in range                                  │
//! │       └── COMMIT, or ROLLBACK both steps on any error                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::repository::bulk_insert;
use shop_core::filter::like_contains;
use shop_core::validation::{validate_price_cents, validate_price_change_bps, validate_price_range};
use shop_core::{NewProduct, PriceStats, Product, ProductFilter};

const PRODUCT_COLUMNS: &str = "product_id, title, description, price_cents, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product with a database-generated id.
    pub async fn add_product(&self, product: &NewProduct) -> DbResult<Product> {
        product.validate()?;

        debug!(title = %product.title, "Inserting product");

        let sql = format!(
            "INSERT INTO products (title, description, price_cents, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) RETURNING {PRODUCT_COLUMNS}"
        );

        let stored = sqlx::query_as::<_, Product>(&sql)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price_cents)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    /// Inserts a product under `product_id`, or overwrites title,
    /// description, and price of the existing row.
    pub async fn upsert_product(&self, product_id: i64, product: &NewProduct) -> DbResult<Product> {
        product.validate()?;

        debug!(product_id, title = %product.title, "Upserting product");

        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
             ON CONFLICT (product_id) DO UPDATE SET \
                 title = excluded.title, \
                 description = excluded.description, \
                 price_cents = excluded.price_cents, \
                 updated_at = excluded.updated_at \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let stored = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price_cents)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_product(&self, product_id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Filtered, sorted scan over products.
    pub async fn list_products(&self, filter: &ProductFilter) -> DbResult<Vec<Product>> {
        filter.validate()?;

        debug!(?filter, "Listing products");

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1 = 1"));

        if let Some(fragment) = &filter.title_contains {
            builder
                .push(" AND title LIKE ")
                .push_bind(like_contains(fragment))
                .push(" ESCAPE '\\'");
        }
        if let Some(min) = filter.min_price_cents {
            builder.push(" AND price_cents >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price_cents {
            builder.push(" AND price_cents <= ").push_bind(max);
        }

        builder
            .push(" ORDER BY ")
            .push(filter.order.as_sql())
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit));

        let products = builder.build_query_as::<Product>().fetch_all(&self.pool).await?;

        debug!(count = products.len(), "Product scan returned rows");
        Ok(products)
    }

    /// Sets a product's price. Returns rows affected.
    pub async fn update_price(&self, product_id: i64, price_cents: i64) -> DbResult<u64> {
        validate_price_cents(price_cents)?;

        debug!(product_id, price_cents, "Updating price");

        let result = sqlx::query(
            "UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE product_id = ?1",
        )
        .bind(product_id)
        .bind(price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Changes a price by a relative amount in basis points, computed in SQL.
    ///
    /// `new = price * (10000 + bps) / 10000`, truncated toward zero.
    /// `+1000` raises by 10%, `-2500` cuts by 25%.
    pub async fn apply_price_change(&self, product_id: i64, bps: i64) -> DbResult<u64> {
        validate_price_change_bps(bps)?;

        debug!(product_id, bps, "Applying relative price change");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET
                price_cents = (price_cents * (10000 + ?2)) / 10000,
                updated_at = ?3
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(bps)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes a product. Returns rows affected.
    ///
    /// ## Errors
    /// * `DbError::ForeignKeyViolation` - order lines still reference it
    pub async fn delete_product(&self, product_id: i64) -> DbResult<u64> {
        debug!(product_id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE product_id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes every product priced within `[min_cents, max_cents]`, together
    /// with the order lines referencing them, in one transaction.
    ///
    /// ## Returns
    /// Number of products deleted.
    pub async fn delete_products_in_price_range(
        &self,
        min_cents: i64,
        max_cents: i64,
    ) -> DbResult<u64> {
        validate_price_range(min_cents, max_cents)?;

        let mut tx = self.pool.begin().await?;

        match delete_in_range(&mut *tx, min_cents, max_cents).await {
            Ok((lines, products)) => {
                tx.commit().await?;
                info!(min_cents, max_cents, lines, products, "Deleted products in price range");
                Ok(products)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    min_cents,
                    max_cents,
                    "Price-range delete failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Inserts all products in one transaction.
    pub async fn bulk_insert_products(&self, products: &[NewProduct]) -> DbResult<u64> {
        for product in products {
            product.validate()?;
        }

        debug!(count = products.len(), "Bulk inserting products");

        let now = Utc::now();
        bulk_insert(
            &self.pool,
            products,
            "INSERT INTO products (title, description, price_cents, created_at, updated_at) ",
            None,
            |mut row, product| {
                row.push_bind(&product.title)
                    .push_bind(&product.description)
                    .push_bind(product.price_cents)
                    .push_bind(now)
                    .push_bind(now);
            },
        )
        .await
    }

    /// Count, min, max, and average price. On an empty catalog the count is
    /// zero and the rest are `None`.
    pub async fn price_stats(&self) -> DbResult<PriceStats> {
        let stats = sqlx::query_as::<_, PriceStats>(
            r#"
            SELECT
                COUNT(*) AS product_count,
                MIN(price_cents) AS min_price_cents,
                MAX(price_cents) AS max_price_cents,
                AVG(price_cents) AS avg_price_cents
            FROM products
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Both steps of the price-range delete. Returns `(lines, products)` removed.
async fn delete_in_range(
    conn: &mut SqliteConnection,
    min_cents: i64,
    max_cents: i64,
) -> DbResult<(u64, u64)> {
    let lines = sqlx::query(
        r#"
        DELETE FROM order_products
        WHERE product_id IN (
            SELECT product_id FROM products WHERE price_cents BETWEEN ?1 AND ?2
        )
        "#,
    )
    .bind(min_cents)
    .bind(max_cents)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let products = sqlx::query("DELETE FROM products WHERE price_cents BETWEEN ?1 AND ?2")
        .bind(min_cents)
        .bind(max_cents)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok((lines, products))
}
