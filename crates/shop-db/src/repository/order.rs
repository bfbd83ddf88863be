//! # Order Repository
//!
//! Orders and their lines (`order_products`).
//!
//! ## Line Upserts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (order_id, product_id) is the primary key of order_products            │
//! │                                                                         │
//! │  add_product(1, 7, 2)   no line yet        → quantity 2                │
//! │  add_product(1, 7, 3)   line exists        → quantity 2 + 3 = 5        │
//! │  set_quantity(1, 7, 1)  line exists        → quantity 1                │
//! │  multiply_quantities(1, 4)                 → every line × 4            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deleting an order removes its lines (`ON DELETE CASCADE`). Deleting the
//! owning user removes the orders.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::bulk_insert;
use shop_core::validation::{validate_multiplier, validate_quantity};
use shop_core::{NewOrder, Order, OrderLine, OrderProduct};

const ORDER_COLUMNS: &str = "order_id, user_id, created_at, updated_at";

/// Repository for order and order-line operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an empty order for `user_id`.
    ///
    /// ## Errors
    /// * `DbError::ForeignKeyViolation` - the user doesn't exist
    pub async fn create_order(&self, user_id: i64) -> DbResult<Order> {
        debug!(user_id, "Creating order");

        let sql = format!(
            "INSERT INTO orders (user_id, created_at, updated_at) VALUES (?1, ?2, ?2) \
             RETURNING {ORDER_COLUMNS}"
        );

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(order)
    }

    /// Gets an order by its ID.
    pub async fn get_order(&self, order_id: i64) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1");

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// A user's orders, oldest first.
    pub async fn orders_for_user(&self, user_id: i64) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 \
             ORDER BY created_at, order_id"
        );

        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    /// Adds `quantity` of a product to an order. If the line already exists
    /// its quantity is increased by `quantity`.
    pub async fn add_product(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> DbResult<OrderProduct> {
        validate_quantity(quantity)?;

        debug!(order_id, product_id, quantity, "Adding product to order");

        let line = sqlx::query_as::<_, OrderProduct>(
            r#"
            INSERT INTO order_products (order_id, product_id, quantity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (order_id, product_id) DO UPDATE SET
                quantity = order_products.quantity + excluded.quantity
            RETURNING order_id, product_id, quantity
            "#,
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        self.touch(order_id).await?;
        Ok(line)
    }

    /// Sets the quantity of a line, creating it if missing.
    pub async fn set_quantity(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> DbResult<OrderProduct> {
        validate_quantity(quantity)?;

        debug!(order_id, product_id, quantity, "Setting line quantity");

        let line = sqlx::query_as::<_, OrderProduct>(
            r#"
            INSERT INTO order_products (order_id, product_id, quantity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (order_id, product_id) DO UPDATE SET
                quantity = excluded.quantity
            RETURNING order_id, product_id, quantity
            "#,
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        self.touch(order_id).await?;
        Ok(line)
    }

    /// Multiplies every line quantity of an order. Returns lines updated.
    pub async fn multiply_quantities(&self, order_id: i64, multiplier: i64) -> DbResult<u64> {
        validate_multiplier(multiplier)?;

        debug!(order_id, multiplier, "Multiplying line quantities");

        let result = sqlx::query(
            "UPDATE order_products SET quantity = quantity * ?2 WHERE order_id = ?1",
        )
        .bind(order_id)
        .bind(multiplier)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.touch(order_id).await?;
        }
        Ok(result.rows_affected())
    }

    /// Removes one line from an order. Returns rows affected.
    pub async fn remove_product(&self, order_id: i64, product_id: i64) -> DbResult<u64> {
        debug!(order_id, product_id, "Removing product from order");

        let result =
            sqlx::query("DELETE FROM order_products WHERE order_id = ?1 AND product_id = ?2")
                .bind(order_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Deletes an order and, by cascade, its lines.
    pub async fn delete_order(&self, order_id: i64) -> DbResult<u64> {
        debug!(order_id, "Deleting order");

        let result = sqlx::query("DELETE FROM orders WHERE order_id = ?1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Lines of an order joined with their products.
    pub async fn order_lines(&self, order_id: i64) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT
                op.order_id,
                op.product_id,
                p.title,
                p.price_cents,
                op.quantity,
                p.price_cents * op.quantity AS line_total_cents
            FROM order_products op
            INNER JOIN products p ON p.product_id = op.product_id
            WHERE op.order_id = ?1
            ORDER BY op.product_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Raw lines of an order.
    pub async fn order_products(&self, order_id: i64) -> DbResult<Vec<OrderProduct>> {
        let lines = sqlx::query_as::<_, OrderProduct>(
            "SELECT order_id, product_id, quantity FROM order_products \
             WHERE order_id = ?1 ORDER BY product_id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Inserts all orders in one transaction. Orders without a timestamp get
    /// the current time.
    pub async fn bulk_insert_orders(&self, orders: &[NewOrder]) -> DbResult<u64> {
        debug!(count = orders.len(), "Bulk inserting orders");

        let now = Utc::now();
        bulk_insert(
            &self.pool,
            orders,
            "INSERT INTO orders (user_id, created_at, updated_at) ",
            None,
            |mut row, order| {
                let at = order.created_at.unwrap_or(now);
                row.push_bind(order.user_id).push_bind(at).push_bind(at);
            },
        )
        .await
    }

    /// Upserts lines in one transaction. Existing lines take the new quantity.
    pub async fn bulk_upsert_order_products(&self, lines: &[OrderProduct]) -> DbResult<u64> {
        for line in lines {
            line.validate()?;
        }

        debug!(count = lines.len(), "Bulk upserting order lines");

        bulk_insert(
            &self.pool,
            lines,
            "INSERT INTO order_products (order_id, product_id, quantity) ",
            Some("ON CONFLICT (order_id, product_id) DO UPDATE SET quantity = excluded.quantity"),
            |mut row, line| {
                row.push_bind(line.order_id)
                    .push_bind(line.product_id)
                    .push_bind(line.quantity);
            },
        )
        .await
    }

    /// Moves every order of `from_user` to `to_user` in one transaction.
    ///
    /// ## Returns
    /// Number of orders reassigned.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - either user doesn't exist (nothing changes)
    pub async fn transfer_orders(&self, from_user: i64, to_user: i64) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        match transfer_in_tx(&mut *tx, from_user, to_user).await {
            Ok(moved) => {
                tx.commit().await?;
                info!(from_user, to_user, moved, "Transferred orders");
                Ok(moved)
            }
            Err(err) => {
                warn!(error = %err, from_user, to_user, "Order transfer failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Counts all orders.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn touch(&self, order_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE orders SET updated_at = ?2 WHERE order_id = ?1")
            .bind(order_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn user_exists(conn: &mut SqliteConnection, user_id: i64) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

async fn transfer_in_tx(
    conn: &mut SqliteConnection,
    from_user: i64,
    to_user: i64,
) -> DbResult<u64> {
    for user_id in [from_user, to_user] {
        if !user_exists(conn, user_id).await? {
            return Err(DbError::not_found("User", user_id));
        }
    }

    let result = sqlx::query("UPDATE orders SET user_id = ?2, updated_at = ?3 WHERE user_id = ?1")
        .bind(from_user)
        .bind(to_user)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use crate::Database;
    use chrono::TimeZone;
    use shop_core::validation::MAX_QUANTITY;
    use shop_core::{NewProduct, NewUser, ValidationError};

    /// Two users, two products (1000 and 250 cents), one empty order for user 1.
    async fn setup() -> (Database, i64) {
        let db = memory_db().await;
        db.users()
            .bulk_insert_users(&[NewUser::new(1, "Alice", "en"), NewUser::new(2, "Bob", "en")])
            .await
            .unwrap();
        db.products()
            .bulk_insert_products(&[NewProduct::new("Book", 1000), NewProduct::new("Pen", 250)])
            .await
            .unwrap();
        let order = db.orders().create_order(1).await.unwrap();
        (db, order.order_id)
    }

    #[tokio::test]
    async fn test_create_order_for_unknown_user_fails() {
        let db = memory_db().await;
        let err = db.orders().create_order(77).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_oversized_quantity_rejected_before_sql() {
        let (db, order_id) = setup().await;

        let err = db.orders().add_product(order_id, 1, i64::MAX).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::OutOfRange { .. })));

        let err = db.orders().multiply_quantities(order_id, i64::MAX).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::OutOfRange { .. })));

        assert!(db.orders().order_products(order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment_past_max_quantity_keeps_line_intact() {
        let (db, order_id) = setup().await;
        let orders = db.orders();
        orders.add_product(order_id, 1, MAX_QUANTITY).await.unwrap();

        let err = orders.add_product(order_id, 1, 1).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));

        let err = orders.multiply_quantities(order_id, 2).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));

        let lines = orders.order_products(order_id).await.unwrap();
        assert_eq!(lines, vec![OrderProduct::new(order_id, 1, MAX_QUANTITY)]);
        assert_eq!(
            db.reports().total_revenue().await.unwrap(),
            MAX_QUANTITY * 1000
        );
    }

    #[tokio::test]
    async fn test_overflowing_quantity_update_is_rejected() {
        let (db, order_id) = setup().await;
        db.orders().add_product(order_id, 1, 3).await.unwrap();

        let err = db
            .execute_raw("UPDATE order_products SET quantity = quantity * 9223372036854775807")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));

        let lines = db.orders().order_products(order_id).await.unwrap();
        assert_eq!(lines[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_add_product_increments_and_set_quantity_replaces() {
        let (db, order_id) = setup().await;
        let orders = db.orders();

        assert_eq!(orders.add_product(order_id, 1, 2).await.unwrap().quantity, 2);
        assert_eq!(orders.add_product(order_id, 1, 3).await.unwrap().quantity, 5);
        assert_eq!(orders.set_quantity(order_id, 1, 1).await.unwrap().quantity, 1);

        let lines = orders.order_products(order_id).await.unwrap();
        assert_eq!(lines, vec![OrderProduct::new(order_id, 1, 1)]);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (db, order_id) = setup().await;
        let err = db.orders().add_product(order_id, 1, 0).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_line_for_unknown_product_fails() {
        let (db, order_id) = setup().await;
        let err = db.orders().add_product(order_id, 999, 1).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_multiply_quantities_and_line_totals() {
        let (db, order_id) = setup().await;
        let orders = db.orders();
        orders.add_product(order_id, 1, 1).await.unwrap();
        orders.add_product(order_id, 2, 2).await.unwrap();

        assert_eq!(orders.multiply_quantities(order_id, 3).await.unwrap(), 2);

        let lines = orders.order_lines(order_id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].title, "Book");
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].line_total_cents, 3000);
        assert_eq!(lines[1].quantity, 6);
        assert_eq!(lines[1].line_total_cents, 1500);
    }

    #[tokio::test]
    async fn test_delete_order_cascades_lines() {
        let (db, order_id) = setup().await;
        db.orders().add_product(order_id, 1, 1).await.unwrap();
        db.orders().add_product(order_id, 2, 1).await.unwrap();

        assert_eq!(db.orders().delete_order(order_id).await.unwrap(), 1);
        assert!(db.orders().order_products(order_id).await.unwrap().is_empty());
        assert_eq!(
            db.query_scalar_i64("SELECT COUNT(*) FROM order_products").await.unwrap(),
            Some(0)
        );
        assert_eq!(db.orders().delete_order(order_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_insert_orders_keeps_given_timestamps() {
        let db = memory_db().await;
        db.users().add_user(&NewUser::new(5, "Eve", "en")).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let inserted = db
            .orders()
            .bulk_insert_orders(&[NewOrder::new(5).created_at(at), NewOrder::new(5)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let history = db.orders().orders_for_user(5).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_at, at);
    }

    #[tokio::test]
    async fn test_bulk_upsert_order_products_replaces_quantity() {
        let (db, order_id) = setup().await;
        db.orders().add_product(order_id, 1, 4).await.unwrap();

        db.orders()
            .bulk_upsert_order_products(&[
                OrderProduct::new(order_id, 1, 9),
                OrderProduct::new(order_id, 2, 1),
            ])
            .await
            .unwrap();

        let lines = db.orders().order_products(order_id).await.unwrap();
        assert_eq!(
            lines,
            vec![OrderProduct::new(order_id, 1, 9), OrderProduct::new(order_id, 2, 1)]
        );
    }

    #[tokio::test]
    async fn test_transfer_orders_moves_everything() {
        let (db, _) = setup().await;
        db.orders().create_order(1).await.unwrap();

        assert_eq!(db.orders().transfer_orders(1, 2).await.unwrap(), 2);
        assert!(db.orders().orders_for_user(1).await.unwrap().is_empty());
        assert_eq!(db.orders().orders_for_user(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_to_missing_user_changes_nothing() {
        let (db, order_id) = setup().await;

        let err = db.orders().transfer_orders(1, 42).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound { ref entity, ref id } if entity == "User" && id == "42"
        ));

        let order = db.orders().get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.user_id, 1);
    }

    #[tokio::test]
    async fn test_transfer_rolls_back_when_update_fails() {
        let (db, order_id) = setup().await;
        db.execute_raw(
            "CREATE TRIGGER freeze_orders BEFORE UPDATE OF user_id ON orders \
             BEGIN SELECT RAISE(ABORT, 'orders frozen'); END;",
        )
        .await
        .unwrap();

        let err = db.orders().transfer_orders(1, 2).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));

        let order = db.orders().get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.user_id, 1);
        assert_eq!(db.orders().count().await.unwrap(), 1);
    }
}
