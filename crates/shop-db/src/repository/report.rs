//! # Report Repository
//!
//! Read-only aggregates across users, orders, and products.
//!
//! Order totals are always `SUM(quantity * price_cents)` over the order's
//! lines using the products' current prices. Orders without lines count
//! as zero; users without orders show up with zero counts where the report
//! is per user.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use shop_core::validation::validate_limit;
use shop_core::{
    OrderRunningTotal, OrderTotal, ProductSales, ReferralCount, UserOrderRank, UserSpending,
};

/// Per-order totals, reused by several reports.
const ORDER_SUMS_CTE: &str = r#"
    order_sums AS (
        SELECT
            o.order_id,
            o.user_id,
            o.created_at,
            COALESCE(SUM(op.quantity * p.price_cents), 0) AS total_cents
        FROM orders o
        LEFT JOIN order_products op ON op.order_id = o.order_id
        LEFT JOIN products p ON p.product_id = op.product_id
        GROUP BY o.order_id, o.user_id, o.created_at
    )
"#;

/// Repository for reporting queries.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Line count, item count, and total for every order.
    pub async fn order_totals(&self) -> DbResult<Vec<OrderTotal>> {
        let rows = sqlx::query_as::<_, OrderTotal>(
            r#"
            SELECT
                o.order_id,
                o.user_id,
                COUNT(op.product_id) AS line_count,
                COALESCE(SUM(op.quantity), 0) AS item_count,
                COALESCE(SUM(op.quantity * p.price_cents), 0) AS total_cents
            FROM orders o
            LEFT JOIN order_products op ON op.order_id = o.order_id
            LEFT JOIN products p ON p.product_id = op.product_id
            GROUP BY o.order_id, o.user_id
            ORDER BY o.order_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Computed order totals");
        Ok(rows)
    }

    /// Biggest spenders first. Every user appears, including those who
    /// never ordered.
    pub async fn user_spending(&self, limit: u32) -> DbResult<Vec<UserSpending>> {
        validate_limit(limit)?;

        let sql = format!(
            r#"
            WITH {ORDER_SUMS_CTE}
            SELECT
                u.user_id,
                u.full_name,
                COUNT(s.order_id) AS order_count,
                COALESCE(SUM(s.total_cents), 0) AS total_spent_cents
            FROM users u
            LEFT JOIN order_sums s ON s.user_id = u.user_id
            GROUP BY u.user_id, u.full_name
            ORDER BY total_spent_cents DESC, u.user_id
            LIMIT ?1
            "#
        );

        let rows = sqlx::query_as::<_, UserSpending>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Best-selling products by quantity. Ties share a rank and the next
    /// rank is skipped (`RANK()`). Products never sold are left out.
    pub async fn top_products(&self, limit: u32) -> DbResult<Vec<ProductSales>> {
        validate_limit(limit)?;

        let rows = sqlx::query_as::<_, ProductSales>(
            r#"
            WITH sales AS (
                SELECT
                    p.product_id,
                    p.title,
                    SUM(op.quantity) AS quantity_sold,
                    SUM(op.quantity * p.price_cents) AS revenue_cents
                FROM products p
                INNER JOIN order_products op ON op.product_id = p.product_id
                GROUP BY p.product_id, p.title
            )
            SELECT
                product_id,
                title,
                quantity_sold,
                revenue_cents,
                RANK() OVER (ORDER BY quantity_sold DESC) AS sales_rank
            FROM sales
            ORDER BY sales_rank, product_id
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Users by number of orders with `DENSE_RANK()`.
    pub async fn user_order_ranking(&self) -> DbResult<Vec<UserOrderRank>> {
        let rows = sqlx::query_as::<_, UserOrderRank>(
            r#"
            WITH counts AS (
                SELECT u.user_id, u.full_name, COUNT(o.order_id) AS order_count
                FROM users u
                LEFT JOIN orders o ON o.user_id = u.user_id
                GROUP BY u.user_id, u.full_name
            )
            SELECT
                user_id,
                full_name,
                order_count,
                DENSE_RANK() OVER (ORDER BY order_count DESC) AS order_rank
            FROM counts
            ORDER BY order_rank, user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// A user's orders oldest first, numbered, with a running total.
    pub async fn user_order_history(&self, user_id: i64) -> DbResult<Vec<OrderRunningTotal>> {
        let sql = format!(
            r#"
            WITH {ORDER_SUMS_CTE}
            SELECT
                order_id,
                created_at,
                ROW_NUMBER() OVER w AS order_number,
                total_cents AS order_total_cents,
                SUM(total_cents) OVER (w ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)
                    AS running_total_cents
            FROM order_sums
            WHERE user_id = ?1
            WINDOW w AS (ORDER BY created_at, order_id)
            ORDER BY order_number
            "#
        );

        let rows = sqlx::query_as::<_, OrderRunningTotal>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// How many users each referrer brought in, most first.
    pub async fn referral_counts(&self) -> DbResult<Vec<ReferralCount>> {
        let rows = sqlx::query_as::<_, ReferralCount>(
            r#"
            SELECT
                r.user_id AS referrer_id,
                r.full_name AS referrer_name,
                COUNT(u.user_id) AS referred_count
            FROM users r
            INNER JOIN users u ON u.referrer_id = r.user_id
            GROUP BY r.user_id, r.full_name
            ORDER BY referred_count DESC, r.user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sum over every order line. `0` when nothing was sold.
    pub async fn total_revenue(&self) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(op.quantity * p.price_cents), 0)
            FROM order_products op
            INNER JOIN products p ON p.product_id = op.product_id
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Mean order total in cents, empty orders counting as zero. `None`
    /// when there are no orders.
    pub async fn average_order_value(&self) -> DbResult<Option<f64>> {
        let sql = format!("WITH {ORDER_SUMS_CTE} SELECT AVG(total_cents) FROM order_sums");

        let avg: Option<f64> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;

        Ok(avg)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::memory_db;
    use crate::Database;
    use chrono::{TimeZone, Utc};
    use shop_core::{NewOrder, NewProduct, NewUser, OrderProduct};

    /// Alice (1) refers Bob (2) and Carol (3).
    /// Products: Book 1000, Pen 250.
    /// Orders: #1 Alice {Book x2, Pen x1} = 2250, #2 Alice {Pen x4} = 1000,
    /// #3 Bob {Book x1} = 1000. Carol has none.
    async fn populated() -> Database {
        let db = memory_db().await;
        db.users().add_user(&NewUser::new(1, "Alice", "en")).await.unwrap();
        db.users()
            .bulk_insert_users(&[
                NewUser::new(2, "Bob", "en").referrer(1),
                NewUser::new(3, "Carol", "de").referrer(1),
            ])
            .await
            .unwrap();
        db.products()
            .bulk_insert_products(&[NewProduct::new("Book", 1000), NewProduct::new("Pen", 250)])
            .await
            .unwrap();

        let day = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        db.orders()
            .bulk_insert_orders(&[
                NewOrder::new(1).created_at(day(1)),
                NewOrder::new(1).created_at(day(2)),
                NewOrder::new(2).created_at(day(3)),
            ])
            .await
            .unwrap();
        db.orders()
            .bulk_upsert_order_products(&[
                OrderProduct::new(1, 1, 2),
                OrderProduct::new(1, 2, 1),
                OrderProduct::new(2, 2, 4),
                OrderProduct::new(3, 1, 1),
            ])
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_reports_on_empty_database() {
        let db = memory_db().await;
        let reports = db.reports();

        assert!(reports.order_totals().await.unwrap().is_empty());
        assert!(reports.user_spending(10).await.unwrap().is_empty());
        assert!(reports.top_products(10).await.unwrap().is_empty());
        assert_eq!(reports.total_revenue().await.unwrap(), 0);
        assert_eq!(reports.average_order_value().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_order_totals() {
        let db = populated().await;
        let totals = db.reports().order_totals().await.unwrap();

        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].line_count, 2);
        assert_eq!(totals[0].item_count, 3);
        assert_eq!(totals[0].total_cents, 2250);
        assert_eq!(totals[2].user_id, 2);
        assert_eq!(totals[2].total_cents, 1000);
    }

    #[tokio::test]
    async fn test_empty_order_totals_zero() {
        let db = populated().await;
        let empty = db.orders().create_order(3).await.unwrap();

        let totals = db.reports().order_totals().await.unwrap();
        let row = totals.iter().find(|t| t.order_id == empty.order_id).unwrap();
        assert_eq!((row.line_count, row.item_count, row.total_cents), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_user_spending_includes_users_without_orders() {
        let db = populated().await;
        let spending = db.reports().user_spending(10).await.unwrap();

        let summary: Vec<_> = spending
            .iter()
            .map(|s| (s.user_id, s.order_count, s.total_spent_cents))
            .collect();
        assert_eq!(summary, vec![(1, 2, 3250), (2, 1, 1000), (3, 0, 0)]);

        assert_eq!(db.reports().user_spending(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_products_ranked_by_quantity() {
        let db = populated().await;
        let top = db.reports().top_products(10).await.unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!((top[0].title.as_str(), top[0].quantity_sold, top[0].sales_rank), ("Pen", 5, 1));
        assert_eq!(top[0].revenue_cents, 1250);
        assert_eq!(
            (top[1].title.as_str(), top[1].quantity_sold, top[1].sales_rank),
            ("Book", 3, 2)
        );
    }

    #[tokio::test]
    async fn test_top_products_ties_share_rank() {
        let db = populated().await;
        // Book: 2 + 1 + 2 = 5, same as Pen.
        db.orders().add_product(3, 1, 2).await.unwrap();

        let top = db.reports().top_products(10).await.unwrap();
        assert!(top.iter().all(|p| p.sales_rank == 1));
    }

    #[tokio::test]
    async fn test_user_order_ranking_is_dense() {
        let db = populated().await;
        db.orders().create_order(2).await.unwrap();

        let ranking = db.reports().user_order_ranking().await.unwrap();
        let ranks: Vec<_> = ranking
            .iter()
            .map(|r| (r.user_id, r.order_count, r.order_rank))
            .collect();
        assert_eq!(ranks, vec![(1, 2, 1), (2, 2, 1), (3, 0, 2)]);
    }

    #[tokio::test]
    async fn test_user_order_history_running_total() {
        let db = populated().await;
        let history = db.reports().user_order_history(1).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].order_number, 1);
        assert_eq!(history[0].order_total_cents, 2250);
        assert_eq!(history[0].running_total_cents, 2250);
        assert_eq!(history[1].order_number, 2);
        assert_eq!(history[1].running_total_cents, 3250);

        assert!(db.reports().user_order_history(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_referral_counts() {
        let db = populated().await;
        let counts = db.reports().referral_counts().await.unwrap();

        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].referrer_name, "Alice");
        assert_eq!(counts[0].referred_count, 2);
    }

    #[tokio::test]
    async fn test_revenue_and_average() {
        let db = populated().await;

        assert_eq!(db.reports().total_revenue().await.unwrap(), 4250);

        let avg = db.reports().average_order_value().await.unwrap().unwrap();
        assert!((avg - 4250.0 / 3.0).abs() < 1e-9);
    }
}
