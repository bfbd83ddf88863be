//! # Query Demo
//!
//! Seeds a database and prints the output of every query family as JSON.
//!
//! ## Usage
//! ```bash
//! # Private in-memory database
//! cargo run -p shop-db --bin demo
//!
//! # Against a file (its contents are replaced)
//! cargo run -p shop-db --bin demo -- --db ./demo.db --seed 7
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use shop_core::{NewUser, ProductFilter, ProductOrder, UserFilter, UserOrder};
use shop_db::migrations::migration_status;
use shop_db::{seed_fake_data, Database, DbConfig, SeedPlan};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "demo", version, about = "Print every shop query against seeded data")]
struct Args {
    /// Database file. Defaults to a private in-memory database.
    #[arg(short, long)]
    db: Option<PathBuf>,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = match &args.db {
        Some(path) => DbConfig::new(path),
        None => DbConfig::in_memory(),
    };

    let db = Database::new(config).await.context("opening database")?;

    let (total, applied) = migration_status(db.pool()).await?;
    print_section("migrations", &serde_json::json!({ "total": total, "applied": applied }))?;

    let plan = SeedPlan {
        seed: args.seed,
        ..SeedPlan::default()
    };
    let summary = seed_fake_data(&db, &plan).await.context("seeding")?;
    print_section("seed summary", &summary)?;

    users(&db).await?;
    products(&db).await?;
    orders(&db).await?;
    reports(&db).await?;

    print_section(
        "raw SQL: users with a username",
        &db.query_scalar_i64("SELECT COUNT(*) FROM users WHERE username IS NOT NULL")
            .await?,
    )?;

    db.close().await;
    Ok(())
}

async fn users(db: &Database) -> anyhow::Result<()> {
    let users = db.users();

    print_section(
        "users: newest five",
        &users
            .list_users(&UserFilter::default().order(UserOrder::NewestFirst).limit(5))
            .await?,
    )?;
    print_section(
        "users: english speakers with a referrer",
        &users
            .list_users(&UserFilter::default().language("en").has_referrer(true))
            .await?,
    )?;
    print_section("users: search 'an'", &users.search_users("an", 5).await?)?;
    print_section("users: referred by user 1", &users.referred_users(1).await?)?;
    print_section("users: with referrers", &users.users_with_referrers().await?)?;
    print_section("users: per language", &users.count_by_language().await?)?;

    let upserted = users
        .add_user(&NewUser::new(1, "John Doe", "en").username("johnny"))
        .await?;
    print_section("users: upsert user 1", &upserted)?;
    print_section("users: by username", &users.get_user_by_username("johnny").await?)?;
    print_section("users: count", &users.count().await?)?;

    Ok(())
}

async fn products(db: &Database) -> anyhow::Result<()> {
    let products = db.products();

    print_section(
        "products: most expensive three",
        &products
            .list_products(&ProductFilter::default().order(ProductOrder::PriceDesc).limit(3))
            .await?,
    )?;
    print_section("products: price stats", &products.price_stats().await?)?;

    products.apply_price_change(1, 1000).await?;
    print_section("products: #1 after +10%", &products.get_product(1).await?)?;

    Ok(())
}

async fn orders(db: &Database) -> anyhow::Result<()> {
    let orders = db.orders();

    print_section("orders: lines of order 1", &orders.order_lines(1).await?)?;

    orders.add_product(1, 1, 2).await?;
    orders.multiply_quantities(1, 2).await?;
    print_section("orders: order 1 after add + double", &orders.order_products(1).await?)?;

    let Some(order) = orders.get_order(1).await? else {
        return Ok(());
    };
    let target = if order.user_id == 1 { 2 } else { 1 };
    let moved = orders.transfer_orders(order.user_id, target).await?;
    print_section(
        "orders: transfer",
        &serde_json::json!({ "from": order.user_id, "to": target, "moved": moved }),
    )?;
    print_section("orders: now owned by target", &orders.orders_for_user(target).await?)?;

    Ok(())
}

async fn reports(db: &Database) -> anyhow::Result<()> {
    let reports = db.reports();

    print_section("reports: order totals", &reports.order_totals().await?)?;
    print_section("reports: top spenders", &reports.user_spending(5).await?)?;
    print_section("reports: top products", &reports.top_products(5).await?)?;
    print_section("reports: order ranking", &reports.user_order_ranking().await?)?;
    print_section("reports: history of user 1", &reports.user_order_history(1).await?)?;
    print_section("reports: referral counts", &reports.referral_counts().await?)?;
    print_section("reports: total revenue (cents)", &reports.total_revenue().await?)?;
    print_section("reports: average order value", &reports.average_order_value().await?)?;

    Ok(())
}

fn print_section<T: Serialize + ?Sized>(title: &str, value: &T) -> anyhow::Result<()> {
    println!("== {title} ==");
    println!("{}", serde_json::to_string_pretty(value)?);
    println!();
    Ok(())
}
