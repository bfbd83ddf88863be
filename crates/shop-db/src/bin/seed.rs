//! # Seed Data Generator
//!
//! Replaces the contents of the database with reproducible fake data.
//!
//! ## Usage
//! ```bash
//! # Defaults: seed 42, 10 base users, 10 referred users, 10 products, 10 orders
//! cargo run -p shop-db --bin seed
//!
//! # Bigger data set into a specific file
//! cargo run -p shop-db --bin seed -- --db ./data/shop.db --users 500 --orders 2000
//!
//! # Database path from the environment (or .env)
//! SHOP_DATABASE_PATH=./dev.db cargo run -p shop-db --bin seed
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use shop_db::{seed_fake_data, Database, DbConfig, SeedPlan};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fill the shop database with fake users, products, and orders.
#[derive(Parser, Debug)]
#[command(name = "seed", version, about)]
struct Args {
    /// Database file path. Overrides SHOP_DATABASE_PATH.
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// RNG seed; the same seed produces the same data.
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Users without a referrer.
    #[arg(long, default_value_t = 10)]
    users: usize,

    /// Users referred by an earlier user.
    #[arg(long, default_value_t = 10)]
    referred: usize,

    #[arg(long, default_value_t = 10)]
    products: usize,

    #[arg(long, default_value_t = 10)]
    orders: usize,

    /// Upper bound on distinct products per order.
    #[arg(long, default_value_t = 3)]
    max_lines: usize,

    /// Upper bound on the quantity of each order line.
    #[arg(long, default_value_t = 5)]
    max_quantity: i64,
}

impl Args {
    fn plan(&self) -> SeedPlan {
        SeedPlan {
            seed: self.seed,
            base_users: self.users,
            referred_users: self.referred,
            products: self.products,
            orders: self.orders,
            max_lines_per_order: self.max_lines,
            max_quantity: self.max_quantity,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    let mut config = DbConfig::from_env().context("reading database configuration")?;
    if let Some(path) = &args.db {
        config.database_path = path.clone();
    }

    println!("Shop Seed Data Generator");
    println!("========================");
    println!("Database: {}", config.database_path.display());
    println!();

    let db = Database::new(config)
        .await
        .context("opening database")?;

    let start = Instant::now();
    let summary = seed_fake_data(&db, &args.plan())
        .await
        .context("seeding fake data")?;
    let elapsed = start.elapsed();

    info!(?elapsed, "Seed finished");

    println!("✓ Users:          {}", summary.users);
    println!("✓ Referred users: {}", summary.referred_users);
    println!("✓ Products:       {}", summary.products);
    println!("✓ Orders:         {}", summary.orders);
    println!("✓ Order lines:    {}", summary.order_lines);
    println!();
    println!("✓ Seed complete in {:?}", elapsed);

    db.close().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shop_db=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
