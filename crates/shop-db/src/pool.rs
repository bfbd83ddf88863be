//! # Database Pool Management
//!
//! Connection pool creation, configuration, and the [`Database`] handle that
//! plays the session-scoped "repo" role.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Process start                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::from_env() ← .env + SHOP_* variables (read once)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.users() / db.products() / db.orders() / db.reports()               │
//! │       │                                                                 │
//! │       │ each method: one statement (or one transaction)                │
//! │       ▼                                                                 │
//! │  SQLite (foreign keys ON)                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::report::ReportRepository;
use crate::repository::user::UserRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Environment variable naming the SQLite file (`:memory:` for a private in-memory db).
pub const ENV_DATABASE_PATH: &str = "SHOP_DATABASE_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "SHOP_DB_MAX_CONNECTIONS";
pub const ENV_MIN_CONNECTIONS: &str = "SHOP_DB_MIN_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "SHOP_DB_CONNECT_TIMEOUT_SECS";
pub const ENV_RUN_MIGRATIONS: &str = "SHOP_DB_RUN_MIGRATIONS";

const DEFAULT_DATABASE_PATH: &str = "./shop.db";
const IN_MEMORY_PATH: &str = ":memory:";

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/shop.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections forever.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Maximum lifetime of a pooled connection. `None` keeps connections forever.
    /// Default: 30 minutes
    pub max_lifetime: Option<Duration>,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The database lives as long as its single connection, so that
    /// connection is never expired by the pool.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            run_migrations: true,
        }
    }

    /// True when this configuration points at a private in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory (if any) is loaded first.
    /// Unset variables fall back to [`DbConfig::new`] defaults with the path
    /// `./shop.db`.
    ///
    /// ## Variables
    /// | Variable | Default |
    /// |---|---|
    /// | `SHOP_DATABASE_PATH` | `./shop.db` |
    /// | `SHOP_DB_MAX_CONNECTIONS` | `5` |
    /// | `SHOP_DB_MIN_CONNECTIONS` | `1` |
    /// | `SHOP_DB_CONNECT_TIMEOUT_SECS` | `30` |
    /// | `SHOP_DB_RUN_MIGRATIONS` | `true` |
    pub fn from_env() -> DbResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(ENV_DATABASE_PATH).unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let mut config = if path == IN_MEMORY_PATH {
            DbConfig::in_memory()
        } else {
            DbConfig::new(path)
        };

        if let Some(max) = parse_var::<u32, _>(&lookup, ENV_MAX_CONNECTIONS)? {
            config.max_connections = max;
        }
        if let Some(min) = parse_var::<u32, _>(&lookup, ENV_MIN_CONNECTIONS)? {
            config.min_connections = min;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_CONNECT_TIMEOUT_SECS)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(run) = parse_var::<bool, _>(&lookup, ENV_RUN_MIGRATIONS)? {
            config.run_migrations = run;
        }

        if config.min_connections > config.max_connections {
            return Err(DbError::InvalidConfig {
                key: ENV_MIN_CONNECTIONS.to_string(),
                value: config.min_connections.to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> DbResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DbError::InvalidConfig {
                key: key.to_string(),
                value: raw,
            }),
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cloning is cheap (the pool is reference counted); every repository
/// handed out shares the same pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::from_env()?).await?;
///
/// let user = db.users().add_user(&NewUser::new(1, "John Doe", "en")).await?;
/// let order = db.orders().create_order(user.user_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for file databases
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled (cascade/restrict/set-null depend on it)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            in_memory = config.is_in_memory(),
            "Initializing database connection"
        );

        let base_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        };

        let connect_options = base_options
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has foreign keys disabled by default for backwards compatibility
            .foreign_keys(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the user repository.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Returns the product repository.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Returns the order repository.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    /// Returns the report (joined aggregate) repository.
    pub fn reports(&self) -> ReportRepository {
        ReportRepository::new(self.pool.clone())
    }

    /// Executes one or more raw SQL statements without parameters.
    ///
    /// ## Returns
    /// Total rows affected across all statements.
    pub async fn execute_raw(&self, sql: &str) -> DbResult<u64> {
        debug!(sql = %sql, "Executing raw SQL");
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Runs a raw query and returns the first column of the first row as an
    /// integer. `None` when there is no row or the value is NULL.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let n = db.query_scalar_i64("SELECT COUNT(*) FROM users").await?;
    /// ```
    pub async fn query_scalar_i64(&self, sql: &str) -> DbResult<Option<i64>> {
        debug!(sql = %sql, "Running raw scalar query");
        let value: Option<Option<i64>> = sqlx::query_scalar(sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.flatten())
    }

    /// Deletes every row from all four tables and resets generated ids.
    ///
    /// Runs in one transaction, children first, so foreign keys are never
    /// violated mid-way.
    pub async fn truncate_all(&self) -> DbResult<()> {
        info!("Truncating all tables");

        let mut tx = self.pool.begin().await?;
        for table in ["order_products", "orders", "products", "users"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM sqlite_sequence WHERE name IN ('products', 'orders')")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
