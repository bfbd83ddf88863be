//! # Repository Module
//!
//! Database repository implementations for the shop schema.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller                                                                │
//! │       │  db.users().add_user(&new_user)                                │
//! │       ▼                                                                 │
//! │  UserRepository / ProductRepository / OrderRepository                  │
//! │  ├── point reads      (Option<T>)                                      │
//! │  ├── filtered scans   (Vec<T>)                                         │
//! │  ├── upserts          (T, exactly one row per key afterwards)          │
//! │  ├── updates/deletes  (rows affected)                                  │
//! │  └── bulk writes      (rows affected, one transaction)                 │
//! │                                                                         │
//! │  ReportRepository                                                      │
//! │  └── joined aggregates and window functions                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`UserRepository`](user::UserRepository) - Users, referrals, upserts
//! - [`ProductRepository`](product::ProductRepository) - Catalog and price changes
//! - [`OrderRepository`](order::OrderRepository) - Orders, order lines, ownership transfer
//! - [`ReportRepository`](report::ReportRepository) - Aggregates and rankings

use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

pub mod order;
pub mod product;
pub mod report;
pub mod user;

/// Rows per `INSERT` statement in bulk writes. Keeps every statement well
/// under SQLite's bound-parameter limit.
pub(crate) const BULK_CHUNK_ROWS: usize = 500;

/// Inserts `rows` with multi-row `INSERT ... VALUES` statements inside a
/// single transaction.
///
/// `insert_head` is everything up to `VALUES` (e.g. `INSERT INTO t (a, b) `),
/// `conflict_tail` an optional `ON CONFLICT ...` clause. Either every row is
/// written or, on the first error, none are.
pub(crate) async fn bulk_insert<'a, T, F>(
    pool: &SqlitePool,
    rows: &'a [T],
    insert_head: &str,
    conflict_tail: Option<&str>,
    mut push_row: F,
) -> DbResult<u64>
where
    F: FnMut(Separated<'_, 'a, Sqlite, &'static str>, &'a T),
{
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut affected = 0;

    for chunk in rows.chunks(BULK_CHUNK_ROWS) {
        let mut builder: QueryBuilder<'a, Sqlite> = QueryBuilder::new(insert_head);
        builder.push_values(chunk, &mut push_row);
        if let Some(tail) = conflict_tail {
            builder.push(" ");
            builder.push(tail);
        }

        affected += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    debug!(rows = rows.len(), affected, "Bulk write committed");
    Ok(affected)
}
