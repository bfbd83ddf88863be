//! # User Repository
//!
//! Database operations for users and the self-referencing referral link.
//!
//! ## Upsert-by-key
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_user(NewUser { user_id: 1, full_name: "John", .. })               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO users (...) VALUES (...)                                  │
//! │  ON CONFLICT (user_id) DO UPDATE SET full_name = excluded.full_name,   │
//! │                                      ...,                              │
//! │                                      updated_at = excluded.updated_at  │
//! │  RETURNING *                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Exactly one row for user_id 1; created_at kept from the first insert  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Referrals
//! `referrer_id` points back into `users` with `ON DELETE SET NULL`: deleting
//! a referrer leaves the referred users in place with no referrer. Cycles
//! (A refers B, B refers A) are not prevented.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::bulk_insert;
use shop_core::filter::like_contains;
use shop_core::validation::{validate_language_code, validate_limit, validate_username};
use shop_core::{LanguageCount, NewUser, ReferralRow, User, UserFilter};

const USER_COLUMNS: &str =
    "user_id, full_name, username, language_code, referrer_id, created_at, updated_at";

const UPSERT_USER_TAIL: &str = "ON CONFLICT (user_id) DO UPDATE SET \
     full_name = excluded.full_name, \
     username = excluded.username, \
     language_code = excluded.language_code, \
     referrer_id = excluded.referrer_id, \
     updated_at = excluded.updated_at";

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a user, or overwrites the existing row with the same `user_id`.
    ///
    /// ## Returns
    /// The row as stored after the statement.
    ///
    /// ## Errors
    /// * `DbError::Validation` - blank name, bad language tag, etc.
    /// * `DbError::ForeignKeyViolation` - `referrer_id` names an unknown user
    pub async fn add_user(&self, user: &NewUser) -> DbResult<User> {
        user.validate()?;

        debug!(user_id = user.user_id, "Upserting user");

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
             {UPSERT_USER_TAIL} RETURNING {USER_COLUMNS}"
        );

        let stored = sqlx::query_as::<_, User>(&sql)
            .bind(user.user_id)
            .bind(&user.full_name)
            .bind(&user.username)
            .bind(&user.language_code)
            .bind(user.referrer_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    /// Gets a user by primary key.
    ///
    /// ## Returns
    /// * `Ok(Some(User))` - User found
    /// * `Ok(None)` - User not found
    pub async fn get_user(&self, user_id: i64) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Gets the first user (lowest id) with the given handle.
    pub async fn get_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 ORDER BY user_id LIMIT 1"
        );

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Filtered, sorted scan over users.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let english = db.users()
    ///     .list_users(&UserFilter::default().language("en").limit(20))
    ///     .await?;
    /// ```
    pub async fn list_users(&self, filter: &UserFilter) -> DbResult<Vec<User>> {
        filter.validate()?;

        debug!(?filter, "Listing users");

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));

        if let Some(code) = &filter.language_code {
            builder.push(" AND language_code = ").push_bind(code.clone());
        }
        if let Some(fragment) = &filter.name_contains {
            builder
                .push(" AND full_name LIKE ")
                .push_bind(like_contains(fragment))
                .push(" ESCAPE '\\'");
        }
        if let Some(after) = filter.created_after {
            builder.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            builder.push(" AND created_at < ").push_bind(before);
        }
        match filter.has_referrer {
            Some(true) => {
                builder.push(" AND referrer_id IS NOT NULL");
            }
            Some(false) => {
                builder.push(" AND referrer_id IS NULL");
            }
            None => {}
        }

        builder
            .push(" ORDER BY ")
            .push(filter.order.as_sql())
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit));

        let users = builder.build_query_as::<User>().fetch_all(&self.pool).await?;

        debug!(count = users.len(), "User scan returned rows");
        Ok(users)
    }

    /// Substring search over `full_name` and `username`.
    ///
    /// ASCII letters match regardless of case. Other scripts match their
    /// exact case, as SQLite's `LIKE` folds ASCII only.
    pub async fn search_users(&self, fragment: &str, limit: u32) -> DbResult<Vec<User>> {
        validate_limit(limit)?;

        let sql = format!(
            r"SELECT {USER_COLUMNS} FROM users
              WHERE full_name LIKE ?1 ESCAPE '\' OR username LIKE ?1 ESCAPE '\'
              ORDER BY full_name, user_id
              LIMIT ?2"
        );

        let users = sqlx::query_as::<_, User>(&sql)
            .bind(like_contains(fragment.trim()))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    /// Users whose referrer is `referrer_id`, by id.
    pub async fn referred_users(&self, referrer_id: i64) -> DbResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE referrer_id = ?1 ORDER BY user_id"
        );

        let users = sqlx::query_as::<_, User>(&sql)
            .bind(referrer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    /// Every referred user next to their referrer's name (self-join).
    pub async fn users_with_referrers(&self) -> DbResult<Vec<ReferralRow>> {
        let rows = sqlx::query_as::<_, ReferralRow>(
            r#"
            SELECT
                u.user_id,
                u.full_name,
                r.user_id AS referrer_id,
                r.full_name AS referrer_name
            FROM users u
            INNER JOIN users r ON r.user_id = u.referrer_id
            ORDER BY u.user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sets or clears the handle. Returns rows affected (0 if the user is missing).
    pub async fn update_username(&self, user_id: i64, username: Option<&str>) -> DbResult<u64> {
        validate_username(username)?;

        debug!(user_id, ?username, "Updating username");

        let result = sqlx::query(
            "UPDATE users SET username = ?2, updated_at = ?3 WHERE user_id = ?1",
        )
        .bind(user_id)
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Changes the language tag. Returns rows affected.
    pub async fn update_language(&self, user_id: i64, language_code: &str) -> DbResult<u64> {
        validate_language_code(language_code)?;

        debug!(user_id, language_code, "Updating language");

        let result = sqlx::query(
            "UPDATE users SET language_code = ?2, updated_at = ?3 WHERE user_id = ?1",
        )
        .bind(user_id)
        .bind(language_code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sets or clears the referrer. Returns rows affected.
    ///
    /// ## Errors
    /// * `DbError::ForeignKeyViolation` - the referrer doesn't exist
    pub async fn set_referrer(&self, user_id: i64, referrer_id: Option<i64>) -> DbResult<u64> {
        debug!(user_id, ?referrer_id, "Setting referrer");

        let result = sqlx::query(
            "UPDATE users SET referrer_id = ?2, updated_at = ?3 WHERE user_id = ?1",
        )
        .bind(user_id)
        .bind(referrer_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes a user.
    ///
    /// The user's orders (and their lines) are removed by cascade; users they
    /// referred keep their rows with `referrer_id` set to NULL.
    pub async fn delete_user(&self, user_id: i64) -> DbResult<u64> {
        debug!(user_id, "Deleting user");

        let result = sqlx::query("DELETE FROM users WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Inserts all users in one transaction. Any existing key fails the whole batch.
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - a `user_id` already exists (nothing is inserted)
    pub async fn bulk_insert_users(&self, users: &[NewUser]) -> DbResult<u64> {
        self.bulk_write(users, None).await
    }

    /// Upserts all users in one transaction.
    pub async fn bulk_upsert_users(&self, users: &[NewUser]) -> DbResult<u64> {
        self.bulk_write(users, Some(UPSERT_USER_TAIL)).await
    }

    async fn bulk_write(&self, users: &[NewUser], conflict_tail: Option<&str>) -> DbResult<u64> {
        for user in users {
            user.validate()?;
        }

        debug!(count = users.len(), upsert = conflict_tail.is_some(), "Bulk writing users");

        let now = Utc::now();
        bulk_insert(
            &self.pool,
            users,
            &format!("INSERT INTO users ({USER_COLUMNS}) "),
            conflict_tail,
            |mut row, user| {
                row.push_bind(user.user_id)
                    .push_bind(&user.full_name)
                    .push_bind(&user.username)
                    .push_bind(&user.language_code)
                    .push_bind(user.referrer_id)
                    .push_bind(now)
                    .push_bind(now);
            },
        )
        .await
    }

    /// Counts all users.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Number of users per language tag, largest group first.
    pub async fn count_by_language(&self) -> DbResult<Vec<LanguageCount>> {
        let rows = sqlx::query_as::<_, LanguageCount>(
            r#"
            SELECT language_code, COUNT(*) AS user_count
            FROM users
            GROUP BY language_code
            ORDER BY user_count DESC, language_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::test_support::memory_db;
    use chrono::Duration;
    use shop_core::UserOrder;

    fn john() -> NewUser {
        NewUser::new(1, "John Doe", "en").username("johnny")
    }

    #[tokio::test]
    async fn test_add_user_then_get() {
        let db = memory_db().await;
        let users = db.users();

        let stored = users.add_user(&john()).await.unwrap();
        assert_eq!(stored.user_id, 1);
        assert_eq!(stored.username.as_deref(), Some("johnny"));
        assert_eq!(stored.referrer_id, None);

        let fetched = users.get_user(1).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_get_missing_user_is_none() {
        let db = memory_db().await;
        assert!(db.users().get_user(404).await.unwrap().is_none());
        assert!(db.users().get_user_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_same_key_twice_keeps_one_row_with_latest_values() {
        let db = memory_db().await;
        let users = db.users();

        let first = users.add_user(&john()).await.unwrap();
        let second = users
            .add_user(&NewUser::new(1, "Johnathan Doe", "uk"))
            .await
            .unwrap();

        assert_eq!(users.count().await.unwrap(), 1);
        assert_eq!(second.full_name, "Johnathan Doe");
        assert_eq!(second.language_code, "uk");
        assert_eq!(second.username, None);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_add_user_rejects_unknown_referrer() {
        let db = memory_db().await;
        let err = db
            .users()
            .add_user(&NewUser::new(2, "Jane", "en").referrer(99))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
        assert_eq!(db.users().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_user_validates_before_sql() {
        let db = memory_db().await;
        let err = db
            .users()
            .add_user(&NewUser::new(3, "", "en"))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_users_filters_and_orders() {
        let db = memory_db().await;
        let users = db.users();
        users
            .bulk_insert_users(&[
                NewUser::new(1, "Carol Smith", "en"),
                NewUser::new(2, "alice smith", "en").referrer(1),
                NewUser::new(3, "Bob Jones", "de"),
            ])
            .await
            .unwrap();

        let english = users
            .list_users(&UserFilter::default().language("en").order(UserOrder::NameAsc))
            .await
            .unwrap();
        let names: Vec<_> = english.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, vec!["Carol Smith", "alice smith"]);

        let smiths = users
            .list_users(&UserFilter::default().name_contains("SMITH").order(UserOrder::IdAsc))
            .await
            .unwrap();
        assert_eq!(smiths.len(), 2);

        let referred = users
            .list_users(&UserFilter::default().has_referrer(true))
            .await
            .unwrap();
        assert_eq!(referred.len(), 1);
        assert_eq!(referred[0].user_id, 2);

        let limited = users
            .list_users(&UserFilter::default().order(UserOrder::IdAsc).limit(2))
            .await
            .unwrap();
        assert_eq!(limited.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_list_users_like_wildcards_are_literal() {
        let db = memory_db().await;
        db.users()
            .bulk_insert_users(&[
                NewUser::new(1, "100% Real", "en"),
                NewUser::new(2, "1000 Real", "en"),
            ])
            .await
            .unwrap();

        let found = db
            .users()
            .list_users(&UserFilter::default().name_contains("0%"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_search_users_matches_username() {
        let db = memory_db().await;
        db.users().add_user(&john()).await.unwrap();
        db.users().add_user(&NewUser::new(2, "Jane Roe", "en")).await.unwrap();

        let found = db.users().search_users("JOHNN", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_search_users_folds_ascii_case_only() {
        let db = memory_db().await;
        db.users().add_user(&NewUser::new(1, "Жанна Doe", "uk")).await.unwrap();

        assert_eq!(db.users().search_users("dOE", 10).await.unwrap().len(), 1);
        assert_eq!(db.users().search_users("Жан", 10).await.unwrap().len(), 1);
        assert!(db.users().search_users("жан", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_users_created_between() {
        let db = memory_db().await;
        db.users().add_user(&john()).await.unwrap();
        let now = Utc::now();

        let inside = UserFilter::default()
            .created_between(now - Duration::hours(1), now + Duration::hours(1));
        let found = db.users().list_users(&inside).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, 1);

        let earlier = UserFilter::default()
            .created_between(now - Duration::days(2), now - Duration::days(1));
        assert!(db.users().list_users(&earlier).await.unwrap().is_empty());

        let later = UserFilter::default()
            .created_between(now + Duration::hours(1), now + Duration::days(1));
        assert!(db.users().list_users(&later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_referral_self_join() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&NewUser::new(1, "Referrer", "en")).await.unwrap();
        users.add_user(&NewUser::new(2, "Invitee A", "en").referrer(1)).await.unwrap();
        users.add_user(&NewUser::new(3, "Invitee B", "en").referrer(1)).await.unwrap();

        let rows = users.users_with_referrers().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.referrer_name == "Referrer"));

        let referred = users.referred_users(1).await.unwrap();
        assert_eq!(referred.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_referrer_cycle_is_allowed() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&NewUser::new(1, "A", "en")).await.unwrap();
        users.add_user(&NewUser::new(2, "B", "en").referrer(1)).await.unwrap();

        assert_eq!(users.set_referrer(1, Some(2)).await.unwrap(), 1);
        assert_eq!(users.get_user(1).await.unwrap().unwrap().referrer_id, Some(2));
    }

    #[tokio::test]
    async fn test_delete_user_nulls_referrals() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&NewUser::new(1, "Referrer", "en")).await.unwrap();
        users.add_user(&NewUser::new(2, "Invitee", "en").referrer(1)).await.unwrap();

        assert_eq!(users.delete_user(1).await.unwrap(), 1);

        let invitee = users.get_user(2).await.unwrap().unwrap();
        assert_eq!(invitee.referrer_id, None);
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_cascades_orders() {
        let db = memory_db().await;
        db.users().add_user(&john()).await.unwrap();
        let order = db.orders().create_order(1).await.unwrap();

        db.users().delete_user(1).await.unwrap();

        assert!(db.orders().get_order(order.order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_updates_return_row_counts() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&john()).await.unwrap();

        assert_eq!(users.update_username(1, Some("jd")).await.unwrap(), 1);
        assert_eq!(users.update_language(1, "fr").await.unwrap(), 1);
        assert_eq!(users.update_language(404, "fr").await.unwrap(), 0);

        let user = users.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("jd"));
        assert_eq!(user.language_code, "fr");

        assert_eq!(users.update_username(1, None).await.unwrap(), 1);
        assert!(users.get_user(1).await.unwrap().unwrap().username.is_none());
    }

    #[tokio::test]
    async fn test_bulk_insert_increases_count_by_n() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&john()).await.unwrap();

        let batch: Vec<NewUser> = (10..20)
            .map(|id| NewUser::new(id, format!("User {id}"), "en"))
            .collect();

        assert_eq!(users.bulk_insert_users(&batch).await.unwrap(), 10);
        assert_eq!(users.count().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&john()).await.unwrap();

        let batch = vec![
            NewUser::new(2, "Fresh", "en"),
            NewUser::new(1, "Clash", "en"),
        ];

        let err = users.bulk_insert_users(&batch).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(users.count().await.unwrap(), 1);
        assert!(users.get_user(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_insert_spans_multiple_chunks() {
        let db = memory_db().await;
        let batch: Vec<NewUser> = (1..=1200)
            .map(|id| NewUser::new(id, format!("User {id}"), "en"))
            .collect();

        assert_eq!(db.users().bulk_insert_users(&batch).await.unwrap(), 1200);
        assert_eq!(db.users().count().await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_bulk_upsert_overwrites_existing() {
        let db = memory_db().await;
        let users = db.users();
        users.add_user(&john()).await.unwrap();

        let affected = users
            .bulk_upsert_users(&[
                NewUser::new(1, "John Renamed", "en"),
                NewUser::new(2, "Jane", "en"),
            ])
            .await
            .unwrap();

        assert_eq!(affected, 2);
        assert_eq!(users.count().await.unwrap(), 2);
        assert_eq!(users.get_user(1).await.unwrap().unwrap().full_name, "John Renamed");
    }

    #[tokio::test]
    async fn test_bulk_insert_empty_slice() {
        let db = memory_db().await;
        assert_eq!(db.users().bulk_insert_users(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_by_language() {
        let db = memory_db().await;
        db.users()
            .bulk_insert_users(&[
                NewUser::new(1, "A", "en"),
                NewUser::new(2, "B", "en"),
                NewUser::new(3, "C", "de"),
            ])
            .await
            .unwrap();

        let counts = db.users().count_by_language().await.unwrap();
        assert_eq!(counts[0], LanguageCount { language_code: "en".to_string(), user_count: 2 });
        assert_eq!(counts[1].language_code, "de");
    }
}
