//! SQLite subscription store implementation

use async_trait::async_trait;
use news_digest_domain::{
    ChannelRef, DEFAULT_MAX_SUBSCRIPTIONS, PostId, StoreError, SubscriptionRow,
    SubscriptionStore, UserId,
};
use sqlx::{
    Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Rows whose channel no longer parses are skipped so one bad row cannot
/// stall every poll cycle
fn parse_channel(raw: &str) -> Option<ChannelRef> {
    match ChannelRef::parse(raw) {
        Ok(channel) => Some(channel),
        Err(e) => {
            tracing::warn!(channel = raw, error = %e, "Skipping corrupt subscription row");
            None
        }
    }
}

/// SQLite-backed subscription store
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
    max_subscriptions: usize,
}

impl SqliteSubscriptionStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self {
            pool,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self {
            pool,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Override the per-user subscription cap
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Liveness check used by `doctor`
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                cursor INTEGER NOT NULL DEFAULT 0,
                UNIQUE(channel, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_user
            ON subscriptions(user_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Open a transaction that takes the write lock before its first read
    ///
    /// Dropping the returned transaction without committing (a cancelled
    /// future, a failed COMMIT) rolls it back before the connection is reused.
    async fn begin_immediate(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(db_err)
    }

    /// Commit on success, roll back on failure, and hand the result through
    async fn finish<T>(
        tx: Transaction<'static, Sqlite>,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                tx.commit().await.map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_subscription(
        conn: &mut SqliteConnection,
        user: UserId,
        channel: &ChannelRef,
        max: usize,
    ) -> Result<(), StoreError> {
        let channel_url = channel.url();

        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE channel = ? AND user_id = ?")
                .bind(&channel_url)
                .bind(user.0)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err)?;
        if existing > 0 {
            return Err(StoreError::DuplicateSubscription(channel.clone()));
        }

        let (held,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = ?")
            .bind(user.0)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
        if held as usize >= max {
            return Err(StoreError::QuotaExceeded { max });
        }

        // New subscribers join at the channel's current position
        let (cursor,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(cursor), 0) FROM subscriptions WHERE channel = ?")
                .bind(&channel_url)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err)?;

        sqlx::query("INSERT INTO subscriptions (channel, user_id, cursor) VALUES (?, ?, ?)")
            .bind(&channel_url)
            .bind(user.0)
            .bind(cursor)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn update_cursor(
        conn: &mut SqliteConnection,
        channel: &ChannelRef,
        cursor: PostId,
    ) -> Result<(), StoreError> {
        let channel_url = channel.url();

        let (rows, current): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MAX(cursor) FROM subscriptions WHERE channel = ?")
                .bind(&channel_url)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err)?;

        let Some(current) = current.filter(|_| rows > 0) else {
            return Err(StoreError::NotFound(channel_url));
        };
        if cursor.0 < current {
            return Err(StoreError::CursorRegression {
                current: PostId(current),
                requested: cursor,
            });
        }

        sqlx::query("UPDATE subscriptions SET cursor = ? WHERE channel = ?")
            .bind(cursor.0)
            .bind(&channel_url)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn register_user(&self, user: UserId, at: OffsetDateTime) -> Result<(), StoreError> {
        let created_at = at
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?, ?)")
            .bind(user.0)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn add_subscription(&self, user: UserId, channel: &ChannelRef) -> Result<(), StoreError> {
        let mut tx = self.begin_immediate().await?;
        let result = Self::insert_subscription(&mut tx, user, channel, self.max_subscriptions).await;
        Self::finish(tx, result).await
    }

    async fn remove_subscription(
        &self,
        user: UserId,
        channel: &ChannelRef,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE channel = ? AND user_id = ?")
            .bind(channel.url())
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_subscriptions(&self, user: UserId) -> Result<Vec<ChannelRef>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT channel FROM subscriptions WHERE user_id = ? ORDER BY id")
                .bind(user.0)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(rows
            .iter()
            .filter_map(|(channel,)| parse_channel(channel))
            .collect())
    }

    async fn advance_cursor(&self, channel: &ChannelRef, cursor: PostId) -> Result<(), StoreError> {
        let mut tx = self.begin_immediate().await?;
        let result = Self::update_cursor(&mut tx, channel, cursor).await;
        Self::finish(tx, result).await
    }

    async fn snapshot_all_subscriptions(&self) -> Result<Vec<SubscriptionRow>, StoreError> {
        let rows: Vec<(String, i64, i64)> =
            sqlx::query_as("SELECT channel, user_id, cursor FROM subscriptions ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|(channel, user, cursor)| {
                Some(SubscriptionRow {
                    channel: parse_channel(&channel)?,
                    user: UserId(user),
                    cursor: PostId(cursor),
                })
            })
            .collect())
    }
}
