//! SQLite usage-event store.
//!
//! Events are stored as JSON documents with the queried columns pulled out
//! alongside them.

use aceflow_core::{EventQuery, UsageEvent};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;

use crate::trait_::{EventStore, Result};

/// SQLite-backed event store.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: sqlx::SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) the database at `db_url`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let options = db_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open (or create) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS usage_events (
                event_id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                user_id TEXT,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_usage_events_timestamp ON usage_events(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp_key(time: &aceflow_core::Time) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn save_event(&mut self, event: &UsageEvent) -> Result<()> {
        let data = serde_json::to_string(event)?;

        sqlx::query(
            "INSERT OR REPLACE INTO usage_events (event_id, event_type, timestamp, user_id, data)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.event_id.to_string())
        .bind(event.event_type.as_str())
        .bind(timestamp_key(&event.timestamp))
        .bind(event.user_id.as_deref())
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_events(&self, query: &EventQuery) -> Result<Vec<UsageEvent>> {
        let mut sql: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT data FROM usage_events WHERE 1 = 1");
        if let Some(start) = &query.start {
            sql.push(" AND timestamp >= ").push_bind(timestamp_key(start));
        }
        if let Some(end) = &query.end {
            sql.push(" AND timestamp <= ").push_bind(timestamp_key(end));
        }
        if let Some(kind) = query.event_type {
            sql.push(" AND event_type = ").push_bind(kind.as_str());
        }
        if let Some(user) = &query.user_id {
            sql.push(" AND user_id = ").push_bind(user.clone());
        }
        sql.push(" ORDER BY timestamp DESC");
        if let Some(limit) = query.limit {
            sql.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = sql.build().fetch_all(&self.pool).await?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            events.push(serde_json::from_str(&data)?);
        }
        Ok(events)
    }

    async fn get_event_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM usage_events")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count.max(0) as usize)
    }

    async fn cleanup_old_events(&mut self, days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let result = sqlx::query("DELETE FROM usage_events WHERE timestamp < ?")
            .bind(timestamp_key(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
