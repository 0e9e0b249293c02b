//! Storage error type and the usage-event store abstraction.

use aceflow_core::{EventQuery, UsageEvent};
use async_trait::async_trait;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item exists and must not be overwritten
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Database error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Append-only store for usage events.
///
/// Queries return events newest first.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event.
    async fn save_event(&mut self, event: &UsageEvent) -> Result<()>;

    /// Events matching `query`, newest first, truncated to `query.limit`.
    async fn get_events(&self, query: &EventQuery) -> Result<Vec<UsageEvent>>;

    /// Number of stored events.
    async fn get_event_count(&self) -> Result<usize>;

    /// Delete events older than `days` days. Returns the number removed.
    async fn cleanup_old_events(&mut self, days: i64) -> Result<usize>;
}
