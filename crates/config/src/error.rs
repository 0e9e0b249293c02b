//! Error type for configuration handling.

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading, validating or migrating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File or migration not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Migration could not be carried out
    #[error("Migration error: {0}")]
    Migration(String),
}
