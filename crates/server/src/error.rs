//! Error type for the unified server.

use aceflow_config::ConfigError;
use aceflow_modules::ModuleError;
use aceflow_storage::StorageError;

use crate::resources::AccessLevel;

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by [`crate::UnifiedServer`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Tool name not in the catalogue
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// URI does not match a resource route
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Caller lacks the access level of the resource
    #[error("Access denied for resource {resource}: requires {required}")]
    AccessDenied {
        /// Resource type
        resource: String,
        /// Level the route requires
        required: AccessLevel,
    },

    /// Per-minute limit of the route reached
    #[error("Rate limit exceeded for resource {resource} ({limit}/min)")]
    RateLimited {
        /// Resource type
        resource: String,
        /// Requests allowed per minute
        limit: usize,
    },

    /// `initialize` has not completed
    #[error("Server is not initialized")]
    NotInitialized,

    /// Module failure
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServerError {
    /// Machine-readable kind, reported as `error_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::UnknownTool(_) => "unknown_tool",
            ServerError::UnknownResource(_) => "unknown_resource",
            ServerError::AccessDenied { .. } => "access_denied",
            ServerError::RateLimited { .. } => "rate_limited",
            ServerError::NotInitialized => "not_initialized",
            ServerError::Module(e) => e.kind(),
            ServerError::Config(_) => "config",
            ServerError::Storage(StorageError::NotFound(_)) => "not_found",
            ServerError::Storage(_) => "storage",
        }
    }
}
