//! Error type for module operations.

use aceflow_core::ToolName;
use aceflow_storage::StorageError;

/// Result alias for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors raised by modules and the module manager.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// A module with this name is already registered
    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    /// No module with this name is registered
    #[error("Module not registered: {0}")]
    NotRegistered(String),

    /// A required dependency is not registered
    #[error("Module '{module}' depends on unregistered module '{dependency}'")]
    MissingDependency {
        /// Dependent module
        module: String,
        /// Missing dependency
        dependency: String,
    },

    /// Required dependencies form a cycle
    #[error("Circular dependency among modules: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    /// Module is not ready or disabled
    #[error("Module '{0}' is not available")]
    Unavailable(String),

    /// Bad tool parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Module does not provide this tool
    #[error("Module '{module}' does not provide tool '{tool}'")]
    UnsupportedTool {
        /// Module asked
        module: String,
        /// Tool requested
        tool: ToolName,
    },

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ModuleError {
    /// Short machine-readable kind, used as `error_type` at the tool boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleError::AlreadyRegistered(_) => "already_registered",
            ModuleError::NotRegistered(_) => "not_registered",
            ModuleError::MissingDependency { .. } => "missing_dependency",
            ModuleError::CircularDependency(_) => "circular_dependency",
            ModuleError::Unavailable(_) => "unavailable",
            ModuleError::InvalidParams(_) => "invalid_params",
            ModuleError::UnsupportedTool { .. } => "unsupported_tool",
            ModuleError::Storage(StorageError::NotFound(_)) => "not_found",
            ModuleError::Storage(StorageError::AlreadyExists(_)) => "already_exists",
            ModuleError::Storage(_) => "storage",
            ModuleError::Other(_) => "other",
        }
    }
}
