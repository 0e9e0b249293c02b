//! Configuration for the AceFlow server.
//!
//! Holds the unified config tree, detection of legacy client configs,
//! migration to the unified schema and the runtime [`ConfigManager`].

#![warn(missing_docs)]

mod error;

pub mod config;
pub mod detector;
pub mod migrator;
pub mod manager;

pub use error::{ConfigError, Result};

pub use config::{
    merge_json, parse_flag, CollaborationConfig, CoreConfig, IntelligenceConfig, MonitoringConfig, ServerMode,
    UnifiedConfig,
};
pub use detector::{ConfigDetector, ConfigType, DetectionResult};
pub use migrator::{
    config_from_document, config_overlay, unified_from_legacy, AutoMigrationReport, ConfigMigrator, DiscoverySummary,
    MigrationReport, MigrationResult, MigrationStatus, MigrationStrategy, MigrationSummary, UNIFIED_VERSION,
};
pub use manager::{ConfigManager, ConfigSource};
