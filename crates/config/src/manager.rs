//! Configuration manager.
//!
//! Owns the resolved [`UnifiedConfig`] for one server instance. Values are
//! layered defaults → file → environment → runtime overrides.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::{merge_json, ServerMode, UnifiedConfig};
use crate::detector::{ConfigDetector, ConfigType};
use crate::migrator::{config_overlay, unified_from_legacy, ConfigMigrator, MigrationStatus, MigrationStrategy};
use crate::{ConfigError, Result};

const FEATURES: [&str; 4] = ["core", "collaboration", "intelligence", "monitoring"];

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults only
    Defaults,
    /// A unified config file
    File(PathBuf),
    /// A legacy file read through the migration transform
    Legacy(PathBuf),
    /// A legacy file migrated on load
    Migrated(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Defaults => write!(f, "defaults"),
            ConfigSource::File(p) => write!(f, "file:{}", p.display()),
            ConfigSource::Legacy(p) => write!(f, "legacy:{}", p.display()),
            ConfigSource::Migrated(p) => write!(f, "migrated:{}", p.display()),
        }
    }
}

/// Loads, caches and updates the server configuration.
#[derive(Debug)]
pub struct ConfigManager {
    config_path: Option<PathBuf>,
    config: UnifiedConfig,
    source: ConfigSource,
    use_env: bool,
    migrator: ConfigMigrator,
}

impl ConfigManager {
    /// Manager reading `config_path` (if any) and the process environment.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            config: UnifiedConfig::default(),
            source: ConfigSource::Defaults,
            use_env: true,
            migrator: ConfigMigrator::new(),
        }
    }

    /// Stop reading `ACEFLOW_*` variables (tests and embedded use).
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Path of the config file, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Where the active config came from.
    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// The migrator used for legacy files.
    pub fn migrator(&mut self) -> &mut ConfigMigrator {
        &mut self.migrator
    }

    /// Resolve the configuration and cache it.
    ///
    /// A legacy file is migrated with [`MigrationStrategy::CreateNew`] when
    /// `auto_migrate` is set; otherwise it is read through the same
    /// transform without touching disk.
    pub async fn load_config(&mut self, runtime_overrides: Option<&Value>, auto_migrate: bool) -> Result<&UnifiedConfig> {
        let mut value = UnifiedConfig::default().to_value();
        let mut source = ConfigSource::Defaults;

        if let Some(path) = self.config_path.clone() {
            match self.read_file_overlay(&path, auto_migrate).await? {
                Some((overlay, file_source)) => {
                    merge_json(&mut value, &overlay);
                    source = file_source;
                }
                None => debug!("Config file {} not found, using defaults", path.display()),
            }
        }

        let mut config = UnifiedConfig::from_value(&value)?;
        if self.use_env {
            config.apply_env(std::env::vars());
        }

        if let Some(overrides) = runtime_overrides {
            let mut value = config.to_value();
            merge_json(&mut value, &normalize_patch(overrides));
            config = UnifiedConfig::from_value(&value)?;
        }

        let errors = config.validation_errors();
        if !errors.is_empty() {
            warn!("Loaded configuration has {} validation error(s): {}", errors.len(), errors.join("; "));
        }

        info!("Configuration loaded from {} (mode: {})", source, config.mode);
        self.config = config;
        self.source = source;
        Ok(&self.config)
    }

    async fn read_file_overlay(&mut self, path: &Path, auto_migrate: bool) -> Result<Option<(Value, ConfigSource)>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: Value = serde_json::from_str(&content)?;

        let detection = ConfigDetector::new().detect_value(&doc);
        if !detection.config_type.is_legacy() {
            if detection.config_type == ConfigType::Unknown {
                debug!("{} has no AceFlow server entry; reading top-level sections", path.display());
            }
            return Ok(Some((config_overlay(&doc), ConfigSource::File(path.to_path_buf()))));
        }

        if auto_migrate {
            let result = self.migrator.migrate_file(path, MigrationStrategy::CreateNew).await;
            if result.status != MigrationStatus::Completed {
                return Err(ConfigError::Migration(result.errors.join("; ")));
            }
            if let Some(target) = result.target_file {
                let migrated: Value = serde_json::from_str(&fs::read_to_string(&target).await?)?;
                info!("Migrated legacy config {} to {}", path.display(), target.display());
                self.config_path = Some(target.clone());
                return Ok(Some((config_overlay(&migrated), ConfigSource::Migrated(target))));
            }
        }

        let (unified, _) = unified_from_legacy(&[(path.to_path_buf(), doc)]);
        Ok(Some((config_overlay(&unified), ConfigSource::Legacy(path.to_path_buf()))))
    }

    /// The active configuration.
    pub fn get_config(&self) -> &UnifiedConfig {
        &self.config
    }

    /// Merge a patch into the active config.
    ///
    /// Accepts nested sections (`{"core": {...}}`) and flat
    /// `<section>_enabled` switches. The update is all-or-nothing: when the
    /// merged config fails to parse or validate, the old one is kept and
    /// `false` is returned.
    pub fn update_config(&mut self, patch: &Value) -> bool {
        let mut value = self.config.to_value();
        merge_json(&mut value, &normalize_patch(patch));

        let candidate = match UnifiedConfig::from_value(&value) {
            Ok(c) => c,
            Err(e) => {
                warn!("Rejected config update: {}", e);
                return false;
            }
        };
        if let Err(e) = candidate.validate() {
            warn!("Rejected config update: {}", e);
            return false;
        }

        debug!("Config updated (mode: {})", candidate.mode);
        self.config = candidate;
        true
    }

    /// Mode the server actually runs in, given the enabled modules.
    pub fn get_effective_mode(&self) -> ServerMode {
        if self.config.collaboration.enabled || self.config.intelligence.enabled {
            ServerMode::Enhanced
        } else if self.config.server_mode() == Some(ServerMode::Basic) {
            ServerMode::Basic
        } else {
            ServerMode::Standard
        }
    }

    /// Whether a feature (`core`, `collaboration`, `intelligence`,
    /// `monitoring`) is on. Unknown names are off.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        match feature {
            "core" => self.config.core.enabled,
            "collaboration" => self.config.collaboration.enabled,
            "intelligence" => self.config.intelligence.enabled,
            "monitoring" => self.config.monitoring.enabled,
            _ => false,
        }
    }

    /// Compact description for status endpoints.
    pub fn get_config_summary(&self) -> Value {
        let features: Map<String, Value> = FEATURES
            .iter()
            .map(|f| (f.to_string(), Value::Bool(self.is_feature_enabled(f))))
            .collect();
        let errors = self.config.validation_errors();
        json!({
            "mode": self.config.mode,
            "effective_mode": self.get_effective_mode().as_str(),
            "features": features,
            "validation_status": {
                "valid": errors.is_empty(),
                "errors": errors,
            },
            "source": self.source.to_string(),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Rewrite flat `<section>_enabled` keys into nested form.
fn normalize_patch(patch: &Value) -> Value {
    let Some(map) = patch.as_object() else {
        return patch.clone();
    };

    let mut out = Value::Object(Map::new());
    for (key, value) in map {
        let section = key.strip_suffix("_enabled").filter(|s| FEATURES.contains(s));
        let piece = match section {
            Some(section) => json!({ section: { "enabled": value } }),
            None => json!({ key.as_str(): value }),
        };
        merge_json(&mut out, &piece);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_defaults_without_file() {
        let mut manager = ConfigManager::new(None).without_env();
        let config = manager.load_config(None, false).await.unwrap();
        assert_eq!(config.mode, "standard");
        assert_eq!(manager.source(), &ConfigSource::Defaults);
    }

    #[tokio::test]
    async fn test_precedence_file_then_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "aceflow.json", json!({
            "version": "2.0",
            "unified_mode": true,
            "mode": "enhanced",
            "mcpServers": {},
            "module_config": {"collaboration": {"enabled": true, "confirmation_timeout": 120}}
        }));

        let mut manager = ConfigManager::new(Some(path.clone())).without_env();
        let overrides = json!({"collaboration": {"confirmation_timeout": 60}, "intelligence_enabled": true});
        let config = manager.load_config(Some(&overrides), false).await.unwrap().clone();

        assert_eq!(config.mode, "enhanced");
        assert!(config.collaboration.enabled);
        assert_eq!(config.collaboration.confirmation_timeout, 60);
        assert!(config.intelligence.enabled);
        assert_eq!(manager.source(), &ConfigSource::File(path));
    }

    #[tokio::test]
    async fn test_legacy_file_read_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "mcp.json", json!({"mcpServers": {"aceflow-enhanced-server": {
            "command": "uvx",
            "env": {"ENABLE_COLLABORATION": "true"}
        }}}));

        let mut manager = ConfigManager::new(Some(path.clone())).without_env();
        let config = manager.load_config(None, false).await.unwrap();
        assert!(config.collaboration.enabled);
        assert_eq!(config.mode, "enhanced");
        assert!(matches!(manager.source(), ConfigSource::Legacy(_)));
        assert!(!dir.path().join("mcp_unified.json").exists());
    }

    #[tokio::test]
    async fn test_legacy_file_auto_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "mcp.json", json!({"mcpServers": {"aceflow-server": {
            "command": "uvx",
            "env": {"ACEFLOW_MODE": "basic"}
        }}}));

        let mut manager = ConfigManager::new(Some(path)).without_env();
        let config = manager.load_config(None, true).await.unwrap();
        assert_eq!(config.mode, "basic");
        let target = dir.path().join("mcp_unified.json");
        assert!(target.exists());
        assert_eq!(manager.config_path(), Some(target.as_path()));
        assert_eq!(manager.migrator().get_migration_report().completed_migrations, 1);
    }

    #[test]
    fn test_update_config_flat_keys() {
        let mut manager = ConfigManager::default().without_env();
        assert!(manager.update_config(&json!({"mode": "enhanced", "collaboration_enabled": true})));
        assert_eq!(manager.get_config().mode, "enhanced");
        assert!(manager.is_feature_enabled("collaboration"));
        assert!(manager.is_feature_enabled("core"));
        assert!(!manager.is_feature_enabled("teleport"));
        assert_eq!(manager.get_effective_mode(), ServerMode::Enhanced);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let mut manager = ConfigManager::default().without_env();
        assert!(!manager.update_config(&json!({"mode": "turbo"})));
        assert!(!manager.update_config(&json!({"core": {"quality_threshold": "high"}})));
        assert_eq!(manager.get_config(), &UnifiedConfig::default());
    }

    #[test]
    fn test_effective_mode_and_summary() {
        let mut manager = ConfigManager::default().without_env();
        assert_eq!(manager.get_effective_mode(), ServerMode::Standard);
        assert!(manager.update_config(&json!({"mode": "basic"})));
        assert_eq!(manager.get_effective_mode(), ServerMode::Basic);

        let summary = manager.get_config_summary();
        assert_eq!(summary["mode"], "basic");
        assert_eq!(summary["effective_mode"], "basic");
        assert_eq!(summary["features"]["core"], true);
        assert_eq!(summary["validation_status"]["valid"], true);
    }
}
