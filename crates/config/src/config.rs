//! Unified configuration tree.
//!
//! Construction never fails on bad values; call [`UnifiedConfig::validate`]
//! or [`UnifiedConfig::validation_errors`] to find out what is wrong.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::{ConfigError, Result};

/// Top-level server mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// Core tools only, no monitoring
    Basic,
    /// Core tools with monitoring
    Standard,
    /// Collaboration and intelligence on top of core
    Enhanced,
}

impl ServerMode {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Basic => "basic",
            ServerMode::Standard => "standard",
            ServerMode::Enhanced => "enhanced",
        }
    }

    /// Parse a mode name, case-insensitively.
    pub fn parse(name: &str) -> Option<ServerMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(ServerMode::Basic),
            "standard" => Some(ServerMode::Standard),
            "enhanced" => Some(ServerMode::Enhanced),
            _ => None,
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const INIT_MODES: [&str; 4] = ["minimal", "standard", "complete", "smart"];
const INTERACTION_LEVELS: [&str; 3] = ["minimal", "standard", "detailed"];
const STORAGE_BACKENDS: [&str; 2] = ["memory", "sqlite"];

/// Settings of the core module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Module switch
    pub enabled: bool,
    /// Init mode used when `aceflow_init` gets none
    pub default_mode: String,
    /// Advance stages automatically after execution
    pub auto_advance: bool,
    /// Minimum validation score, 0..=1
    pub quality_threshold: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_mode: "standard".to_string(),
            auto_advance: false,
            quality_threshold: 0.8,
        }
    }
}

/// Settings of the collaboration module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// Module switch
    pub enabled: bool,
    /// Seconds before a confirmation request expires
    pub confirmation_timeout: i64,
    /// Execute tasks without asking
    pub auto_confirm: bool,
    /// minimal | standard | detailed
    pub interaction_level: String,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confirmation_timeout: 300,
            auto_confirm: false,
            interaction_level: "standard".to_string(),
        }
    }
}

/// Settings of the intelligence module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    /// Module switch
    pub enabled: bool,
    /// Classify free-form input
    pub intent_recognition: bool,
    /// Tailor recommendations to the project state
    pub adaptive_guidance: bool,
    /// Learn from feedback (reserved)
    pub learning_enabled: bool,
    /// Seconds intelligence results may be cached
    pub cache_ttl: i64,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            intent_recognition: true,
            adaptive_guidance: true,
            learning_enabled: false,
            cache_ttl: 3600,
        }
    }
}

/// Settings of usage monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Monitoring switch
    pub enabled: bool,
    /// Record tool and resource events
    pub usage_tracking: bool,
    /// Record timing samples
    pub performance_tracking: bool,
    /// Days events are kept
    pub data_retention_days: i64,
    /// memory | sqlite
    pub storage_backend: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            usage_tracking: true,
            performance_tracking: true,
            data_retention_days: 30,
            storage_backend: "memory".to_string(),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiedConfig {
    /// basic | standard | enhanced (checked by `validate`)
    pub mode: String,
    /// Core module
    pub core: CoreConfig,
    /// Collaboration module
    pub collaboration: CollaborationConfig,
    /// Intelligence module
    pub intelligence: IntelligenceConfig,
    /// Usage monitoring
    pub monitoring: MonitoringConfig,
}

impl Default for UnifiedConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Standard.as_str().to_string(),
            core: CoreConfig::default(),
            collaboration: CollaborationConfig::default(),
            intelligence: IntelligenceConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl UnifiedConfig {
    /// The default configuration (standard mode).
    pub fn load_default() -> Self {
        Self::default()
    }

    /// Preset for a mode.
    pub fn for_mode(mode: ServerMode) -> Self {
        let mut config = Self {
            mode: mode.as_str().to_string(),
            ..Self::default()
        };
        match mode {
            ServerMode::Basic => config.monitoring.enabled = false,
            ServerMode::Standard => {}
            ServerMode::Enhanced => {
                config.collaboration.enabled = true;
                config.intelligence.enabled = true;
            }
        }
        config
    }

    /// Build from a JSON object. Missing fields take defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Serialize to a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parsed top-level mode, if valid.
    pub fn server_mode(&self) -> Option<ServerMode> {
        ServerMode::parse(&self.mode)
    }

    /// Every problem with the current values.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_mode().is_none() {
            errors.push(format!(
                "Invalid mode '{}': expected one of basic, standard, enhanced",
                self.mode
            ));
        }
        if !INIT_MODES.contains(&self.core.default_mode.as_str()) {
            errors.push(format!("Invalid core.default_mode '{}'", self.core.default_mode));
        }
        if !(0.0..=1.0).contains(&self.core.quality_threshold) {
            errors.push(format!(
                "core.quality_threshold must be between 0 and 1, got {}",
                self.core.quality_threshold
            ));
        }
        if self.collaboration.confirmation_timeout <= 0 {
            errors.push(format!(
                "collaboration.confirmation_timeout must be positive, got {}",
                self.collaboration.confirmation_timeout
            ));
        }
        if !INTERACTION_LEVELS.contains(&self.collaboration.interaction_level.as_str()) {
            errors.push(format!(
                "Invalid collaboration.interaction_level '{}'",
                self.collaboration.interaction_level
            ));
        }
        if self.intelligence.cache_ttl <= 0 {
            errors.push(format!(
                "intelligence.cache_ttl must be positive, got {}",
                self.intelligence.cache_ttl
            ));
        }
        if self.monitoring.data_retention_days <= 0 {
            errors.push(format!(
                "monitoring.data_retention_days must be positive, got {}",
                self.monitoring.data_retention_days
            ));
        }
        if !STORAGE_BACKENDS.contains(&self.monitoring.storage_backend.as_str()) {
            errors.push(format!(
                "Invalid monitoring.storage_backend '{}'",
                self.monitoring.storage_backend
            ));
        }

        errors
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Overlay values from `ACEFLOW_*` environment variables.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "ACEFLOW_MODE" => self.mode = value.trim().to_ascii_lowercase(),
                "ACEFLOW_COLLABORATION_ENABLED" => set_flag(&mut self.collaboration.enabled, key, value),
                "ACEFLOW_INTELLIGENCE_ENABLED" => set_flag(&mut self.intelligence.enabled, key, value),
                "ACEFLOW_MONITORING_ENABLED" => set_flag(&mut self.monitoring.enabled, key, value),
                "ACEFLOW_QUALITY_THRESHOLD" => match value.trim().parse::<f64>() {
                    Ok(v) => self.core.quality_threshold = v,
                    Err(_) => warn!("Ignoring {}={}: not a number", key, value),
                },
                _ => {}
            }
        }
    }
}

fn set_flag(target: &mut bool, key: &str, value: &str) {
    match parse_flag(value) {
        Some(v) => *target = v,
        None => warn!("Ignoring {}={}: not a boolean", key, value),
    }
}

/// Parse `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Recursively merge `patch` into `base`. Objects merge key by key, any
/// other value replaces.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = UnifiedConfig::load_default();
        assert_eq!(config.mode, "standard");
        assert!(config.core.enabled);
        assert!(!config.collaboration.enabled);
        assert!(!config.intelligence.enabled);
        assert!(config.monitoring.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_mode_is_only_caught_by_validate() {
        let config = UnifiedConfig {
            mode: "turbo".to_string(),
            ..Default::default()
        };
        let errors = config.validation_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("turbo"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut config = UnifiedConfig::default();
        config.core.quality_threshold = 1.5;
        config.collaboration.confirmation_timeout = -1;
        let errors = config.validation_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("quality_threshold")));
        assert!(errors.iter().any(|e| e.contains("confirmation_timeout")));
    }

    #[test]
    fn test_from_value_nested() {
        let config = UnifiedConfig::from_value(&json!({
            "mode": "enhanced",
            "core": {"auto_advance": true, "quality_threshold": 0.9},
            "collaboration": {"enabled": true, "confirmation_timeout": 600},
            "intelligence": {"enabled": true, "intent_recognition": false}
        }))
        .unwrap();
        assert_eq!(config.mode, "enhanced");
        assert!(config.core.auto_advance);
        assert_eq!(config.core.quality_threshold, 0.9);
        assert!(config.core.enabled);
        assert_eq!(config.collaboration.confirmation_timeout, 600);
        assert!(!config.intelligence.intent_recognition);
        assert!(config.monitoring.enabled);
    }

    #[test]
    fn test_value_roundtrip() {
        let mut config = UnifiedConfig::for_mode(ServerMode::Enhanced);
        config.collaboration.interaction_level = "detailed".to_string();
        config.monitoring.storage_backend = "sqlite".to_string();
        let back = UnifiedConfig::from_value(&config.to_value()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_mode_presets() {
        assert!(!UnifiedConfig::for_mode(ServerMode::Basic).monitoring.enabled);
        let enhanced = UnifiedConfig::for_mode(ServerMode::Enhanced);
        assert!(enhanced.collaboration.enabled && enhanced.intelligence.enabled);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = UnifiedConfig::default();
        config.apply_env([
            ("ACEFLOW_MODE", "Enhanced"),
            ("ACEFLOW_COLLABORATION_ENABLED", "yes"),
            ("ACEFLOW_INTELLIGENCE_ENABLED", "maybe"),
            ("ACEFLOW_QUALITY_THRESHOLD", "0.65"),
            ("HOME", "/root"),
        ]);
        assert_eq!(config.mode, "enhanced");
        assert!(config.collaboration.enabled);
        assert!(!config.intelligence.enabled);
        assert_eq!(config.core.quality_threshold, 0.65);
    }

    #[test]
    fn test_merge_json() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge_json(&mut base, &json!({"a": {"b": 10}, "e": 5}));
        assert_eq!(base, json!({"a": {"b": 10, "c": 2}, "d": 3, "e": 5}));
    }
}
