//! Legacy configuration detection.
//!
//! Looks at an MCP client config document and decides which AceFlow
//! generation wrote it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::config::parse_flag;
use crate::Result;

/// Which schema a config document follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    /// Single `aceflow-server` entry
    AceflowBasic,
    /// `aceflow-enhanced-server` entry or feature switches in `env`
    AceflowEnhanced,
    /// Already in the unified schema
    AceflowUnified,
    /// Valid MCP config without an AceFlow server
    Unknown,
    /// Not an MCP config at all
    Invalid,
}

impl ConfigType {
    /// Whether the document needs migrating to the unified schema.
    pub fn is_legacy(&self) -> bool {
        matches!(self, ConfigType::AceflowBasic | ConfigType::AceflowEnhanced)
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigType::AceflowBasic => write!(f, "aceflow_basic"),
            ConfigType::AceflowEnhanced => write!(f, "aceflow_enhanced"),
            ConfigType::AceflowUnified => write!(f, "aceflow_unified"),
            ConfigType::Unknown => write!(f, "unknown"),
            ConfigType::Invalid => write!(f, "invalid"),
        }
    }
}

/// Outcome of inspecting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// File the document came from, if any
    pub file_path: Option<PathBuf>,
    /// Detected schema
    pub config_type: ConfigType,
    /// Always `json` for now
    pub config_format: String,
    /// Whether the document is a well-formed MCP config
    pub is_valid: bool,
    /// Structural problems
    pub validation_errors: Vec<String>,
    /// Whether migration to the unified schema is needed
    pub migration_required: bool,
    /// Declared or inferred schema version
    pub version: String,
    /// Features switched on in the document
    pub detected_features: Vec<String>,
    /// Name of the AceFlow server entry
    pub server_name: Option<String>,
}

/// Detects AceFlow config generations.
#[derive(Debug, Default, Clone)]
pub struct ConfigDetector;

impl ConfigDetector {
    /// Create a detector.
    pub fn new() -> Self {
        Self
    }

    /// Inspect a parsed document.
    pub fn detect_value(&self, doc: &Value) -> DetectionResult {
        let mut result = DetectionResult {
            file_path: None,
            config_type: ConfigType::Invalid,
            config_format: "json".to_string(),
            is_valid: false,
            validation_errors: Vec::new(),
            migration_required: false,
            version: "unknown".to_string(),
            detected_features: Vec::new(),
            server_name: None,
        };

        let Some(obj) = doc.as_object() else {
            result.validation_errors.push("Configuration root must be a JSON object".to_string());
            return result;
        };

        let servers = match obj.get("mcpServers") {
            Some(Value::Object(servers)) => servers,
            Some(_) => {
                result.validation_errors.push("mcpServers must be an object".to_string());
                return result;
            }
            None => {
                result.validation_errors.push("Missing required field: mcpServers".to_string());
                return result;
            }
        };

        result.is_valid = true;
        let declared_version = obj.get("version").and_then(|v| v.as_str()).map(str::to_string);

        let unified = obj.get("unified_mode").and_then(|v| v.as_bool()).unwrap_or(false)
            || obj.contains_key("module_config");
        if unified {
            result.config_type = ConfigType::AceflowUnified;
            result.version = declared_version.unwrap_or_else(|| "2.0".to_string());
            result.server_name = servers.keys().find(|k| k.contains("aceflow")).cloned();
            result.detected_features.push("unified_architecture".to_string());
            if let Some(modules) = obj.get("module_config").and_then(|v| v.as_object()) {
                for (name, section) in modules {
                    let enabled = section.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
                    if enabled && name != "core" {
                        push_unique(&mut result.detected_features, name);
                    }
                }
            }
            if let Some(flags) = obj.get("feature_flags").and_then(|v| v.as_object()) {
                for (name, value) in flags {
                    if value.as_bool().unwrap_or(false) {
                        push_unique(&mut result.detected_features, name);
                    }
                }
            }
            return result;
        }

        let Some((name, server)) = servers.iter().find(|(k, _)| k.contains("aceflow")) else {
            result.config_type = ConfigType::Unknown;
            return result;
        };

        result.server_name = Some(name.clone());
        let env = legacy_env(server);
        let collaboration = env_flag(&env, "ENABLE_COLLABORATION");
        let intelligence = env_flag(&env, "ENABLE_INTELLIGENCE");

        result.detected_features.push("basic_tools".to_string());
        if collaboration {
            result.detected_features.push("collaboration".to_string());
        }
        if intelligence {
            result.detected_features.push("intelligence".to_string());
        }
        if env_flag(&env, "ENABLE_MONITORING") {
            result.detected_features.push("monitoring".to_string());
        }
        if env_flag(&env, "ENABLE_CACHING") {
            result.detected_features.push("caching".to_string());
        }

        if name.contains("enhanced") || collaboration || intelligence {
            result.config_type = ConfigType::AceflowEnhanced;
            result.version = declared_version.unwrap_or_else(|| "1.5".to_string());
        } else {
            result.config_type = ConfigType::AceflowBasic;
            result.version = declared_version.unwrap_or_else(|| "1.0".to_string());
        }
        result.migration_required = true;
        result
    }

    /// Inspect one file. Unreadable JSON yields an `Invalid` result.
    pub async fn detect_file(&self, path: &Path) -> Result<DetectionResult> {
        let content = fs::read_to_string(path).await?;
        let mut result = match serde_json::from_str::<Value>(&content) {
            Ok(doc) => self.detect_value(&doc),
            Err(e) => {
                let mut invalid = self.detect_value(&Value::Null);
                invalid.validation_errors = vec![format!("Malformed JSON: {}", e)];
                invalid
            }
        };
        result.file_path = Some(path.to_path_buf());
        debug!("Detected {} at {}", result.config_type, path.display());
        Ok(result)
    }

    /// Inspect files and directories. Directories contribute their
    /// top-level `*.json` files; missing paths are skipped.
    pub async fn detect_paths(&self, paths: &[PathBuf]) -> Result<Vec<DetectionResult>> {
        let mut results = Vec::new();
        for path in paths {
            for file in json_files(path).await? {
                results.push(self.detect_file(&file).await?);
            }
        }
        Ok(results)
    }
}

/// `*.json` files under `path` (or `path` itself), sorted.
pub(crate) async fn json_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut rd = fs::read_dir(path).await?;
    while let Some(entry) = rd.next_entry().await? {
        let p = entry.path();
        if entry.file_type().await?.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// `env` map of a legacy server entry, values as strings.
pub(crate) fn legacy_env(server: &Value) -> serde_json::Map<String, Value> {
    server
        .get("env")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn env_flag(env: &serde_json::Map<String, Value>, key: &str) -> bool {
    match env.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => parse_flag(s).unwrap_or(false),
        _ => false,
    }
}

fn push_unique(features: &mut Vec<String>, name: &str) {
    if !features.iter().any(|f| f == name) {
        features.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn basic() -> Value {
        json!({"mcpServers": {"aceflow-server": {
            "command": "uvx",
            "args": ["aceflow-mcp-server@latest"],
            "env": {"ACEFLOW_MODE": "basic"}
        }}})
    }

    #[test]
    fn test_detect_basic() {
        let r = ConfigDetector::new().detect_value(&basic());
        assert_eq!(r.config_type, ConfigType::AceflowBasic);
        assert!(r.is_valid);
        assert!(r.migration_required);
        assert!(r.detected_features.contains(&"basic_tools".to_string()));
        assert_eq!(r.server_name.as_deref(), Some("aceflow-server"));
    }

    #[test]
    fn test_detect_enhanced() {
        let doc = json!({
            "mcpServers": {"aceflow-enhanced-server": {
                "command": "uvx",
                "env": {"ENABLE_COLLABORATION": "true", "ENABLE_INTELLIGENCE": "true"}
            }},
            "version": "1.5"
        });
        let r = ConfigDetector::new().detect_value(&doc);
        assert_eq!(r.config_type, ConfigType::AceflowEnhanced);
        assert_eq!(r.version, "1.5");
        assert!(r.detected_features.contains(&"collaboration".to_string()));
        assert!(r.detected_features.contains(&"intelligence".to_string()));
    }

    #[test]
    fn test_detect_unified() {
        let doc = json!({
            "mcpServers": {"aceflow-unified-server": {"command": "uvx"}},
            "version": "2.0",
            "unified_mode": true,
            "module_config": {"core": {"enabled": true}, "collaboration": {"enabled": true}},
            "feature_flags": {"caching": true, "monitoring": false}
        });
        let r = ConfigDetector::new().detect_value(&doc);
        assert_eq!(r.config_type, ConfigType::AceflowUnified);
        assert_eq!(r.version, "2.0");
        assert!(!r.migration_required);
        assert!(r.detected_features.contains(&"unified_architecture".to_string()));
        assert!(r.detected_features.contains(&"caching".to_string()));
        assert!(r.detected_features.contains(&"collaboration".to_string()));
        assert!(!r.detected_features.contains(&"monitoring".to_string()));
    }

    #[test]
    fn test_detect_invalid_and_unknown() {
        let detector = ConfigDetector::new();
        let invalid = detector.detect_value(&json!({"invalid_structure": true}));
        assert_eq!(invalid.config_type, ConfigType::Invalid);
        assert!(!invalid.is_valid);
        assert!(invalid.validation_errors.iter().any(|e| e.contains("mcpServers")));

        let unknown = detector.detect_value(&json!({"mcpServers": {"other": {"command": "python"}}}));
        assert_eq!(unknown.config_type, ConfigType::Unknown);
        assert!(unknown.is_valid);
        assert!(!unknown.migration_required);
    }

    #[tokio::test]
    async fn test_detect_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), basic().to_string()).unwrap();
        std::fs::write(dir.path().join("b.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let results = ConfigDetector::new()
            .detect_paths(&[dir.path().to_path_buf(), dir.path().join("missing.json")])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].config_type, ConfigType::AceflowBasic);
        assert_eq!(results[1].config_type, ConfigType::Invalid);
        assert!(results[1].validation_errors[0].contains("Malformed JSON"));
    }
}
