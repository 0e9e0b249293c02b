//! One-way migration of legacy AceFlow configs to the unified schema.
//!
//! Migrations are tracked in an in-memory registry so they can be rolled
//! back by id. The registry does not survive a restart.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use aceflow_core::{MigrationId, Time};

use crate::config::{merge_json, ServerMode, UnifiedConfig};
use crate::detector::{env_flag, legacy_env, ConfigDetector, ConfigType, DetectionResult};
use crate::Result;

/// Version written into unified documents.
pub const UNIFIED_VERSION: &str = "2.0";

const SECTIONS: [&str; 4] = ["core", "collaboration", "intelligence", "monitoring"];

/// How the migrated document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Back the source up, then overwrite it
    BackupAndReplace,
    /// Write `<stem>_unified.json` next to the source
    CreateNew,
    /// Combine several sources into one new file
    Merge,
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStrategy::BackupAndReplace => write!(f, "backup_and_replace"),
            MigrationStrategy::CreateNew => write!(f, "create_new"),
            MigrationStrategy::Merge => write!(f, "merge"),
        }
    }
}

/// Final state of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Unified file written
    Completed,
    /// Nothing written
    Failed,
    /// Undone by `rollback_migration`
    RolledBack,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Completed => write!(f, "completed"),
            MigrationStatus::Failed => write!(f, "failed"),
            MigrationStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Record of one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Registry key
    pub migration_id: MigrationId,
    /// First (or only) source file
    pub source_file: PathBuf,
    /// All source files
    pub source_files: Vec<PathBuf>,
    /// Detected type of the first source
    pub source_type: ConfigType,
    /// Backup of the source, for `BackupAndReplace`
    pub backup_file: Option<PathBuf>,
    /// Unified document written
    pub target_file: Option<PathBuf>,
    /// Human readable change log
    pub changes_made: Vec<String>,
    /// Whether the output validated
    pub validation_passed: bool,
    /// Validation problems with the output
    pub validation_errors: Vec<String>,
    /// Errors that stopped the migration
    pub errors: Vec<String>,
    /// Outcome
    pub status: MigrationStatus,
    /// Strategy used
    pub strategy: MigrationStrategy,
    /// Start time
    pub started_at: Time,
}

impl MigrationResult {
    fn new(sources: &[PathBuf], strategy: MigrationStrategy) -> Self {
        Self {
            migration_id: MigrationId::new(),
            source_file: sources.first().cloned().unwrap_or_default(),
            source_files: sources.to_vec(),
            source_type: ConfigType::Invalid,
            backup_file: None,
            target_file: None,
            changes_made: Vec::new(),
            validation_passed: false,
            validation_errors: Vec::new(),
            errors: Vec::new(),
            status: MigrationStatus::Failed,
            strategy,
            started_at: chrono::Utc::now(),
        }
    }

    fn fail(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        warn!("Migration {} failed: {}", self.migration_id, error);
        self.errors.push(error);
        self.status = MigrationStatus::Failed;
        self
    }
}

/// One line of the migration report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Registry key
    pub migration_id: MigrationId,
    /// Source file
    pub source_file: PathBuf,
    /// Output file
    pub target_file: Option<PathBuf>,
    /// Outcome
    pub status: MigrationStatus,
    /// Whether the output validated
    pub validation_passed: bool,
    /// Strategy used
    pub strategy: MigrationStrategy,
}

/// Aggregate over the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// One-line summary
    pub summary: String,
    /// Number of migrations
    pub total_migrations: usize,
    /// Completed migrations
    pub completed_migrations: usize,
    /// Failed migrations
    pub failed_migrations: usize,
    /// Rolled back migrations
    pub rolled_back_migrations: usize,
    /// `completed / total`, 0 when empty
    pub success_rate: f64,
    /// Per-migration lines
    pub migrations: Vec<MigrationSummary>,
}

/// What auto-discovery found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    /// Paths searched
    pub search_paths: Vec<PathBuf>,
    /// Config files inspected
    pub total_configs_found: usize,
    /// Legacy files selected for migration
    pub legacy_configs: Vec<PathBuf>,
}

/// Migration report extended with discovery data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoMigrationReport {
    /// Discovery data
    pub auto_discovery: DiscoverySummary,
    /// Registry report after migrating
    #[serde(flatten)]
    pub report: MigrationReport,
}

/// Extract the `UnifiedConfig` overlay from a unified document.
///
/// Accepts both the client-config shape (`module_config`, `feature_flags`)
/// and a bare serialized `UnifiedConfig`.
pub fn config_overlay(doc: &Value) -> Value {
    let mut overlay = Map::new();
    if let Some(mode) = doc.get("mode") {
        overlay.insert("mode".to_string(), mode.clone());
    }

    let sections = doc.get("module_config").and_then(|v| v.as_object()).or_else(|| doc.as_object());
    if let Some(sections) = sections {
        for name in SECTIONS {
            if let Some(section) = sections.get(name).filter(|v| v.is_object()) {
                overlay.insert(name.to_string(), section.clone());
            }
        }
    }

    if !overlay.contains_key("monitoring") {
        if let Some(enabled) = doc.pointer("/feature_flags/monitoring").and_then(|v| v.as_bool()) {
            overlay.insert("monitoring".to_string(), json!({ "enabled": enabled }));
        }
    }

    Value::Object(overlay)
}

/// Resolve a unified document into a config (defaults + overlay).
pub fn config_from_document(doc: &Value) -> Result<UnifiedConfig> {
    let mut value = UnifiedConfig::default().to_value();
    merge_json(&mut value, &config_overlay(doc));
    UnifiedConfig::from_value(&value)
}

/// Convert legacy documents into one unified document.
///
/// Returns the document and a change log.
pub fn unified_from_legacy(sources: &[(PathBuf, Value)]) -> (Value, Vec<String>) {
    let mut changes = Vec::new();
    let mut servers = Map::new();
    let mut mode: Option<ServerMode> = None;
    let (mut collaboration, mut intelligence, mut caching) = (false, false, false);
    let mut monitoring: Option<bool> = None;
    let mut env_count = 0;

    for (path, doc) in sources {
        let Some(source_servers) = doc.get("mcpServers").and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, server) in source_servers {
            if !servers.contains_key(name) {
                servers.insert(name.clone(), server.clone());
            }
            if !name.contains("aceflow") {
                continue;
            }
            let env = legacy_env(server);
            env_count += env.len();
            collaboration |= env_flag(&env, "ENABLE_COLLABORATION");
            intelligence |= env_flag(&env, "ENABLE_INTELLIGENCE");
            caching |= env_flag(&env, "ENABLE_CACHING");
            if env.contains_key("ENABLE_MONITORING") {
                monitoring = Some(monitoring.unwrap_or(false) | env_flag(&env, "ENABLE_MONITORING"));
            }
            if mode.is_none() {
                mode = env.get("ACEFLOW_MODE").and_then(|v| v.as_str()).and_then(ServerMode::parse);
            }
            if name.contains("enhanced") && !(collaboration || intelligence) {
                changes.push(format!("Server '{}' from {} has no feature switches", name, path.display()));
            }
        }
    }

    let mode = match mode {
        Some(ServerMode::Basic) if collaboration || intelligence => ServerMode::Enhanced,
        Some(m) => m,
        None if collaboration || intelligence => ServerMode::Enhanced,
        None => ServerMode::Standard,
    };
    let monitoring = monitoring.unwrap_or(mode != ServerMode::Basic);

    changes.push(format!("Converted {} environment variables to module settings", env_count));
    changes.push(format!("Set unified mode to '{}'", mode));

    let doc = json!({
        "version": UNIFIED_VERSION,
        "unified_mode": true,
        "mode": mode.as_str(),
        "mcpServers": servers,
        "module_config": {
            "core": { "enabled": true },
            "collaboration": { "enabled": collaboration },
            "intelligence": { "enabled": intelligence },
            "monitoring": { "enabled": monitoring }
        },
        "feature_flags": {
            "caching": caching,
            "monitoring": monitoring,
            "collaboration": collaboration,
            "intelligent_recommendations": intelligence
        },
        "migration_info": {
            "migrated_at": chrono::Utc::now(),
            "source_configs": sources.iter().map(|(p, _)| p.display().to_string()).collect::<Vec<_>>()
        }
    });

    (doc, changes)
}

/// Migrates legacy configs and remembers what it did.
#[derive(Debug, Default)]
pub struct ConfigMigrator {
    detector: ConfigDetector,
    migrations: Vec<MigrationResult>,
}

impl ConfigMigrator {
    /// Create a migrator with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a migration.
    pub fn get_migration(&self, id: MigrationId) -> Option<&MigrationResult> {
        self.migrations.iter().find(|m| m.migration_id == id)
    }

    /// Migrate one file.
    pub async fn migrate_file(&mut self, path: &Path, strategy: MigrationStrategy) -> MigrationResult {
        let result = self.run(&[path.to_path_buf()], strategy).await;
        self.migrations.push(result.clone());
        result
    }

    /// Migrate several files, either one by one or merged into a single
    /// target (in which case the strategy is recorded as `Merge`).
    pub async fn migrate_files(
        &mut self,
        paths: &[PathBuf],
        strategy: MigrationStrategy,
        merge_into_single: bool,
    ) -> Vec<MigrationResult> {
        if merge_into_single {
            let result = self.run(paths, MigrationStrategy::Merge).await;
            self.migrations.push(result.clone());
            return vec![result];
        }

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.migrate_file(path, strategy).await);
        }
        results
    }

    async fn run(&self, paths: &[PathBuf], strategy: MigrationStrategy) -> MigrationResult {
        let mut result = MigrationResult::new(paths, strategy);
        if paths.is_empty() {
            return result.fail("No source files given");
        }

        let mut sources = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let detection = match self.load_legacy(path).await {
                Ok(d) => d,
                Err(e) => return result.fail(e),
            };
            if i == 0 {
                result.source_type = detection.0.config_type;
            }
            result
                .changes_made
                .push(format!("Detected {} configuration in {}", detection.0.config_type, path.display()));
            sources.push((path.clone(), detection.1));
        }

        let (doc, changes) = unified_from_legacy(&sources);
        result.changes_made.extend(changes);

        let source = &paths[0];
        let target = match strategy {
            MigrationStrategy::BackupAndReplace => {
                let backup = backup_path(source);
                if let Err(e) = fs::copy(source, &backup).await {
                    return result.fail(format!("Failed to create backup: {}", e));
                }
                result.changes_made.push(format!("Created backup at {}", backup.display()));
                result.backup_file = Some(backup);
                source.clone()
            }
            MigrationStrategy::CreateNew => sibling(source, &format!("{}_unified.json", file_stem(source))),
            MigrationStrategy::Merge => sibling(source, "aceflow_unified.json"),
        };

        if let Err(e) = write_json_atomic(&target, &doc).await {
            return result.fail(format!("Failed to write {}: {}", target.display(), e));
        }
        result.changes_made.push(format!("Generated unified config at {}", target.display()));
        result.target_file = Some(target);

        result.validation_errors = validate_unified(&self.detector, &doc);
        result.validation_passed = result.validation_errors.is_empty();
        result.status = MigrationStatus::Completed;
        info!(
            "Migration {} completed ({}, {} source(s))",
            result.migration_id,
            strategy,
            paths.len()
        );
        result
    }

    async fn load_legacy(&self, path: &Path) -> std::result::Result<(DetectionResult, Value), String> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| format!("Source file not found or unreadable: {} ({})", path.display(), e))?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| format!("Malformed JSON in {}: {}", path.display(), e))?;
        let detection = self.detector.detect_value(&doc);
        if !detection.config_type.is_legacy() {
            return Err(format!(
                "{} is {} and cannot be migrated",
                path.display(),
                detection.config_type
            ));
        }
        Ok((detection, doc))
    }

    /// Undo a completed migration. Returns false for unknown ids or
    /// migrations that are not in the `Completed` state.
    pub async fn rollback_migration(&mut self, id: MigrationId) -> Result<bool> {
        let Some(migration) = self.migrations.iter_mut().find(|m| m.migration_id == id) else {
            return Ok(false);
        };
        if migration.status != MigrationStatus::Completed {
            return Ok(false);
        }

        match (&migration.backup_file, &migration.target_file) {
            (Some(backup), _) => {
                fs::copy(backup, &migration.source_file).await?;
                migration.changes_made.push(format!("Restored {} from backup", migration.source_file.display()));
            }
            (None, Some(target)) => {
                match fs::remove_file(target).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                migration.changes_made.push(format!("Removed {}", target.display()));
            }
            (None, None) => {}
        }

        migration.status = MigrationStatus::RolledBack;
        info!("Migration {} rolled back", id);
        Ok(true)
    }

    /// Aggregate over every migration so far.
    pub fn get_migration_report(&self) -> MigrationReport {
        let count = |s: MigrationStatus| self.migrations.iter().filter(|m| m.status == s).count();
        let total = self.migrations.len();
        let completed = count(MigrationStatus::Completed);
        let failed = count(MigrationStatus::Failed);
        let rolled_back = count(MigrationStatus::RolledBack);

        MigrationReport {
            summary: format!(
                "{} migration(s): {} completed, {} failed, {} rolled back",
                total, completed, failed, rolled_back
            ),
            total_migrations: total,
            completed_migrations: completed,
            failed_migrations: failed,
            rolled_back_migrations: rolled_back,
            success_rate: if total == 0 { 0.0 } else { completed as f64 / total as f64 },
            migrations: self
                .migrations
                .iter()
                .map(|m| MigrationSummary {
                    migration_id: m.migration_id,
                    source_file: m.source_file.clone(),
                    target_file: m.target_file.clone(),
                    status: m.status,
                    validation_passed: m.validation_passed,
                    strategy: m.strategy,
                })
                .collect(),
        }
    }

    /// Find legacy configs under `search_paths` and migrate each of them.
    pub async fn auto_discover_and_migrate(
        &mut self,
        search_paths: &[PathBuf],
        strategy: MigrationStrategy,
    ) -> Result<AutoMigrationReport> {
        let detections = self.detector.detect_paths(search_paths).await?;
        let legacy: Vec<PathBuf> = detections
            .iter()
            .filter(|d| d.config_type.is_legacy())
            .filter_map(|d| d.file_path.clone())
            .collect();

        info!(
            "Auto-discovery found {} config(s), {} legacy",
            detections.len(),
            legacy.len()
        );
        for path in &legacy {
            self.migrate_file(path, strategy).await;
        }

        Ok(AutoMigrationReport {
            auto_discovery: DiscoverySummary {
                search_paths: search_paths.to_vec(),
                total_configs_found: detections.len(),
                legacy_configs: legacy,
            },
            report: self.get_migration_report(),
        })
    }
}

fn validate_unified(detector: &ConfigDetector, doc: &Value) -> Vec<String> {
    let detection = detector.detect_value(doc);
    let mut errors = detection.validation_errors;
    if detection.config_type != ConfigType::AceflowUnified {
        errors.push(format!("Output detected as {}, expected aceflow_unified", detection.config_type));
    }
    match config_from_document(doc) {
        Ok(config) => errors.extend(config.validation_errors()),
        Err(e) => errors.push(e.to_string()),
    }
    errors
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config")
        .to_string()
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent().map(|p| p.join(name)).unwrap_or_else(|| PathBuf::from(name))
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("config.json");
    sibling(path, &format!("{}.backup_{}", name, stamp))
}

/// Write pretty JSON to a temp file, then rename it over `path`.
pub(crate) async fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        path
    }

    fn basic() -> Value {
        json!({"mcpServers": {"aceflow-server": {
            "command": "uvx",
            "args": ["aceflow-mcp-server@latest"],
            "env": {"ACEFLOW_MODE": "basic", "ENABLE_CACHING": "true"}
        }}})
    }

    fn enhanced() -> Value {
        json!({
            "mcpServers": {"aceflow-enhanced-server": {
                "command": "uvx",
                "args": ["aceflow-enhanced-mcp-server@latest"],
                "env": {
                    "ENABLE_COLLABORATION": "true",
                    "ENABLE_INTELLIGENCE": "true",
                    "ENABLE_MONITORING": "true"
                }
            }},
            "version": "1.5"
        })
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_backup_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "aceflow-basic.json", basic());
        let mut migrator = ConfigMigrator::new();

        let result = migrator.migrate_file(&source, MigrationStrategy::BackupAndReplace).await;
        assert_eq!(result.status, MigrationStatus::Completed);
        assert_eq!(result.source_type, ConfigType::AceflowBasic);
        assert!(result.backup_file.as_ref().unwrap().exists());
        assert_eq!(result.target_file.as_deref(), Some(source.as_path()));

        let unified = read(&source);
        assert_eq!(unified["version"], "2.0");
        assert_eq!(unified["unified_mode"], true);
        assert_eq!(unified["mode"], "basic");
        assert_eq!(unified["module_config"]["core"]["enabled"], true);
        assert_eq!(unified["feature_flags"]["caching"], true);

        let lower: Vec<String> = result.changes_made.iter().map(|c| c.to_lowercase()).collect();
        assert!(lower.iter().any(|c| c.contains("backup")));
        assert!(lower.iter().any(|c| c.contains("unified config")));
        assert!(result.validation_passed, "{:?}", result.validation_errors);
    }

    #[tokio::test]
    async fn test_create_new_enhanced() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "aceflow-enhanced.json", enhanced());
        let mut migrator = ConfigMigrator::new();

        let result = migrator.migrate_file(&source, MigrationStrategy::CreateNew).await;
        assert_eq!(result.status, MigrationStatus::Completed);
        assert_eq!(result.source_type, ConfigType::AceflowEnhanced);
        assert!(result.backup_file.is_none());

        let target = result.target_file.clone().unwrap();
        assert_eq!(target, dir.path().join("aceflow-enhanced_unified.json"));
        let unified = read(&target);
        assert_eq!(unified["mode"], "enhanced");
        assert_eq!(unified["module_config"]["collaboration"]["enabled"], true);
        assert_eq!(unified["module_config"]["intelligence"]["enabled"], true);
        assert_eq!(unified["feature_flags"]["intelligent_recommendations"], true);
        assert!(result.validation_passed);

        // Source untouched.
        assert_eq!(read(&source), enhanced());
    }

    #[tokio::test]
    async fn test_merge_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "aceflow-basic.json", basic());
        let b = write(dir.path(), "aceflow-enhanced.json", enhanced());
        let mut migrator = ConfigMigrator::new();

        let results = migrator
            .migrate_files(&[a, b], MigrationStrategy::BackupAndReplace, true)
            .await;
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.status, MigrationStatus::Completed);
        assert_eq!(result.strategy, MigrationStrategy::Merge);

        let unified = read(result.target_file.as_ref().unwrap());
        assert!(unified["mcpServers"].as_object().unwrap().len() >= 2);
        assert_eq!(unified["module_config"]["collaboration"]["enabled"], true);
        assert_eq!(unified["module_config"]["intelligence"]["enabled"], true);
        assert_eq!(unified["migration_info"]["source_configs"].as_array().unwrap().len(), 2);
        // Legacy basic mode cannot carry enhanced modules.
        assert_eq!(unified["mode"], "enhanced");
    }

    #[tokio::test]
    async fn test_rollback_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "aceflow-basic.json", basic());
        let original = std::fs::read_to_string(&source).unwrap();
        let mut migrator = ConfigMigrator::new();

        let result = migrator.migrate_file(&source, MigrationStrategy::BackupAndReplace).await;
        assert!(migrator.rollback_migration(result.migration_id).await.unwrap());
        assert_eq!(std::fs::read_to_string(&source).unwrap(), original);
        assert_eq!(
            migrator.get_migration(result.migration_id).unwrap().status,
            MigrationStatus::RolledBack
        );
        // Second rollback is a no-op.
        assert!(!migrator.rollback_migration(result.migration_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_create_new_removes_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "aceflow-basic.json", basic());
        let mut migrator = ConfigMigrator::new();

        let result = migrator.migrate_file(&source, MigrationStrategy::CreateNew).await;
        let target = result.target_file.clone().unwrap();
        assert!(target.exists());
        assert!(migrator.rollback_migration(result.migration_id).await.unwrap());
        assert!(!target.exists());
        assert!(!migrator.rollback_migration(MigrationId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let mut migrator = ConfigMigrator::new();
        let result = migrator
            .migrate_file(Path::new("nonexistent_file.json"), MigrationStrategy::CreateNew)
            .await;
        assert_eq!(result.status, MigrationStatus::Failed);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_report_and_auto_discovery() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "aceflow-basic.json", basic());
        write(dir.path(), "aceflow-enhanced.json", enhanced());
        write(dir.path(), "other.json", json!({"mcpServers": {"x": {"command": "y"}}}));
        let mut migrator = ConfigMigrator::new();

        let auto = migrator
            .auto_discover_and_migrate(&[dir.path().to_path_buf()], MigrationStrategy::CreateNew)
            .await
            .unwrap();
        assert_eq!(auto.auto_discovery.total_configs_found, 3);
        assert_eq!(auto.auto_discovery.legacy_configs.len(), 2);
        assert_eq!(auto.report.total_migrations, 2);
        assert_eq!(auto.report.completed_migrations, 2);
        assert_eq!(auto.report.success_rate, 1.0);

        let json = serde_json::to_value(&auto).unwrap();
        assert!(json["auto_discovery"]["total_configs_found"].is_number());
        assert!(json["migrations"][0]["migration_id"].is_string());
    }

    #[test]
    fn test_config_overlay_shapes() {
        let doc = json!({
            "mode": "enhanced",
            "module_config": {"collaboration": {"enabled": true}},
            "feature_flags": {"monitoring": false}
        });
        let config = config_from_document(&doc).unwrap();
        assert_eq!(config.mode, "enhanced");
        assert!(config.collaboration.enabled);
        assert!(!config.monitoring.enabled);

        let bare = UnifiedConfig::for_mode(ServerMode::Enhanced).to_value();
        assert_eq!(config_from_document(&bare).unwrap(), UnifiedConfig::for_mode(ServerMode::Enhanced));
    }
}
