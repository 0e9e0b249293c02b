//! Core workflow module: project setup, stage control and validation.

use aceflow_core::{InitMode, ProjectState, Stage, StageGuide, ToolName, STATE_VERSION};
use aceflow_storage::{ProjectStore, StorageError, RESULT_DIR, STATE_DIR};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{ModuleError, Result};
use crate::manager::ModuleFactory;
use crate::module::{Module, ModuleBase, ModuleConfig, ModuleMetadata};
use crate::params::{bool_param, required_str, str_param};
use crate::templates;

/// Module name.
pub const CORE_MODULE: &str = "core";

const STAGE_ACTIONS: [&str; 6] = ["status", "list", "next", "set", "reset", "execute"];

const PRD_CANDIDATES: [&str; 4] = ["PRD.md", "prd.md", "requirements.md", "docs/PRD.md"];

/// Validation check: name, score, message on pass, message otherwise.
type CheckSpec = (&'static str, f64, &'static str, &'static str);

const BASIC_CHECKS: [CheckSpec; 3] = [
    ("project_structure", 0.9, "Project structure is in place", "Missing .aceflow directory; run aceflow_init"),
    ("configuration_files", 0.85, "Configuration files are well-formed", "Configuration files need attention"),
    ("basic_syntax", 0.95, "No syntax problems found", "Syntax problems found"),
];

const STANDARD_CHECKS: [CheckSpec; 3] = [
    ("code_quality", 0.75, "Code quality is good", "Code quality could be improved"),
    ("documentation", 0.7, "Documentation is complete", "Documentation is incomplete"),
    ("test_coverage", 0.6, "Test coverage meets the target", "Test coverage is below the target"),
];

const COMPREHENSIVE_CHECKS: [CheckSpec; 3] = [
    ("security_scan", 0.8, "No known security issues", "Security issues found"),
    ("performance_analysis", 0.75, "No performance problems", "Some performance hotspots found"),
    ("dependency_audit", 0.9, "Dependencies are up to date", "Outdated dependencies found"),
];

/// Score of a structure check on a project without `.aceflow/`.
const MISSING_STRUCTURE_SCORE: f64 = 0.3;

fn check_status(score: f64) -> &'static str {
    if score >= 0.8 {
        "pass"
    } else if score >= 0.65 {
        "warning"
    } else {
        "fail"
    }
}

fn grade(score: f64) -> &'static str {
    match score {
        s if s >= 0.9 => "A",
        s if s >= 0.8 => "B",
        s if s >= 0.7 => "C",
        s if s >= 0.6 => "D",
        _ => "F",
    }
}

/// Builds [`CoreModule`] instances bound to one project directory.
pub struct CoreModuleFactory {
    store: ProjectStore,
}

impl CoreModuleFactory {
    /// Factory for the project at `store`.
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }
}

impl ModuleFactory for CoreModuleFactory {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(CORE_MODULE, "1.0.0", "Project initialization, stage management and validation")
            .provides(ToolName::AceflowInit)
            .provides(ToolName::AceflowStage)
            .provides(ToolName::AceflowValidate)
            .tag("workflow")
    }

    fn create(&self, config: ModuleConfig) -> Box<dyn Module> {
        Box::new(CoreModule::new(ModuleBase::new(self.metadata(), config), self.store.clone()))
    }
}

/// Core module.
pub struct CoreModule {
    base: ModuleBase,
    store: ProjectStore,
}

impl CoreModule {
    fn new(base: ModuleBase, store: ProjectStore) -> Self {
        Self { base, store }
    }

    fn quality_threshold(&self) -> f64 {
        self.base.config.f64_setting("quality_threshold", 0.8)
    }

    // === aceflow_init ===

    async fn init(&self, params: &Value) -> Result<Value> {
        let mode_name = str_param(params, "mode")
            .unwrap_or_else(|| self.base.config.str_setting("default_mode", "standard"))
            .to_string();
        let mode = InitMode::parse(&mode_name).ok_or_else(|| {
            let valid: Vec<&str> = InitMode::ALL.iter().map(|m| m.as_str()).collect();
            ModuleError::InvalidParams(format!("Invalid mode '{}'; expected one of: {}", mode_name, valid.join(", ")))
        })?;

        let store = match str_param(params, "directory") {
            Some(dir) => ProjectStore::new(self.store.root().join(dir)),
            None => self.store.clone(),
        };
        if store.is_initialized().await {
            return Err(StorageError::AlreadyExists(format!(
                "Project already initialized at {}",
                store.state_dir().display()
            ))
            .into());
        }

        store.create_dir(STATE_DIR).await?;
        store.create_dir(RESULT_DIR).await?;
        let mut created = vec![format!("{}/", STATE_DIR), format!("{}/", RESULT_DIR)];

        let project_name = match str_param(params, "project_name") {
            Some(name) => name.to_string(),
            None => tokio::fs::canonicalize(store.root())
                .await
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "aceflow-project".to_string()),
        };

        let state = ProjectState::new(project_name.clone(), mode);
        store.save_state(&state).await?;
        created.push(format!("{}/current_state.json", STATE_DIR));

        store
            .save_project_config(&json!({
                "project_name": project_name,
                "mode": mode.as_str(),
                "created_at": state.project.created_at,
                "version": STATE_VERSION,
                "quality_threshold": self.quality_threshold(),
            }))
            .await?;
        created.push(format!("{}/config.json", STATE_DIR));

        let overrides = runtime_overrides(params);
        if !overrides.is_empty() {
            store.save_runtime_config(&Value::Object(overrides)).await?;
            created.push(format!("{}/runtime_config.json", STATE_DIR));
        }

        if mode.writes_readme() {
            let exists = tokio::fs::try_exists(store.root().join("README.md")).await.unwrap_or(false);
            if !exists {
                store.write_file("README.md", &templates::readme(&project_name, mode)).await?;
                created.push("README.md".to_string());
            }
        }

        if mode.writes_skeleton() {
            for dir in ["src", "tests", "docs"] {
                store.create_dir(dir).await?;
                created.push(format!("{}/", dir));
            }
        }

        info!("Initialized project {} ({} mode) at {}", project_name, mode, store.root().display());

        Ok(json!({
            "message": format!("Project '{}' initialized in {} mode", project_name, mode),
            "project_info": {
                "name": project_name,
                "mode": mode.as_str(),
                "directory": store.root().display().to_string(),
                "created_files": created,
            },
        }))
    }

    // === aceflow_stage ===

    async fn stage(&self, params: &Value) -> Result<Value> {
        let action = str_param(params, "action").unwrap_or("status");
        debug!("Stage action: {}", action);

        match action {
            "status" => self.stage_status().await,
            "list" => self.stage_list().await,
            "next" => self.stage_next().await,
            "set" => self.stage_set(required_str(params, "stage")?).await,
            "reset" => self.stage_reset().await,
            "execute" => self.stage_execute(str_param(params, "stage")).await,
            other => Err(ModuleError::InvalidParams(format!(
                "Unknown stage action '{}'; expected one of: {}",
                other,
                STAGE_ACTIONS.join(", ")
            ))),
        }
    }

    async fn stage_status(&self) -> Result<Value> {
        let state = self.store.require_state().await?;
        let guide = StageGuide::for_stage(state.flow.current_stage);
        Ok(json!({
            "action": "status",
            "project_name": state.project.name,
            "current_stage": state.flow.current_stage,
            "completed_stages": state.flow.completed_stages,
            "progress_percentage": state.flow.progress_percentage,
            "next_stage": state.flow.current_stage.next(),
            "stage_title": guide.title,
            "estimated_time": guide.estimated_time,
        }))
    }

    async fn stage_list(&self) -> Result<Value> {
        let state = self.store.require_state().await?;
        let stages: Vec<Value> = Stage::ALL
            .iter()
            .map(|stage| {
                json!({
                    "name": stage.as_str(),
                    "display_name": stage.display_name(),
                    "index": stage.index(),
                    "status": state.stage_status(*stage),
                })
            })
            .collect();
        Ok(json!({
            "action": "list",
            "current_stage": state.flow.current_stage,
            "stages": stages,
        }))
    }

    async fn stage_next(&self) -> Result<Value> {
        let mut state = self.store.require_state().await?;
        let previous = state.flow.current_stage;
        let current = state
            .advance()
            .ok_or_else(|| ModuleError::Other(format!("Already at final stage: {}", previous)))?;
        self.store.save_state(&state).await?;
        info!("Advanced stage {} -> {}", previous, current);

        Ok(json!({
            "action": "next",
            "previous_stage": previous,
            "current_stage": current,
            "progress_percentage": state.flow.progress_percentage,
            "message": format!("Advanced from {} to {}", previous, current),
        }))
    }

    async fn stage_set(&self, name: &str) -> Result<Value> {
        let stage = Stage::parse(name).ok_or_else(|| {
            let valid: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
            ModuleError::InvalidParams(format!("Unknown stage '{}'; expected one of: {}", name, valid.join(", ")))
        })?;
        let mut state = self.store.require_state().await?;
        state.set_stage(stage);
        self.store.save_state(&state).await?;

        Ok(json!({
            "action": "set",
            "current_stage": stage,
            "completed_stages": state.flow.completed_stages,
            "progress_percentage": state.flow.progress_percentage,
            "message": format!("Stage set to {}", stage),
        }))
    }

    async fn stage_reset(&self) -> Result<Value> {
        let mut state = self.store.require_state().await?;
        state.reset();
        self.store.save_state(&state).await?;

        Ok(json!({
            "action": "reset",
            "current_stage": state.flow.current_stage,
            "progress_percentage": state.flow.progress_percentage,
            "message": "Workflow reset to initialization",
        }))
    }

    async fn find_prd(&self) -> Option<String> {
        for candidate in PRD_CANDIDATES {
            if let Ok(content) = tokio::fs::read_to_string(self.store.root().join(candidate)).await {
                debug!("Using requirements document {}", candidate);
                return Some(content);
            }
        }
        None
    }

    async fn stage_execute(&self, stage_name: Option<&str>) -> Result<Value> {
        let started = Instant::now();
        let mut state = self.store.require_state().await?;
        let stage = match stage_name {
            Some(name) => Stage::parse(name)
                .ok_or_else(|| ModuleError::InvalidParams(format!("Unknown stage '{}'", name)))?,
            None => state.flow.current_stage,
        };

        let mut warnings = Vec::new();
        let prd = if stage == Stage::Planning {
            let prd = self.find_prd().await;
            if prd.is_none() {
                warnings.push("No requirements document found; generated a default task breakdown".to_string());
            }
            prd
        } else {
            None
        };

        let document = templates::stage_document(&state.project.name, stage, prd.as_deref());
        let output_path = self.store.write_stage_result(stage, &document).await?;
        let quality_score = if warnings.is_empty() { 0.9 } else { 0.8 };

        let mut advanced_to = None;
        if self.base.config.bool_setting("auto_advance", false) && stage == state.flow.current_stage {
            advanced_to = state.advance();
            if advanced_to.is_some() {
                self.store.save_state(&state).await?;
            }
        }

        info!("Executed stage {} -> {}", stage, output_path.display());

        Ok(json!({
            "action": "execute",
            "stage_id": stage,
            "output_path": output_path.display().to_string(),
            "quality_score": quality_score,
            "execution_time": started.elapsed().as_secs_f64() * 1000.0,
            "warnings": warnings,
            "advanced_to": advanced_to,
            "message": format!("Stage {} executed", stage),
        }))
    }

    // === aceflow_validate ===

    async fn validate(&self, params: &Value) -> Result<Value> {
        let mode = str_param(params, "mode").unwrap_or("basic");
        let fix = bool_param(params, "fix").unwrap_or(false);

        let mut specs: Vec<CheckSpec> = BASIC_CHECKS.to_vec();
        match mode {
            "basic" => {}
            "standard" => specs.extend(STANDARD_CHECKS),
            "comprehensive" => {
                specs.extend(STANDARD_CHECKS);
                specs.extend(COMPREHENSIVE_CHECKS);
            }
            other => {
                return Err(ModuleError::InvalidParams(format!(
                    "Unknown validation mode '{}'; expected one of: basic, standard, comprehensive",
                    other
                )))
            }
        }

        let initialized = self.store.is_initialized().await;
        let mut checks = Vec::with_capacity(specs.len());
        let mut recommendations = Vec::new();
        let mut total = 0.0;
        let (mut issues_found, mut warnings) = (0, 0);

        for (name, score, ok_message, issue_message) in specs {
            let score = if name == "project_structure" && !initialized { MISSING_STRUCTURE_SCORE } else { score };
            let status = check_status(score);
            let message = if status == "pass" { ok_message } else { issue_message };
            if status != "pass" {
                issues_found += 1;
                recommendations.push(format!("{} ({})", issue_message, name));
            }
            if status == "warning" {
                warnings += 1;
            }
            total += score;
            checks.push(json!({"name": name, "score": score, "status": status, "message": message}));
        }

        let overall = total / checks.len() as f64;
        let threshold = self.quality_threshold();

        Ok(json!({
            "validation_mode": mode,
            "overall_score": overall,
            "grade": grade(overall),
            "quality_threshold": threshold,
            "meets_threshold": overall >= threshold,
            "checks": checks,
            "issues_found": issues_found,
            "issues_fixed": if fix { warnings } else { 0 },
            "fix_applied": fix,
            "recommendations": recommendations,
            "timestamp": chrono::Utc::now(),
        }))
    }
}

/// `config_*` parameters with the prefix stripped.
fn runtime_overrides(params: &Value) -> Map<String, Value> {
    params
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| k.strip_prefix("config_").map(|key| (key.to_string(), v.clone())))
                .filter(|(k, _)| !k.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Module for CoreModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn do_initialize(&mut self) -> Result<bool> {
        debug!("Core module bound to {}", self.store.root().display());
        Ok(true)
    }

    async fn do_cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn health_status(&self) -> Value {
        json!({
            "healthy": true,
            "status": "running",
            "project_root": self.store.root().display().to_string(),
            "tools_available": self.base.metadata.provides,
        })
    }

    async fn handle(&mut self, tool: ToolName, params: &Value) -> Result<Value> {
        match tool {
            ToolName::AceflowInit => self.init(params).await,
            ToolName::AceflowStage => self.stage(params).await,
            ToolName::AceflowValidate => self.validate(params).await,
            other => Err(ModuleError::UnsupportedTool {
                module: CORE_MODULE.to_string(),
                tool: other,
            }),
        }
    }
}
