//! Unified server.
//!
//! Composes configuration, modules, routing, monitoring and the resource
//! cache into one value. Every shared component sits behind its own
//! `Arc<Mutex<_>>`; locks are taken one at a time and never held across a
//! call into another component.

use aceflow_config::{merge_json, ConfigManager, ServerMode, UnifiedConfig};
use aceflow_core::{Stage, StageGuide, ToolName, UnknownTool, WorkflowDefinition};
use aceflow_modules::{
    CollaborationModuleFactory, CoreModuleFactory, IntelligenceModuleFactory, ModuleConfig, ModuleFactory,
    ModuleManager, COLLABORATION_MODULE, CORE_MODULE, INTELLIGENCE_MODULE,
};
use aceflow_monitor::UsageMonitor;
use aceflow_router::{ExecutionPlan, FunctionRouter};
use aceflow_storage::{ProjectStore, ResourceCache};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::resources::{parse_uri, AccessLevel, ResourceKind, ResourceRoute, ResourceRouter, ANONYMOUS_USER};

/// User the stdio client acts as.
pub const LOCAL_USER: &str = "local";

/// How to build a [`UnifiedServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Project working directory
    pub project_dir: PathBuf,
    /// Unified or legacy config file
    pub config_path: Option<PathBuf>,
    /// Highest-precedence config patch
    pub runtime_overrides: Option<Value>,
    /// Migrate a legacy config file on load
    pub auto_migrate: bool,
    /// Read `ACEFLOW_*` environment overrides
    pub use_env: bool,
    /// Access level of [`LOCAL_USER`]
    pub local_access: AccessLevel,
}

impl ServerOptions {
    /// Options for a project directory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            config_path: None,
            runtime_overrides: None,
            auto_migrate: false,
            use_env: true,
            local_access: AccessLevel::Admin,
        }
    }

    /// Read configuration from `path`.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Apply `overrides` on top of file and environment.
    pub fn runtime_overrides(mut self, overrides: Value) -> Self {
        self.runtime_overrides = Some(overrides);
        self
    }

    /// Feature presets of `mode`. Overrides already set take precedence.
    pub fn mode(mut self, mode: ServerMode) -> Self {
        let mut preset = match mode {
            ServerMode::Basic => json!({
                "collaboration": {"enabled": false},
                "intelligence": {"enabled": false},
                "monitoring": {"enabled": false},
            }),
            ServerMode::Standard => json!({}),
            ServerMode::Enhanced => json!({
                "collaboration": {"enabled": true},
                "intelligence": {"enabled": true},
            }),
        };
        merge_json(&mut preset, &json!({ "mode": mode.as_str() }));
        if let Some(existing) = &self.runtime_overrides {
            merge_json(&mut preset, existing);
        }
        self.runtime_overrides = Some(preset);
        self
    }

    /// Migrate legacy config files on load.
    pub fn auto_migrate(mut self) -> Self {
        self.auto_migrate = true;
        self
    }

    /// Ignore `ACEFLOW_*` variables.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Access level of the local client.
    pub fn local_access(mut self, level: AccessLevel) -> Self {
        self.local_access = level;
        self
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Result of a successful tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Tool called
    pub tool: ToolName,
    /// Module that served the call
    pub executed_by: String,
    /// Handler output
    pub result: Value,
    /// Plan the router made
    pub plan: ExecutionPlan,
    /// Wall time of the handler
    pub duration_ms: f64,
}

impl ToolOutcome {
    /// Boundary dictionary of a successful call.
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "success": true,
            "result": self.result,
            "execution_plan": {
                "mode": self.plan.mode.as_str(),
                "primary_module": self.plan.primary_module,
                "enhancement_modules": self.plan.enhancement_modules,
                "confidence": self.plan.confidence,
                "executed_by": self.executed_by,
            },
            "duration_ms": self.duration_ms,
        });
        if let (Some(message), Some(map)) = (self.result.get("message").cloned(), out.as_object_mut()) {
            map.insert("message".to_string(), message);
        }
        out
    }
}

/// Boundary dictionary of a failed call.
pub fn error_json(error: &ServerError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
        "error_type": error.kind(),
    })
}

/// The AceFlow server.
pub struct UnifiedServer {
    options: ServerOptions,
    store: ProjectStore,
    config: Arc<Mutex<ConfigManager>>,
    modules: Arc<Mutex<ModuleManager>>,
    router: Arc<Mutex<FunctionRouter>>,
    monitor: Arc<Mutex<UsageMonitor>>,
    cache: Arc<Mutex<ResourceCache>>,
    resources: Mutex<ResourceRouter>,
    tools: RwLock<Vec<(ToolName, String)>>,
    initialized: AtomicBool,
    running: AtomicBool,
}

impl UnifiedServer {
    /// Server with default configuration; call [`UnifiedServer::initialize`] next.
    pub fn new(options: ServerOptions) -> Self {
        let store = ProjectStore::new(options.project_dir.clone());
        let mut config = ConfigManager::new(options.config_path.clone());
        if !options.use_env {
            config = config.without_env();
        }
        let defaults = config.get_config().clone();

        let mut resources = ResourceRouter::new();
        resources.grant(LOCAL_USER, options.local_access);

        Self {
            store,
            config: Arc::new(Mutex::new(config)),
            modules: Arc::new(Mutex::new(ModuleManager::new())),
            router: Arc::new(Mutex::new(FunctionRouter::new(&defaults))),
            monitor: Arc::new(Mutex::new(UsageMonitor::in_memory(defaults.monitoring.clone()))),
            cache: Arc::new(Mutex::new(ResourceCache::new())),
            resources: Mutex::new(resources),
            tools: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            options,
        }
    }

    /// Project file layer.
    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether `start` has been called since the last `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The active configuration.
    pub async fn config(&self) -> UnifiedConfig {
        self.config.lock().await.get_config().clone()
    }

    /// Shared usage monitor.
    pub fn monitor(&self) -> Arc<Mutex<UsageMonitor>> {
        Arc::clone(&self.monitor)
    }

    fn module_registrations(&self, config: &UnifiedConfig) -> Vec<(&'static str, Box<dyn ModuleFactory>, ModuleConfig)> {
        let core: Box<dyn ModuleFactory> = Box::new(CoreModuleFactory::new(self.store.clone()));
        let collaboration: Box<dyn ModuleFactory> = Box::new(CollaborationModuleFactory::new(self.store.clone()));
        let intelligence: Box<dyn ModuleFactory> = Box::new(IntelligenceModuleFactory::new(self.store.clone()));
        vec![
            (CORE_MODULE, core, ModuleConfig::from_section(&config.core)),
            (COLLABORATION_MODULE, collaboration, ModuleConfig::from_section(&config.collaboration)),
            (INTELLIGENCE_MODULE, intelligence, ModuleConfig::from_section(&config.intelligence)),
        ]
    }

    /// Load configuration, register and initialize modules, publish tools.
    ///
    /// Calling it again after success does nothing.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let config = {
            let mut manager = self.config.lock().await;
            manager
                .load_config(self.options.runtime_overrides.as_ref(), self.options.auto_migrate)
                .await?
                .clone()
        };
        self.router.lock().await.update_config(&config);
        self.install_monitor(&config).await;

        {
            let mut modules = self.modules.lock().await;
            for (name, factory, module_config) in self.module_registrations(&config) {
                if !modules.is_registered(name) {
                    modules.register_module(name, factory, module_config)?;
                }
            }
            let results = modules.initialize_all_modules().await?;
            for (name, ok) in &results {
                if !ok {
                    warn!("Module {} failed to initialize", name);
                }
            }
        }

        let tool_count = self.refresh_tools().await;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "AceFlow server initialized in {} mode ({} tools, {} resources)",
            config.mode,
            tool_count,
            ResourceKind::ALL.len()
        );
        Ok(())
    }

    async fn install_monitor(&self, config: &UnifiedConfig) {
        let monitoring = config.monitoring.clone();

        #[cfg(feature = "sqlite")]
        if monitoring.storage_backend == "sqlite" {
            let path = self.store.state_dir().join("usage.db");
            let created = match tokio::fs::create_dir_all(self.store.state_dir()).await {
                Ok(()) => UsageMonitor::sqlite(monitoring.clone(), &path).await,
                Err(e) => Err(e.into()),
            };
            match created {
                Ok(monitor) => {
                    info!("Usage events stored in {}", path.display());
                    *self.monitor.lock().await = monitor;
                    return;
                }
                Err(e) => warn!("SQLite usage store unavailable, keeping memory store: {}", e),
            }
        }

        #[cfg(not(feature = "sqlite"))]
        if monitoring.storage_backend == "sqlite" {
            warn!("Built without the sqlite feature; usage events stay in memory");
        }

        self.monitor.lock().await.update_config(monitoring);
    }

    async fn refresh_tools(&self) -> usize {
        let available = self.modules.lock().await.available_tools();
        for (tool, module) in &available {
            debug!("Registered tool: {} ({})", tool, module);
        }
        let count = available.len();
        *self.tools.write().await = available;
        count
    }

    /// Tools currently served, in catalogue order.
    pub async fn tools(&self) -> Vec<ToolName> {
        let registered = self.tools.read().await;
        ToolName::ALL
            .into_iter()
            .filter(|t| registered.iter().any(|(tool, _)| tool == t))
            .collect()
    }

    /// Mark the server running.
    pub async fn start(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(ServerError::NotInitialized);
        }
        self.running.store(true, Ordering::SeqCst);
        info!("AceFlow server started");
        Ok(())
    }

    /// Shut down every module and prune old usage data.
    pub async fn stop(&self) {
        self.modules.lock().await.shutdown_all_modules().await;
        if let Err(e) = self.monitor.lock().await.cleanup_old_data().await {
            warn!("Usage data cleanup failed: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        info!("AceFlow server stopped");
    }

    // === Tools ===

    /// Plan and execute one tool call.
    pub async fn call_tool(&self, name: &str, params: &Value) -> Result<ToolOutcome> {
        if !self.is_initialized() {
            return Err(ServerError::NotInitialized);
        }
        let tool: ToolName = name.parse().map_err(|e: UnknownTool| ServerError::UnknownTool(e.0))?;
        let plan = self.router.lock().await.plan_execution(name, params);

        let started = Instant::now();
        let (executed_by, result) = {
            let mut modules = self.modules.lock().await;
            let target = match &plan.fallback_plan {
                Some(fallback) if !modules.is_module_available(&plan.primary_module) => {
                    warn!(
                        "Module {} unavailable, running {} on {}",
                        plan.primary_module, name, fallback.primary_module
                    );
                    fallback.primary_module.clone()
                }
                _ => plan.primary_module.clone(),
            };
            let result = modules.call_tool(&target, tool, params).await;
            (target, result)
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let user_id = params.get("user_id").and_then(|v| v.as_str());
        {
            let mut monitor = self.monitor.lock().await;
            match &result {
                Ok(_) => monitor.record_tool_call(name, user_id, true, Some(duration_ms), None).await,
                Err(e) => {
                    let message = e.to_string();
                    monitor
                        .record_tool_call(name, user_id, false, Some(duration_ms), Some(&message))
                        .await;
                    monitor.record_error(&message, user_id, Some(name)).await;
                }
            }
        }

        let result = result?;
        self.cache.lock().await.invalidate_prefix(ResourceKind::ProjectState.as_str());
        Ok(ToolOutcome {
            tool,
            executed_by,
            result,
            plan,
            duration_ms,
        })
    }

    /// [`UnifiedServer::call_tool`] converted to the boundary dictionary.
    pub async fn call_tool_json(&self, name: &str, params: &Value) -> Value {
        match self.call_tool(name, params).await {
            Ok(outcome) => outcome.to_json(),
            Err(e) => {
                debug!("Tool {} failed: {}", name, e);
                error_json(&e)
            }
        }
    }

    // === Resources ===

    /// Every resource route.
    pub fn list_resources(&self) -> Vec<ResourceRoute> {
        ResourceKind::ALL.iter().map(|k| k.route()).collect()
    }

    /// Read a resource as `user_id` (anonymous when `None`).
    pub async fn read_resource(&self, uri: &str, user_id: Option<&str>) -> Result<Value> {
        let user = user_id.unwrap_or(ANONYMOUS_USER);
        let (kind, id) = parse_uri(uri)?;
        let route = kind.route();

        let admitted = {
            let mut resources = self.resources.lock().await;
            let admitted = resources.admit(user, &route, chrono::Utc::now());
            if admitted.is_err() {
                resources.record(kind, false, false);
            }
            admitted
        };
        if let Err(e) = admitted {
            self.monitor.lock().await.record_resource_access(uri, Some(user), false, false).await;
            return Err(e);
        }

        let key = ResourceCache::make_key(kind.as_str(), &id, &Value::Null);
        let cached = self.cache.lock().await.get(&key);
        let cache_hit = cached.is_some();
        let result = match cached {
            Some(value) => Ok(value),
            None => self.build_resource(&route, &id).await,
        };

        if let (Ok(value), false) = (&result, cache_hit) {
            self.cache.lock().await.set(key, value.clone(), route.cache);
        }
        self.resources.lock().await.record(kind, result.is_ok(), cache_hit);
        self.monitor
            .lock()
            .await
            .record_resource_access(uri, Some(user), result.is_ok(), cache_hit)
            .await;
        result
    }

    async fn build_resource(&self, route: &ResourceRoute, id: &str) -> Result<Value> {
        let metadata = json!({
            "uri": route.uri.replace("{stage}", id),
            "generated_at": chrono::Utc::now(),
            "cache_strategy": route.cache.as_str(),
            "access_level": route.access.as_str(),
        });

        match route.kind {
            ResourceKind::ProjectState => {
                let state = self.store.require_state().await?;
                let queue = self.store.load_task_queue().await?;
                let history: Vec<Value> = self.store.load_history().await?;
                let mut documents = Vec::new();
                for stage in Stage::ALL {
                    if self.store.read_stage_result(stage).await?.is_some() {
                        documents.push(stage.as_str());
                    }
                }
                let config = self.config().await;

                Ok(json!({
                    "project": state.project,
                    "flow": state.flow,
                    "quality": {
                        "threshold": config.core.quality_threshold,
                        "stage_documents": documents,
                    },
                    "collaboration": {
                        "enabled": config.collaboration.enabled,
                        "task_progress": queue.map(|q| q.progress()),
                        "history_entries": history.len(),
                    },
                    "metadata": metadata,
                }))
            }
            ResourceKind::WorkflowConfig => {
                let config = self.config().await;
                let effective_mode = self.config.lock().await.get_effective_mode();
                Ok(json!({
                    "workflow": WorkflowDefinition::standard(),
                    "settings": {
                        "mode": config.mode,
                        "effective_mode": effective_mode.as_str(),
                        "default_init_mode": config.core.default_mode,
                        "auto_advance": config.core.auto_advance,
                        "quality_threshold": config.core.quality_threshold,
                        "collaboration_enabled": config.collaboration.enabled,
                        "intelligence_enabled": config.intelligence.enabled,
                    },
                    "metadata": metadata,
                }))
            }
            ResourceKind::StageGuide => {
                let mut guide = json!(StageGuide::for_name(id));
                if let Some(map) = guide.as_object_mut() {
                    map.insert("metadata".to_string(), metadata);
                }
                Ok(guide)
            }
            ResourceKind::SystemMetrics => {
                let server = self.get_server_status().await;
                let module_health = self.modules.lock().await.health_check();
                let usage = self.monitor.lock().await.get_usage_stats().await?;
                let cache = self.cache.lock().await.stats();
                let routing = self.router.lock().await.get_routing_stats().clone();
                let resources = self.resources.lock().await.stats().clone();

                Ok(json!({
                    "server": server,
                    "module_health": module_health,
                    "usage": usage,
                    "cache": cache,
                    "routing": routing,
                    "resources": resources,
                    "metadata": metadata,
                }))
            }
        }
    }

    // === Status ===

    /// Initialization flags, config summary, modules and tools.
    pub async fn get_server_status(&self) -> Value {
        let config = self.config.lock().await.get_config_summary();
        let modules = self.modules.lock().await.get_all_status();
        let tools: Vec<&str> = self.tools().await.iter().map(|t| t.as_str()).collect();

        json!({
            "initialized": self.is_initialized(),
            "running": self.is_running(),
            "project_dir": self.store.root(),
            "config": config,
            "modules": modules,
            "tools": tools,
            "resources": self.list_resources().iter().map(|r| r.uri).collect::<Vec<_>>(),
        })
    }

    /// Health of the server and its modules.
    pub async fn get_health_status(&self) -> Value {
        let module_status = self.modules.lock().await.health_check();
        let modules_healthy = module_status
            .get("overall_healthy")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let server_status = if self.is_running() {
            "running"
        } else if self.is_initialized() {
            "initialized"
        } else {
            "stopped"
        };

        json!({
            "server_healthy": self.is_initialized() && modules_healthy,
            "server_status": server_status,
            "module_status": module_status,
            "timestamp": chrono::Utc::now(),
        })
    }

    /// Re-read the configuration and push it to every component.
    pub async fn reload_config(&self) -> Result<()> {
        let config = {
            let mut manager = self.config.lock().await;
            manager.load_config(self.options.runtime_overrides.as_ref(), false).await?.clone()
        };
        self.router.lock().await.update_config(&config);
        self.monitor.lock().await.update_config(config.monitoring.clone());

        {
            let mut modules = self.modules.lock().await;
            for (name, _, module_config) in self.module_registrations(&config) {
                if modules.is_registered(name) && !modules.update_module_config(name, module_config).await {
                    warn!("Module {} did not come back after reload", name);
                }
            }
        }

        self.refresh_tools().await;
        self.cache.lock().await.clear();
        info!("Configuration reloaded (mode: {})", config.mode);
        Ok(())
    }
}
