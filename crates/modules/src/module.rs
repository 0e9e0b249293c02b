//! Module lifecycle.
//!
//! Every feature module embeds a [`ModuleBase`] and implements the hooks of
//! [`Module`]. The provided methods drive the state machine:
//!
//! ```text
//! Uninitialized --initialize--> Ready | Disabled | Error
//! Ready --cleanup--> Shutdown
//! ```

use aceflow_core::{Time, ToolName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Created, not yet initialized
    Uninitialized,
    /// Initialized and serving calls
    Ready,
    /// Turned off by config
    Disabled,
    /// Cleaned up
    Shutdown,
    /// Initialization failed
    Error,
}

impl ModuleState {
    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninitialized => "uninitialized",
            ModuleState::Ready => "ready",
            ModuleState::Disabled => "disabled",
            ModuleState::Shutdown => "shutdown",
            ModuleState::Error => "error",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Unique module name
    pub name: String,
    /// Module version
    pub version: String,
    /// Description
    pub description: String,
    /// Modules that must be ready first
    pub dependencies: Vec<String>,
    /// Modules used when present
    pub optional_dependencies: Vec<String>,
    /// Tools this module serves
    pub provides: Vec<ToolName>,
    /// Free-form tags
    pub tags: Vec<String>,
}

impl ModuleMetadata {
    /// Metadata with no dependencies or tools.
    pub fn new(name: impl Into<String>, version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
            provides: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Add a required dependency.
    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        self.dependencies.push(module.into());
        self
    }

    /// Add an optional dependency.
    pub fn optionally_depends_on(mut self, module: impl Into<String>) -> Self {
        self.optional_dependencies.push(module.into());
        self
    }

    /// Add a provided tool.
    pub fn provides(mut self, tool: ToolName) -> Self {
        self.provides.push(tool);
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Per-module configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Whether the module should run
    pub enabled: bool,
    /// Section settings (the module's config section as JSON)
    #[serde(default)]
    pub settings: Value,
}

impl ModuleConfig {
    /// Config with empty settings.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            settings: Value::Object(Default::default()),
        }
    }

    /// Config built from a serializable section that has an `enabled` flag.
    pub fn from_section<T: Serialize>(section: &T) -> Self {
        let settings = serde_json::to_value(section).unwrap_or(Value::Null);
        let enabled = settings.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);
        Self { enabled, settings }
    }

    /// Set a setting.
    pub fn with_setting(mut self, key: &str, value: Value) -> Self {
        if !self.settings.is_object() {
            self.settings = Value::Object(Default::default());
        }
        if let Some(map) = self.settings.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Boolean setting.
    pub fn bool_setting(&self, key: &str, default: bool) -> bool {
        self.settings.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Integer setting.
    pub fn i64_setting(&self, key: &str, default: i64) -> i64 {
        self.settings.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// Float setting.
    pub fn f64_setting(&self, key: &str, default: f64) -> f64 {
        self.settings.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    /// String setting.
    pub fn str_setting<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.settings.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Call counters of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleCallStats {
    /// Calls made
    pub total_calls: u64,
    /// Calls that succeeded
    pub successful_calls: u64,
    /// Calls that failed
    pub failed_calls: u64,
    /// Summed duration
    pub total_duration_ms: f64,
    /// Streaming mean duration
    pub average_duration_ms: f64,
    /// Time of the last call
    pub last_call_at: Option<Time>,
}

impl ModuleCallStats {
    /// Record one call.
    pub fn record(&mut self, success: bool, duration_ms: f64) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }
        self.total_duration_ms += duration_ms;
        self.average_duration_ms += (duration_ms - self.average_duration_ms) / self.total_calls as f64;
        self.last_call_at = Some(chrono::Utc::now());
    }

    /// `successful / total`, 0 without calls.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// State shared by every module.
#[derive(Debug, Clone)]
pub struct ModuleBase {
    /// Static description
    pub metadata: ModuleMetadata,
    /// Current config
    pub config: ModuleConfig,
    /// Lifecycle state
    pub state: ModuleState,
    /// Call counters
    pub stats: ModuleCallStats,
    resolved: HashSet<String>,
}

impl ModuleBase {
    /// Fresh, uninitialized base.
    pub fn new(metadata: ModuleMetadata, config: ModuleConfig) -> Self {
        Self {
            metadata,
            config,
            state: ModuleState::Uninitialized,
            stats: ModuleCallStats::default(),
            resolved: HashSet::new(),
        }
    }
}

/// A feature module.
#[async_trait]
pub trait Module: Send + Sync {
    /// Shared state.
    fn base(&self) -> &ModuleBase;

    /// Shared state, mutably.
    fn base_mut(&mut self) -> &mut ModuleBase;

    /// Set up resources. `Ok(false)` counts as a failed initialization.
    async fn do_initialize(&mut self) -> Result<bool>;

    /// Release resources.
    async fn do_cleanup(&mut self) -> Result<()>;

    /// Health report; must contain a boolean `healthy`.
    fn health_status(&self) -> Value;

    /// Serve one tool call.
    async fn handle(&mut self, tool: ToolName, params: &Value) -> Result<Value>;

    /// Module name.
    fn name(&self) -> &str {
        &self.base().metadata.name
    }

    /// Static description.
    fn metadata(&self) -> &ModuleMetadata {
        &self.base().metadata
    }

    /// Lifecycle state.
    fn state(&self) -> ModuleState {
        self.base().state
    }

    /// Run initialization once.
    ///
    /// Returns true when the module is ready or deliberately disabled.
    async fn initialize(&mut self) -> bool {
        if self.state() == ModuleState::Ready {
            return true;
        }

        if !self.base().config.enabled {
            info!("Module {} is disabled", self.name());
            self.base_mut().state = ModuleState::Disabled;
            return true;
        }

        match self.do_initialize().await {
            Ok(true) => {
                self.base_mut().state = ModuleState::Ready;
                info!("Module {} initialized", self.name());
                true
            }
            Ok(false) => {
                warn!("Module {} declined to initialize", self.name());
                self.base_mut().state = ModuleState::Error;
                false
            }
            Err(e) => {
                error!("Module {} failed to initialize: {}", self.name(), e);
                self.base_mut().state = ModuleState::Error;
                false
            }
        }
    }

    /// Release resources if ready.
    async fn cleanup(&mut self) {
        if self.state() != ModuleState::Ready {
            return;
        }
        if let Err(e) = self.do_cleanup().await {
            warn!("Module {} cleanup failed: {}", self.name(), e);
        }
        self.base_mut().state = ModuleState::Shutdown;
        debug!("Module {} shut down", self.name());
    }

    /// Ready and enabled.
    fn is_available(&self) -> bool {
        self.state() == ModuleState::Ready && self.base().config.enabled
    }

    /// Available and reporting healthy.
    fn is_healthy(&self) -> bool {
        self.is_available() && self.health_status().get("healthy").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Record one call in the stats.
    fn record_call(&mut self, success: bool, duration_ms: f64) {
        self.base_mut().stats.record(success, duration_ms);
    }

    /// Note that a dependency is ready.
    fn mark_dependency_resolved(&mut self, module: &str) {
        self.base_mut().resolved.insert(module.to_string());
    }

    /// Whether a dependency was marked ready.
    fn is_dependency_resolved(&self, module: &str) -> bool {
        self.base().resolved.contains(module)
    }

    /// Whether every required dependency is ready.
    fn are_dependencies_resolved(&self) -> bool {
        let base = self.base();
        base.metadata.dependencies.iter().all(|d| base.resolved.contains(d))
    }

    /// Required dependencies.
    fn required_dependencies(&self) -> &[String] {
        &self.base().metadata.dependencies
    }

    /// Status summary.
    fn module_info(&self) -> Value {
        let base = self.base();
        json!({
            "name": base.metadata.name,
            "enabled": base.config.enabled,
            "initialized": base.state == ModuleState::Ready,
            "available": self.is_available(),
            "state": base.state.as_str(),
            "metadata": base.metadata,
            "stats": {
                "total_calls": base.stats.total_calls,
                "successful_calls": base.stats.successful_calls,
                "failed_calls": base.stats.failed_calls,
                "success_rate": base.stats.success_rate(),
                "average_duration_ms": base.stats.average_duration_ms,
                "last_call_at": base.stats.last_call_at,
            },
        })
    }
}
