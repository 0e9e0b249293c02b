//! Execution plans produced by the router.

use aceflow_core::Time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Which modules take part in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Core module alone
    CoreOnly,
    /// Core plus collaboration
    CoreWithCollaboration,
    /// Core plus intelligence
    CoreWithIntelligence,
    /// Core plus both
    FullEnhanced,
}

impl ExecutionMode {
    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::CoreOnly => "core_only",
            ExecutionMode::CoreWithCollaboration => "core_with_collaboration",
            ExecutionMode::CoreWithIntelligence => "core_with_intelligence",
            ExecutionMode::FullEnhanced => "full_enhanced",
        }
    }

    /// Mode for a pair of enhancement decisions.
    pub fn from_flags(collaboration: bool, intelligence: bool) -> Self {
        match (collaboration, intelligence) {
            (false, false) => ExecutionMode::CoreOnly,
            (true, false) => ExecutionMode::CoreWithCollaboration,
            (false, true) => ExecutionMode::CoreWithIntelligence,
            (true, true) => ExecutionMode::FullEnhanced,
        }
    }

    /// Base weight of the plan confidence.
    pub fn weight(&self) -> f64 {
        match self {
            ExecutionMode::CoreOnly => 0.9,
            ExecutionMode::CoreWithCollaboration | ExecutionMode::CoreWithIntelligence => 0.8,
            ExecutionMode::FullEnhanced => 0.7,
        }
    }

    /// Enhancement modules this mode brings in.
    pub fn enhancement_modules(&self) -> Vec<String> {
        let names: &[&str] = match self {
            ExecutionMode::CoreOnly => &[],
            ExecutionMode::CoreWithCollaboration => &["collaboration"],
            ExecutionMode::CoreWithIntelligence => &["intelligence"],
            ExecutionMode::FullEnhanced => &["collaboration", "intelligence"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags extracted from a call's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingFeatures {
    /// Free-form user text present
    pub has_user_input: bool,
    /// Parameters ask for collaboration
    pub requests_collaboration: bool,
    /// Parameters ask for intelligence
    pub requests_intelligence: bool,
    /// `auto_confirm` parameter (false when absent)
    pub auto_confirm: bool,
    /// `validation_level` parameter (`basic` when absent)
    pub validation_level: String,
    /// The call may need a human answer
    pub interaction_required: bool,
    /// Weighted sum of the flags, at most 1
    pub complexity_score: f64,
}

/// How a tool call will be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Tool being planned
    pub tool_name: String,
    /// Chosen mode
    pub mode: ExecutionMode,
    /// Module that serves the tool
    pub primary_module: String,
    /// Modules that enhance the call
    pub enhancement_modules: Vec<String>,
    /// Tool parameters
    pub parameters: Value,
    /// 0..=1
    pub confidence: f64,
    /// Core-only plan to use when the primary module is unavailable
    pub fallback_plan: Option<Box<ExecutionPlan>>,
    /// `tool_name`, `routing_version`, `features`, `enhancement_hints`, `is_fallback`
    pub metadata: Value,
    /// When the plan was made
    pub created_at: Time,
}

impl ExecutionPlan {
    /// Primary plus enhancement modules, without duplicates.
    pub fn all_modules(&self) -> Vec<String> {
        let mut modules = vec![self.primary_module.clone()];
        for module in &self.enhancement_modules {
            if !modules.contains(module) {
                modules.push(module.clone());
            }
        }
        modules
    }

    /// Whether `module` takes part in the plan.
    pub fn requires_module(&self, module: &str) -> bool {
        self.primary_module == module || self.enhancement_modules.iter().any(|m| m == module)
    }

    /// Whether this plan is itself a fallback.
    pub fn is_fallback(&self) -> bool {
        self.metadata.get("is_fallback").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

/// One routed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// Tool routed
    pub tool_name: String,
    /// Chosen mode
    pub mode: ExecutionMode,
    /// Primary module
    pub primary_module: String,
    /// Plan confidence
    pub confidence: f64,
    /// Complexity of the call
    pub complexity_score: f64,
    /// When it was routed
    pub timestamp: Time,
}

/// Running routing counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Calls routed
    pub total_routes: u64,
    /// Calls per mode
    pub mode_distribution: BTreeMap<String, u64>,
    /// Running mean of plan confidence
    pub average_confidence: f64,
    /// Plans that carried a fallback
    pub fallback_plans: u64,
}

impl RoutingStats {
    /// Count one plan.
    pub fn record(&mut self, plan: &ExecutionPlan) {
        self.total_routes += 1;
        *self.mode_distribution.entry(plan.mode.as_str().to_string()).or_insert(0) += 1;
        self.average_confidence += (plan.confidence - self.average_confidence) / self.total_routes as f64;
        if plan.fallback_plan.is_some() {
            self.fallback_plans += 1;
        }
    }
}
