//! Heuristic tool router.
//!
//! Each call goes through three steps: extract flags from the parameters,
//! pick an [`ExecutionMode`] from those flags and the enabled modules, then
//! assemble an [`ExecutionPlan`]. Unknown tool names are not an error; they
//! take the generic path and land on the core module.

use aceflow_config::UnifiedConfig;
use aceflow_core::ToolName;
use serde_json::{json, Value};
use tracing::debug;

use crate::plan::{ExecutionMode, ExecutionPlan, RouteRecord, RoutingFeatures, RoutingStats};

/// Version stamped into plan metadata.
pub const ROUTING_VERSION: &str = "1.0.0";

const USER_INPUT_KEYS: [&str; 5] = ["user_input", "message", "query", "description", "comment"];
const FALLBACK_CONFIDENCE: f64 = 0.6;

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Module that serves a tool.
pub fn primary_module_for(tool: Option<ToolName>) -> &'static str {
    match tool {
        Some(ToolName::AceflowIntentAnalyze | ToolName::AceflowRecommend) => "intelligence",
        Some(
            ToolName::AceflowRespond | ToolName::AceflowCollaborationStatus | ToolName::AceflowTaskExecute,
        ) => "collaboration",
        _ => "core",
    }
}

/// Extract routing flags from a call.
pub fn extract_features(tool: Option<ToolName>, params: &Value) -> RoutingFeatures {
    let flag = |key: &str| truthy(params.get(key));

    let has_user_input = USER_INPUT_KEYS.iter().any(|k| flag(k));
    let requests_collaboration = params.get("collaboration_mode").and_then(|v| v.as_str()) == Some("enhanced")
        || flag("interactive")
        || flag("require_confirmation")
        || params.get("auto_confirm") == Some(&Value::Bool(false))
        || flag("collaboration_enabled");
    let requests_intelligence = has_user_input
        || flag("intelligence_enabled")
        || flag("intent_analysis")
        || flag("smart_recommendations")
        || matches!(tool, Some(ToolName::AceflowIntentAnalyze | ToolName::AceflowRecommend));
    let auto_confirm = params.get("auto_confirm").and_then(|v| v.as_bool()).unwrap_or(false);
    let validation_level = params
        .get("validation_level")
        .and_then(|v| v.as_str())
        .unwrap_or("basic")
        .to_string();
    let interaction_required =
        requests_collaboration || !auto_confirm || flag("interactive") || flag("require_input");

    let mut complexity: f64 = 0.0;
    if has_user_input {
        complexity += 0.3;
    }
    if requests_collaboration {
        complexity += 0.4;
    }
    if requests_intelligence {
        complexity += 0.3;
    }
    if interaction_required {
        complexity += 0.2;
    }
    if matches!(validation_level.as_str(), "enhanced" | "comprehensive") {
        complexity += 0.2;
    }

    RoutingFeatures {
        has_user_input,
        requests_collaboration,
        requests_intelligence,
        auto_confirm,
        validation_level,
        interaction_required,
        complexity_score: complexity.min(1.0),
    }
}

/// Plans tool calls against the enabled modules.
#[derive(Debug, Clone)]
pub struct FunctionRouter {
    collaboration_enabled: bool,
    intelligence_enabled: bool,
    intent_recognition: bool,
    history: Vec<RouteRecord>,
    stats: RoutingStats,
}

impl FunctionRouter {
    /// Router for `config`.
    pub fn new(config: &UnifiedConfig) -> Self {
        let mut router = Self {
            collaboration_enabled: false,
            intelligence_enabled: false,
            intent_recognition: false,
            history: Vec::new(),
            stats: RoutingStats::default(),
        };
        router.update_config(config);
        router
    }

    /// Refresh the enabled-module flags.
    pub fn update_config(&mut self, config: &UnifiedConfig) {
        self.collaboration_enabled = config.collaboration.enabled;
        self.intelligence_enabled = config.intelligence.enabled;
        self.intent_recognition = config.intelligence.intent_recognition;
        debug!(
            "Router flags: collaboration={}, intelligence={}",
            self.collaboration_enabled, self.intelligence_enabled
        );
    }

    /// Pick the mode for a call.
    pub fn decide_mode(&self, tool: Option<ToolName>, features: &RoutingFeatures) -> ExecutionMode {
        match tool {
            Some(ToolName::AceflowIntentAnalyze | ToolName::AceflowRecommend) => {
                return ExecutionMode::from_flags(false, self.intelligence_enabled);
            }
            Some(
                ToolName::AceflowRespond | ToolName::AceflowCollaborationStatus | ToolName::AceflowTaskExecute,
            ) => {
                return ExecutionMode::from_flags(self.collaboration_enabled, false);
            }
            _ => {}
        }

        if !self.collaboration_enabled && !self.intelligence_enabled {
            return ExecutionMode::CoreOnly;
        }

        let collaboration = self.collaboration_enabled
            && (features.requests_collaboration
                || (features.has_user_input && features.interaction_required)
                || features.complexity_score > 0.6);
        let intelligence = self.intelligence_enabled
            && (features.requests_intelligence
                || (features.has_user_input && self.intent_recognition)
                || matches!(features.validation_level.as_str(), "enhanced" | "comprehensive"));

        ExecutionMode::from_flags(collaboration, intelligence)
    }

    /// Plan a call and record it.
    pub fn plan_execution(&mut self, tool_name: &str, params: &Value) -> ExecutionPlan {
        let tool = tool_name.parse::<ToolName>().ok();
        let features = extract_features(tool, params);
        let mode = self.decide_mode(tool, &features);

        let table_module = primary_module_for(tool);
        let enhancement_modules = mode.enhancement_modules();
        // A hard-routed module that is switched off falls back to core.
        let primary_module = if table_module == "core" || enhancement_modules.iter().any(|m| m == table_module) {
            table_module
        } else {
            "core"
        };

        let mut confidence = 0.8 * mode.weight();
        if features.complexity_score > 0.8 {
            confidence *= 0.9;
        } else if features.complexity_score < 0.3 {
            confidence *= 1.1;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let fallback_plan = (mode != ExecutionMode::CoreOnly).then(|| {
            Box::new(ExecutionPlan {
                tool_name: tool_name.to_string(),
                mode: ExecutionMode::CoreOnly,
                primary_module: "core".to_string(),
                enhancement_modules: Vec::new(),
                parameters: params.clone(),
                confidence: FALLBACK_CONFIDENCE,
                fallback_plan: None,
                metadata: json!({
                    "tool_name": tool_name,
                    "routing_version": ROUTING_VERSION,
                    "is_fallback": true,
                }),
                created_at: chrono::Utc::now(),
            })
        });

        let plan = ExecutionPlan {
            tool_name: tool_name.to_string(),
            mode,
            primary_module: primary_module.to_string(),
            enhancement_modules,
            parameters: params.clone(),
            confidence,
            fallback_plan,
            metadata: json!({
                "tool_name": tool_name,
                "routing_version": ROUTING_VERSION,
                "features": features,
                "enhancement_hints": enhancement_hints(mode, &features),
                "is_fallback": false,
            }),
            created_at: chrono::Utc::now(),
        };

        debug!(
            "Routed {} -> {} (primary {}, confidence {:.2})",
            tool_name, plan.mode, plan.primary_module, plan.confidence
        );

        self.stats.record(&plan);
        self.history.push(RouteRecord {
            tool_name: tool_name.to_string(),
            mode,
            primary_module: plan.primary_module.clone(),
            confidence,
            complexity_score: features.complexity_score,
            timestamp: plan.created_at,
        });
        plan
    }

    /// The newest `limit` records, oldest first.
    pub fn get_execution_history(&self, limit: usize) -> &[RouteRecord] {
        &self.history[self.history.len().saturating_sub(limit)..]
    }

    /// Routing counters.
    pub fn get_routing_stats(&self) -> &RoutingStats {
        &self.stats
    }

    /// Forget history and counters.
    pub fn reset_stats(&mut self) {
        self.history.clear();
        self.stats = RoutingStats::default();
    }

    /// Whether collaboration is switched on.
    pub fn collaboration_enabled(&self) -> bool {
        self.collaboration_enabled
    }

    /// Whether intelligence is switched on.
    pub fn intelligence_enabled(&self) -> bool {
        self.intelligence_enabled
    }
}

fn enhancement_hints(mode: ExecutionMode, features: &RoutingFeatures) -> Vec<&'static str> {
    let mut hints = Vec::new();
    if matches!(mode, ExecutionMode::CoreWithCollaboration | ExecutionMode::FullEnhanced) {
        hints.push(if features.auto_confirm { "auto_confirm" } else { "confirm_before_execution" });
    }
    if matches!(mode, ExecutionMode::CoreWithIntelligence | ExecutionMode::FullEnhanced) {
        if features.has_user_input {
            hints.push("analyze_user_input");
        }
        hints.push("provide_recommendations");
    }
    if matches!(features.validation_level.as_str(), "enhanced" | "comprehensive") {
        hints.push("extended_validation");
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use aceflow_config::ServerMode;

    fn router(collaboration: bool, intelligence: bool) -> FunctionRouter {
        let mut config = UnifiedConfig::default();
        config.collaboration.enabled = collaboration;
        config.intelligence.enabled = intelligence;
        FunctionRouter::new(&config)
    }

    #[test]
    fn test_features() {
        let f = extract_features(Some(ToolName::AceflowStage), &json!({"user_input": "go", "auto_confirm": false}));
        assert!(f.has_user_input);
        assert!(f.requests_collaboration);
        assert!(f.requests_intelligence);
        assert!(f.interaction_required);
        assert_eq!(f.complexity_score, 1.0);

        let quiet = extract_features(Some(ToolName::AceflowStage), &json!({"auto_confirm": true, "message": ""}));
        assert!(!quiet.has_user_input);
        assert!(!quiet.interaction_required);
        assert_eq!(quiet.complexity_score, 0.0);
        assert_eq!(quiet.validation_level, "basic");
    }

    #[test]
    fn test_init_with_defaults() {
        let mut r = FunctionRouter::new(&UnifiedConfig::default());
        let plan = r.plan_execution("aceflow_init", &json!({"mode": "standard"}));
        assert_eq!(plan.mode, ExecutionMode::CoreOnly);
        assert_eq!(plan.primary_module, "core");
        assert!(plan.enhancement_modules.is_empty());
    }

    #[test]
    fn test_respond_with_collaboration() {
        let mut r = router(true, false);
        let plan = r.plan_execution("aceflow_respond", &json!({"request_id": "r1", "response": "yes"}));
        assert_eq!(plan.mode, ExecutionMode::CoreWithCollaboration);
        assert_eq!(plan.primary_module, "collaboration");
    }

    #[test]
    fn test_everything_disabled_is_core_only() {
        let mut r = router(false, false);
        let plan = r.plan_execution("aceflow_stage", &json!({"user_input": "next please", "interactive": true}));
        assert_eq!(plan.mode, ExecutionMode::CoreOnly);
        assert_eq!(plan.primary_module, "core");
        assert!(plan.fallback_plan.is_none());

        let plan = r.plan_execution("aceflow_respond", &json!({}));
        assert_eq!(plan.mode, ExecutionMode::CoreOnly);
        assert_eq!(plan.primary_module, "core");
    }

    #[test]
    fn test_hard_routes() {
        let mut r = router(true, true);
        let plan = r.plan_execution("aceflow_task_execute", &json!({"user_input": "run it"}));
        assert_eq!(plan.mode, ExecutionMode::CoreWithCollaboration);
        assert_eq!(plan.primary_module, "collaboration");

        let plan = r.plan_execution("aceflow_recommend", &json!({}));
        assert_eq!(plan.mode, ExecutionMode::CoreWithIntelligence);
        assert_eq!(plan.primary_module, "intelligence");
        assert_eq!(plan.all_modules(), vec!["intelligence"]);
    }

    #[test]
    fn test_generic_rule_and_fallback() {
        let mut r = router(true, true);
        let plan = r.plan_execution("aceflow_stage", &json!({"user_input": "move on", "interactive": true}));
        assert_eq!(plan.mode, ExecutionMode::FullEnhanced);
        // complexity 1.0 > 0.8
        assert!((plan.confidence - 0.8 * 0.7 * 0.9).abs() < 1e-9);

        let fallback = plan.fallback_plan.as_ref().unwrap();
        assert_eq!(fallback.mode, ExecutionMode::CoreOnly);
        assert_eq!(fallback.confidence, 0.6);
        assert!(fallback.is_fallback());
        assert_eq!(plan.metadata["routing_version"], "1.0.0");

        let quiet = r.plan_execution("aceflow_validate", &json!({"auto_confirm": true}));
        assert_eq!(quiet.mode, ExecutionMode::CoreOnly);
        assert!((quiet.confidence - (0.8 * 0.9 * 1.1_f64).min(1.0)).abs() < 1e-9);

        let validation = r.plan_execution("aceflow_validate", &json!({"auto_confirm": true, "validation_level": "comprehensive"}));
        assert_eq!(validation.mode, ExecutionMode::CoreWithIntelligence);
    }

    #[test]
    fn test_unknown_tool_goes_to_core() {
        let mut r = router(true, false);
        let plan = r.plan_execution("something_else", &json!({"auto_confirm": true}));
        assert_eq!(plan.primary_module, "core");
        assert_eq!(plan.mode, ExecutionMode::CoreOnly);
    }

    #[test]
    fn test_history_stats_and_reset() {
        let mut r = router(true, false);
        r.plan_execution("aceflow_stage", &json!({"auto_confirm": true}));
        r.plan_execution("aceflow_stage", &json!({"interactive": true}));
        r.plan_execution("aceflow_respond", &json!({}));

        assert_eq!(r.get_execution_history(2).len(), 2);
        assert_eq!(r.get_execution_history(2)[1].tool_name, "aceflow_respond");
        assert_eq!(r.get_execution_history(10).len(), 3);

        let stats = r.get_routing_stats();
        assert_eq!(stats.total_routes, 3);
        assert_eq!(stats.mode_distribution["core_with_collaboration"], 2);
        assert_eq!(stats.fallback_plans, 2);

        r.reset_stats();
        assert_eq!(r.get_routing_stats().total_routes, 0);
        assert!(r.get_execution_history(5).is_empty());
    }

    #[test]
    fn test_update_config() {
        let mut r = router(false, false);
        r.update_config(&UnifiedConfig::for_mode(ServerMode::Enhanced));
        assert!(r.collaboration_enabled());
        assert!(r.intelligence_enabled());
    }
}
