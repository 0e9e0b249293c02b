//! Intelligence module: rule-based intent recognition and next-step
//! recommendations.

use aceflow_core::{ProjectState, Stage, ToolName};
use aceflow_storage::ProjectStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::core_module::CORE_MODULE;
use crate::error::{ModuleError, Result};
use crate::manager::ModuleFactory;
use crate::module::{Module, ModuleBase, ModuleConfig, ModuleMetadata};
use crate::params::required_str;

/// Module name.
pub const INTELLIGENCE_MODULE: &str = "intelligence";

/// Recognized intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// Set up a new project
    StartWorkflow,
    /// Run a task
    ExecuteTask,
    /// Ask where things stand
    CheckStatus,
    /// Move to the next stage
    ContinueStage,
    /// Stop for now
    PauseWorkflow,
    /// Nothing matched
    Unknown,
}

impl IntentType {
    /// Intents that have keywords, in tie-break order.
    pub const KNOWN: [IntentType; 5] = [
        IntentType::StartWorkflow,
        IntentType::ExecuteTask,
        IntentType::CheckStatus,
        IntentType::ContinueStage,
        IntentType::PauseWorkflow,
    ];

    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::StartWorkflow => "start_workflow",
            IntentType::ExecuteTask => "execute_task",
            IntentType::CheckStatus => "check_status",
            IntentType::ContinueStage => "continue_stage",
            IntentType::PauseWorkflow => "pause_workflow",
            IntentType::Unknown => "unknown",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            IntentType::StartWorkflow => &[
                "start", "begin", "init", "initialize", "new project", "create project", "开始", "启动", "初始化",
                "新项目", "创建项目",
            ],
            IntentType::ExecuteTask => &[
                "execute", "run", "implement", "build", "task", "do", "执行", "运行", "实现", "开发", "任务",
            ],
            IntentType::CheckStatus => &[
                "status", "progress", "where", "check", "show", "状态", "进度", "查看", "检查", "情况",
            ],
            IntentType::ContinueStage => &[
                "next", "continue", "advance", "proceed", "move on", "下一", "继续", "推进", "进入",
            ],
            IntentType::PauseWorkflow => &["pause", "stop", "hold", "wait", "later", "暂停", "停止", "等待", "稍后"],
            IntentType::Unknown => &[],
        }
    }

    /// Tool that serves this intent.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            IntentType::StartWorkflow => ToolName::AceflowInit.as_str(),
            IntentType::ExecuteTask => ToolName::AceflowTaskExecute.as_str(),
            IntentType::CheckStatus | IntentType::ContinueStage => ToolName::AceflowStage.as_str(),
            IntentType::PauseWorkflow => "pause",
            IntentType::Unknown => ToolName::AceflowRecommend.as_str(),
        }
    }

    /// Execution mode that fits this intent.
    pub fn suggested_mode(&self) -> &'static str {
        match self {
            IntentType::StartWorkflow | IntentType::CheckStatus | IntentType::PauseWorkflow => "core_only",
            IntentType::ExecuteTask | IntentType::ContinueStage => "core_with_collaboration",
            IntentType::Unknown => "core_with_intelligence",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    /// Winning intent
    pub intent: IntentType,
    /// `min(0.5 + 0.15 * matches, 0.95)`, 0.2 when unknown
    pub confidence: f64,
    /// Keywords that matched
    pub matched_keywords: Vec<String>,
    /// Tool that serves the intent
    pub suggested_action: String,
    /// Execution mode that fits the intent
    pub suggested_mode: String,
    /// Parameters for the suggested tool
    pub parameters: Value,
}

/// Keyword classifier over English and Chinese input.
#[derive(Debug, Clone, Default)]
pub struct IntentRecognizer;

impl IntentRecognizer {
    /// Create a recognizer.
    pub fn new() -> Self {
        Self
    }

    /// Classify `input`.
    pub fn recognize(&self, input: &str) -> IntentResult {
        let text = input.to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(IntentType, Vec<String>)> = None;
        for intent in IntentType::KNOWN {
            let matched: Vec<String> = intent
                .keywords()
                .iter()
                .filter(|k| keyword_matches(&text, &words, k))
                .map(|k| k.to_string())
                .collect();
            let better = match &best {
                Some((_, current)) => matched.len() > current.len(),
                None => !matched.is_empty(),
            };
            if better {
                best = Some((intent, matched));
            }
        }

        let (intent, matched, confidence) = match best {
            Some((intent, matched)) => {
                let confidence = (0.5 + 0.15 * matched.len() as f64).min(0.95);
                (intent, matched, confidence)
            }
            None => (IntentType::Unknown, Vec::new(), 0.2),
        };

        IntentResult {
            intent,
            confidence,
            matched_keywords: matched,
            suggested_action: intent.suggested_action().to_string(),
            suggested_mode: intent.suggested_mode().to_string(),
            parameters: suggested_parameters(intent, &text, &words),
        }
    }
}

/// ASCII single words match whole tokens; phrases and CJK match by substring.
fn keyword_matches(text: &str, words: &[&str], keyword: &str) -> bool {
    if keyword.is_ascii() && !keyword.contains(' ') {
        words.contains(&keyword)
    } else {
        text.contains(keyword)
    }
}

fn mentioned_stage(text: &str, words: &[&str]) -> Option<Stage> {
    if let Some(stage) = words.iter().find_map(|w| Stage::parse(w)) {
        return Some(stage);
    }
    [("规划", Stage::Planning), ("计划", Stage::Planning), ("测试", Stage::Testing), ("部署", Stage::Deployment)]
        .into_iter()
        .find(|(word, _)| text.contains(word))
        .map(|(_, stage)| stage)
}

/// `task_12` or `T-001` style references.
fn task_reference(words: &[&str]) -> Option<String> {
    words
        .iter()
        .find(|w| {
            let numbered = |rest: &str| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
            match w.split_once('-') {
                Some((prefix, rest)) => {
                    !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphabetic()) && numbered(rest)
                }
                None => w.strip_prefix("task_").is_some_and(numbered),
            }
        })
        .map(|w| if w.contains('-') { w.to_uppercase() } else { w.to_string() })
}

fn suggested_parameters(intent: IntentType, text: &str, words: &[&str]) -> Value {
    match intent {
        IntentType::StartWorkflow => {
            let mode = ["minimal", "standard", "complete", "smart"]
                .into_iter()
                .find(|m| words.contains(m))
                .unwrap_or("standard");
            json!({"mode": mode})
        }
        IntentType::ExecuteTask => match task_reference(words) {
            Some(task_id) => json!({"task_id": task_id}),
            None => json!({}),
        },
        IntentType::CheckStatus => json!({"action": "status"}),
        IntentType::ContinueStage => match mentioned_stage(text, words) {
            Some(stage) => json!({"action": "set", "stage": stage}),
            None => json!({"action": "next"}),
        },
        IntentType::PauseWorkflow | IntentType::Unknown => json!({}),
    }
}

/// Builds [`IntelligenceModule`] instances bound to one project directory.
pub struct IntelligenceModuleFactory {
    store: ProjectStore,
}

impl IntelligenceModuleFactory {
    /// Factory for the project at `store`.
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }
}

impl ModuleFactory for IntelligenceModuleFactory {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(INTELLIGENCE_MODULE, "1.0.0", "Intent recognition and workflow recommendations")
            .depends_on(CORE_MODULE)
            .provides(ToolName::AceflowIntentAnalyze)
            .provides(ToolName::AceflowRecommend)
            .tag("intelligence")
    }

    fn create(&self, config: ModuleConfig) -> Box<dyn Module> {
        Box::new(IntelligenceModule {
            base: ModuleBase::new(self.metadata(), config),
            store: self.store.clone(),
            recognizer: IntentRecognizer::new(),
            intent_counts: BTreeMap::new(),
        })
    }
}

/// Intelligence module.
pub struct IntelligenceModule {
    base: ModuleBase,
    store: ProjectStore,
    recognizer: IntentRecognizer,
    intent_counts: BTreeMap<IntentType, u64>,
}

fn recommendation(action: &str, priority: &str, reason: String, parameters: Value) -> Value {
    json!({
        "action": action,
        "priority": priority,
        "reason": reason,
        "parameters": parameters,
    })
}

impl IntelligenceModule {
    fn analyze(&mut self, params: &Value) -> Result<Value> {
        let input = required_str(params, "user_input")?;
        let context = params.get("context").cloned().unwrap_or_else(|| json!({}));

        let result = self.recognizer.recognize(input);
        *self.intent_counts.entry(result.intent).or_insert(0) += 1;
        debug!("Intent {} ({:.2}) for input: {}", result.intent, result.confidence, input);

        Ok(json!({
            "intent": result.intent,
            "confidence": result.confidence,
            "user_input": input,
            "context": context,
            "matched_keywords": result.matched_keywords,
            "suggested_action": result.suggested_action,
            "suggested_mode": result.suggested_mode,
            "parameters": result.parameters,
        }))
    }

    async fn stage_recommendations(&self, state: &ProjectState, out: &mut Vec<Value>) -> Result<()> {
        let stage = state.flow.current_stage;
        let has_output = self.store.read_stage_result(stage).await?.is_some();

        if !has_output {
            out.push(recommendation(
                ToolName::AceflowStage.as_str(),
                "high",
                format!("The {} stage has no output yet", stage),
                json!({"action": "execute"}),
            ));
        } else if let Some(next) = stage.next() {
            out.push(recommendation(
                ToolName::AceflowStage.as_str(),
                "medium",
                format!("The {} stage has output; advance to {}", stage, next),
                json!({"action": "next"}),
            ));
        } else {
            out.push(recommendation(
                ToolName::AceflowValidate.as_str(),
                "medium",
                "Final stage reached; run a comprehensive validation".to_string(),
                json!({"mode": "comprehensive"}),
            ));
        }

        if stage == Stage::Testing {
            out.push(recommendation(
                ToolName::AceflowValidate.as_str(),
                "medium",
                "Validate quality before deployment".to_string(),
                json!({"mode": "standard"}),
            ));
        }
        Ok(())
    }

    async fn task_recommendations(&self, out: &mut Vec<Value>) -> Result<Option<Value>> {
        let Some(queue) = self.store.load_task_queue().await? else {
            return Ok(None);
        };
        let progress = queue.progress();
        let ready = queue.next_executable();

        if let Some(first) = ready.first() {
            out.push(recommendation(
                ToolName::AceflowTaskExecute.as_str(),
                "high",
                format!("{} task(s) ready to run, starting with '{}'", ready.len(), first.name),
                json!({"task_id": first.task_id}),
            ));
        } else if progress.total_tasks > 0 && progress.completed_tasks == progress.total_tasks {
            out.push(recommendation(
                ToolName::AceflowStage.as_str(),
                "medium",
                "All tasks are completed".to_string(),
                json!({"action": "next"}),
            ));
        }
        if progress.blocked_tasks > 0 {
            out.push(recommendation(
                ToolName::AceflowCollaborationStatus.as_str(),
                "low",
                format!("{} task(s) are blocked", progress.blocked_tasks),
                json!({}),
            ));
        }
        Ok(Some(serde_json::to_value(progress).unwrap_or(Value::Null)))
    }

    async fn recommend(&self, params: &Value) -> Result<Value> {
        let context = params.get("context").cloned().unwrap_or_else(|| json!({}));
        let mut recommendations = Vec::new();

        let Some(state) = self.store.load_state().await? else {
            recommendations.push(recommendation(
                ToolName::AceflowInit.as_str(),
                "high",
                "Project is not initialized".to_string(),
                json!({"mode": "standard"}),
            ));
            return Ok(json!({
                "recommendations": recommendations,
                "current_stage": null,
                "context": context,
            }));
        };

        let input = context.get("user_input").and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty());
        if let Some(input) = input.filter(|_| self.base.config.bool_setting("intent_recognition", true)) {
            let intent = self.recognizer.recognize(input);
            if intent.intent != IntentType::Unknown {
                recommendations.push(recommendation(
                    &intent.suggested_action,
                    "high",
                    format!("Matches the {} intent", intent.intent),
                    intent.parameters,
                ));
            }
        }

        if self.base.config.bool_setting("adaptive_guidance", true) {
            self.stage_recommendations(&state, &mut recommendations).await?;
        }
        let task_progress = self.task_recommendations(&mut recommendations).await?;

        Ok(json!({
            "recommendations": recommendations,
            "current_stage": state.flow.current_stage,
            "progress_percentage": state.flow.progress_percentage,
            "task_progress": task_progress,
            "context": context,
        }))
    }
}

#[async_trait]
impl Module for IntelligenceModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn do_initialize(&mut self) -> Result<bool> {
        if !self.is_dependency_resolved(CORE_MODULE) {
            return Err(ModuleError::Other("Intelligence requires the core module".to_string()));
        }
        Ok(true)
    }

    async fn do_cleanup(&mut self) -> Result<()> {
        self.intent_counts.clear();
        Ok(())
    }

    fn health_status(&self) -> Value {
        json!({
            "healthy": true,
            "status": "running",
            "tools_available": self.base.metadata.provides,
            "analyses_performed": self.intent_counts.values().sum::<u64>(),
            "intent_distribution": self.intent_counts,
        })
    }

    async fn handle(&mut self, tool: ToolName, params: &Value) -> Result<Value> {
        match tool {
            ToolName::AceflowIntentAnalyze => self.analyze(params),
            ToolName::AceflowRecommend => self.recommend(params).await,
            other => Err(ModuleError::UnsupportedTool {
                module: INTELLIGENCE_MODULE.to_string(),
                tool: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aceflow_core::{InitMode, Task, TaskQueue};
    use tempfile::TempDir;

    async fn ready(store: ProjectStore) -> Box<dyn Module> {
        let mut module = IntelligenceModuleFactory::new(store).create(ModuleConfig::new(true));
        module.mark_dependency_resolved(CORE_MODULE);
        assert!(module.initialize().await);
        module
    }

    #[test]
    fn test_recognize_english_and_chinese() {
        let recognizer = IntentRecognizer::new();

        let start = recognizer.recognize("Let's start a new project in complete mode");
        assert_eq!(start.intent, IntentType::StartWorkflow);
        assert!((start.confidence - 0.8).abs() < 1e-9);
        assert_eq!(start.parameters["mode"], "complete");

        let status = recognizer.recognize("查看当前进度");
        assert_eq!(status.intent, IntentType::CheckStatus);
        assert_eq!(status.suggested_action, "aceflow_stage");

        let execute = recognizer.recognize("please run task_3");
        assert_eq!(execute.intent, IntentType::ExecuteTask);
        assert_eq!(execute.parameters["task_id"], "task_3");

        let table = recognizer.recognize("execute T-002");
        assert_eq!(table.parameters["task_id"], "T-002");

        let next = recognizer.recognize("continue to testing");
        assert_eq!(next.intent, IntentType::ContinueStage);
        assert_eq!(next.parameters["stage"], "testing");

        let unknown = recognizer.recognize("the weather is nice");
        assert_eq!(unknown.intent, IntentType::Unknown);
        assert_eq!(unknown.confidence, 0.2);
    }

    #[test]
    fn test_confidence_is_capped() {
        let result = IntentRecognizer::new().recognize("start begin init initialize 开始 启动");
        assert_eq!(result.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_analyze_requires_input() {
        let dir = TempDir::new().unwrap();
        let mut module = ready(ProjectStore::new(dir.path())).await;

        let err = module.handle(ToolName::AceflowIntentAnalyze, &json!({"user_input": " "})).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_params");

        let result = module
            .handle(ToolName::AceflowIntentAnalyze, &json!({"user_input": "pause please"}))
            .await
            .unwrap();
        assert_eq!(result["intent"], "pause_workflow");
        assert_eq!(module.health_status()["analyses_performed"], 1);
    }

    #[tokio::test]
    async fn test_recommend_uninitialized() {
        let dir = TempDir::new().unwrap();
        let mut module = ready(ProjectStore::new(dir.path())).await;
        let result = module.handle(ToolName::AceflowRecommend, &json!({})).await.unwrap();
        assert_eq!(result["recommendations"][0]["action"], "aceflow_init");
        assert!(result["current_stage"].is_null());
    }

    #[tokio::test]
    async fn test_recommend_from_state_and_queue() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let mut state = ProjectState::new("demo", InitMode::Minimal);
        state.set_stage(Stage::Implementation);
        store.save_state(&state).await.unwrap();

        let mut queue = TaskQueue::new("demo", "planning");
        queue.tasks.push(Task::new("task_1", "Set up repository"));
        store.save_task_queue(&queue).await.unwrap();

        let mut module = ready(store).await;
        let result = module
            .handle(ToolName::AceflowRecommend, &json!({"context": {"user_input": "show status"}}))
            .await
            .unwrap();

        let actions: Vec<&str> = result["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, ["aceflow_stage", "aceflow_stage", "aceflow_task_execute"]);
        assert_eq!(result["current_stage"], "implementation");
        assert_eq!(result["task_progress"]["pending_tasks"], 1);
    }
}
