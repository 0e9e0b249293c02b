//! Collaboration module: confirmation requests, user responses and
//! confirmed task execution.
//!
//! Requests live in memory and expire `confirmation_timeout` seconds after
//! creation. Expiry is checked lazily at the start of every call. Handled
//! and expired requests are appended to `.aceflow/collaboration_history.json`.

use aceflow_core::{RequestId, Stage, Task, TaskQueue, TaskStatus, Time, ToolName};
use aceflow_storage::{ProjectStore, StorageError, TaskParser};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::core_module::CORE_MODULE;
use crate::error::{ModuleError, Result};
use crate::manager::ModuleFactory;
use crate::module::{Module, ModuleBase, ModuleConfig, ModuleMetadata};
use crate::params::{bool_param, required_str, str_param};

/// Module name.
pub const COLLABORATION_MODULE: &str = "collaboration";

/// History entries kept on disk.
pub const MAX_HISTORY: usize = 100;

const CONFIRM_RESPONSES: [&str; 8] = ["yes", "y", "ok", "confirm", "proceed", "是", "确认", "继续"];
const REJECT_RESPONSES: [&str; 6] = ["no", "n", "cancel", "abort", "否", "取消"];

/// What a user response means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseIntent {
    /// Go ahead
    Confirm,
    /// Do not go ahead
    Reject,
    /// Anything else
    Custom,
}

impl ResponseIntent {
    /// Outcome recorded for this intent.
    pub fn outcome(&self) -> &'static str {
        match self {
            ResponseIntent::Confirm => "confirmed",
            ResponseIntent::Reject => "rejected",
            ResponseIntent::Custom => "custom_handled",
        }
    }

    fn next_steps(&self) -> [&'static str; 2] {
        match self {
            ResponseIntent::Confirm => ["proceed_with_task", "update_status"],
            ResponseIntent::Reject => ["cancel_task", "request_alternative"],
            ResponseIntent::Custom => ["analyze_response", "determine_action"],
        }
    }
}

/// A classified user response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Text as given
    pub raw_response: String,
    /// Classification
    pub intent: ResponseIntent,
    /// 0.8 for keyword matches, 0.3 otherwise
    pub confidence: f64,
    /// When it was parsed
    pub parsed_at: Time,
}

/// Classify a free-form response.
///
/// Only a reply that is exactly one of the known answers counts; anything
/// longer ("no, don't proceed", "不要继续") is custom.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let text = raw
        .trim()
        .trim_end_matches(['.', '!', '。', '！'])
        .trim()
        .to_lowercase();

    let (intent, confidence) = if CONFIRM_RESPONSES.contains(&text.as_str()) {
        (ResponseIntent::Confirm, 0.8)
    } else if REJECT_RESPONSES.contains(&text.as_str()) {
        (ResponseIntent::Reject, 0.8)
    } else {
        (ResponseIntent::Custom, 0.3)
    };

    ParsedResponse {
        raw_response: raw.to_string(),
        intent,
        confidence,
        parsed_at: chrono::Utc::now(),
    }
}

/// A pending confirmation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRequest {
    /// Request id
    pub request_id: RequestId,
    /// Task the request is about
    pub task_id: String,
    /// Owning project
    pub project_id: String,
    /// Request kind
    #[serde(rename = "type")]
    pub request_type: String,
    /// Short title
    pub title: String,
    /// Question put to the user
    pub description: String,
    /// Accepted answers
    pub options: Vec<String>,
    /// Answer assumed by default
    pub default_option: String,
    /// Creation time
    pub created_at: Time,
    /// Expiry time
    pub timeout_at: Time,
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRecord {
    /// `response_processed` or `timeout`
    #[serde(rename = "type")]
    pub record_type: String,
    /// Request handled
    pub request_id: RequestId,
    /// Task the request was about
    pub task_id: String,
    /// Owning project
    pub project_id: String,
    /// Responding user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Response text
    #[serde(default)]
    pub response: Option<String>,
    /// `confirmed`, `rejected`, `custom_handled` or `expired`
    pub outcome: String,
    /// When it was recorded
    pub timestamp: Time,
}

/// Builds [`CollaborationModule`] instances bound to one project directory.
pub struct CollaborationModuleFactory {
    store: ProjectStore,
}

impl CollaborationModuleFactory {
    /// Factory for the project at `store`.
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }
}

impl ModuleFactory for CollaborationModuleFactory {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(COLLABORATION_MODULE, "1.0.0", "Confirmation requests and collaborative task execution")
            .depends_on(CORE_MODULE)
            .provides(ToolName::AceflowRespond)
            .provides(ToolName::AceflowCollaborationStatus)
            .provides(ToolName::AceflowTaskExecute)
            .tag("collaboration")
    }

    fn create(&self, config: ModuleConfig) -> Box<dyn Module> {
        Box::new(CollaborationModule::new(
            ModuleBase::new(self.metadata(), config),
            self.store.clone(),
        ))
    }
}

/// Collaboration module.
pub struct CollaborationModule {
    base: ModuleBase,
    store: ProjectStore,
    active: BTreeMap<RequestId, CollaborationRequest>,
    history: Vec<CollaborationRecord>,
}

impl CollaborationModule {
    /// Module for the project at `store`.
    pub fn new(base: ModuleBase, store: ProjectStore) -> Self {
        Self {
            base,
            store,
            active: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    fn confirmation_timeout(&self) -> i64 {
        self.base.config.i64_setting("confirmation_timeout", 300)
    }

    fn configuration(&self) -> Value {
        json!({
            "confirmation_timeout": self.confirmation_timeout(),
            "auto_confirm": self.base.config.bool_setting("auto_confirm", false),
            "interaction_level": self.base.config.str_setting("interaction_level", "standard"),
        })
    }

    /// Pending requests.
    pub fn active_requests(&self) -> impl Iterator<Item = &CollaborationRequest> {
        self.active.values()
    }

    /// Recorded history, oldest first.
    pub fn history(&self) -> &[CollaborationRecord] {
        &self.history
    }

    /// Drop requests past their timeout and record them as expired.
    pub fn cleanup_expired_requests(&mut self) -> usize {
        self.expire_at(chrono::Utc::now())
    }

    fn expire_at(&mut self, now: Time) -> usize {
        let expired: Vec<RequestId> = self
            .active
            .values()
            .filter(|r| r.timeout_at <= now)
            .map(|r| r.request_id)
            .collect();

        for id in &expired {
            if let Some(request) = self.active.remove(id) {
                info!("Collaboration request {} expired", id);
                self.push_record(CollaborationRecord {
                    record_type: "timeout".to_string(),
                    request_id: request.request_id,
                    task_id: request.task_id,
                    project_id: request.project_id,
                    user_id: None,
                    response: None,
                    outcome: "expired".to_string(),
                    timestamp: now,
                });
            }
        }
        expired.len()
    }

    fn push_record(&mut self, record: CollaborationRecord) {
        self.history.push(record);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    async fn save_history(&self) -> Result<()> {
        // Never create .aceflow/ as a side effect.
        if self.store.is_initialized().await {
            self.store.save_history(&self.history).await?;
        }
        Ok(())
    }

    async fn expire_and_save(&mut self) -> Result<()> {
        if self.cleanup_expired_requests() > 0 {
            self.save_history().await?;
        }
        Ok(())
    }

    async fn project_id(&self) -> String {
        match self.store.load_state().await {
            Ok(Some(state)) => state.project.name,
            _ => "default".to_string(),
        }
    }

    fn create_request(&mut self, project_id: &str, task: &Task) -> CollaborationRequest {
        let now = chrono::Utc::now();
        let request = CollaborationRequest {
            request_id: RequestId::new(),
            task_id: task.task_id.clone(),
            project_id: project_id.to_string(),
            request_type: "task_confirmation".to_string(),
            title: format!("Confirm task execution: {}", task.name),
            description: format!("Do you want to execute task '{}'?", task.name),
            options: vec!["yes".to_string(), "no".to_string(), "modify".to_string()],
            default_option: "yes".to_string(),
            created_at: now,
            timeout_at: now + chrono::Duration::seconds(self.confirmation_timeout()),
        };
        debug!("Created collaboration request {} for {}", request.request_id, task.task_id);
        self.active.insert(request.request_id, request.clone());
        request
    }

    /// Saved queue, or one parsed from the planning document.
    async fn load_queue(&self, project_id: &str) -> Result<Option<TaskQueue>> {
        if let Some(queue) = self.store.load_task_queue().await? {
            return Ok(Some(queue));
        }
        let Some(document) = self.store.read_stage_result(Stage::Planning).await? else {
            return Ok(None);
        };

        let queue = TaskParser::new()?.parse_document(&document, project_id, Stage::Planning.as_str());
        if queue.tasks.is_empty() {
            return Ok(None);
        }
        info!("Built task queue with {} tasks from the planning document", queue.tasks.len());
        self.store.save_task_queue(&queue).await?;
        Ok(Some(queue))
    }

    /// Mark a queued task with `status` and persist the queue.
    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Option<TaskQueue>> {
        let Some(mut queue) = self.store.load_task_queue().await? else {
            return Ok(None);
        };
        if !queue.update_status(task_id, status) {
            return Ok(None);
        }
        self.store.save_task_queue(&queue).await?;
        Ok(Some(queue))
    }

    // === aceflow_respond ===

    async fn respond(&mut self, params: &Value) -> Result<Value> {
        let request_ref = required_str(params, "request_id")?;
        let response = required_str(params, "response")?;
        let user_id = str_param(params, "user_id").unwrap_or("user");

        self.expire_and_save().await?;

        let request = request_ref
            .parse::<RequestId>()
            .ok()
            .and_then(|id| self.active.remove(&id))
            .ok_or_else(|| StorageError::NotFound(format!("Collaboration request not found: {}", request_ref)))?;

        let parsed = parse_response(response);
        let intent = parsed.intent;

        let mut task_status = None;
        if intent == ResponseIntent::Confirm {
            if let Some(queue) = self.set_task_status(&request.task_id, TaskStatus::Completed).await? {
                task_status = Some(TaskStatus::Completed);
                debug!("Task {} completed; {} tasks left executable", request.task_id, queue.next_executable().len());
            }
        }

        let message = match intent {
            ResponseIntent::Confirm => format!("Confirmed: {}", request.title),
            ResponseIntent::Reject => format!("Rejected: {}", request.title),
            ResponseIntent::Custom => "Custom response recorded for review".to_string(),
        };

        self.push_record(CollaborationRecord {
            record_type: "response_processed".to_string(),
            request_id: request.request_id,
            task_id: request.task_id.clone(),
            project_id: request.project_id.clone(),
            user_id: Some(user_id.to_string()),
            response: Some(response.to_string()),
            outcome: intent.outcome().to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.save_history().await?;
        info!("Request {} answered by {}: {}", request.request_id, user_id, intent.outcome());

        Ok(json!({
            "message": "Response processed",
            "request_id": request.request_id,
            "parsed_response": parsed,
            "processing_result": {
                "success": true,
                "action": intent.outcome(),
                "message": message,
                "task_id": request.task_id,
                "task_status": task_status,
                "next_steps": intent.next_steps(),
            },
        }))
    }

    // === aceflow_collaboration_status ===

    fn statistics(&self) -> Value {
        let count = |outcome: &str| self.history.iter().filter(|r| r.outcome == outcome).count();
        let confirmed = count("confirmed");
        let rejected = count("rejected");
        let answered = confirmed + rejected;
        json!({
            "total_interactions": self.history.len(),
            "confirmed": confirmed,
            "rejected": rejected,
            "custom": count("custom_handled"),
            "expired": count("expired"),
            "confirmation_rate": if answered == 0 { 0.0 } else { confirmed as f64 / answered as f64 },
        })
    }

    fn insights(&self) -> Vec<Value> {
        let mut insights = Vec::new();

        let pending = self.active.len();
        if pending > 0 {
            insights.push(json!({
                "type": "pending_requests",
                "message": format!("You have {} pending collaboration request(s)", pending),
                "priority": if pending > 3 { "high" } else { "medium" },
                "action": "Review and respond to pending requests",
            }));
        }

        let expired = self.history.iter().filter(|r| r.outcome == "expired").count();
        if expired >= 3 {
            insights.push(json!({
                "type": "frequent_timeouts",
                "message": format!("{} requests expired without a response", expired),
                "priority": "medium",
                "action": "Increase confirmation_timeout or enable auto_confirm",
            }));
        }
        insights
    }

    async fn collaboration_status(&mut self, params: &Value) -> Result<Value> {
        self.expire_and_save().await?;

        let project_id = match str_param(params, "project_id") {
            Some(id) => id.to_string(),
            None => self.project_id().await,
        };

        let active: Vec<Value> = self
            .active
            .values()
            .filter(|r| r.project_id == project_id)
            .map(|r| {
                json!({
                    "request_id": r.request_id,
                    "type": r.request_type,
                    "title": r.title,
                    "task_id": r.task_id,
                    "created_at": r.created_at,
                    "timeout_at": r.timeout_at,
                })
            })
            .collect();
        let recent = &self.history[self.history.len().saturating_sub(10)..];

        Ok(json!({
            "project_id": project_id,
            "active_requests_count": active.len(),
            "active_requests": active,
            "recent_history": recent,
            "statistics": self.statistics(),
            "insights": self.insights(),
            "configuration": self.configuration(),
            "timestamp": chrono::Utc::now(),
        }))
    }

    // === aceflow_task_execute ===

    async fn task_execute(&mut self, params: &Value) -> Result<Value> {
        self.expire_and_save().await?;

        let auto_confirm = bool_param(params, "auto_confirm")
            .unwrap_or_else(|| self.base.config.bool_setting("auto_confirm", false));
        let project_id = self.project_id().await;
        let requested = str_param(params, "task_id");

        let Some(mut queue) = self.load_queue(&project_id).await? else {
            return self.execute_unqueued(&project_id, requested, auto_confirm);
        };

        let task = match requested {
            Some(reference) => queue
                .tasks
                .iter()
                .find(|t| t.task_id == reference)
                .or_else(|| queue.tasks.iter().find(|t| t.matches_reference(reference)))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Task not found: {}", reference)))?,
            None => match queue.next_executable().first() {
                Some(task) => (*task).clone(),
                None => {
                    return Ok(json!({
                        "status": "no_executable_tasks",
                        "message": "No pending task has its dependencies completed",
                        "progress": queue.progress(),
                    }))
                }
            },
        };

        if task.status == TaskStatus::Completed {
            return Ok(json!({
                "status": "already_completed",
                "message": format!("Task '{}' is already completed", task.name),
                "task": task,
                "progress": queue.progress(),
            }));
        }

        if !auto_confirm {
            let request = self.create_request(&project_id, &task);
            return Ok(json!({
                "status": "pending_confirmation",
                "message": request.description,
                "request_id": request.request_id,
                "task": task,
                "request": request,
            }));
        }

        queue.update_status(&task.task_id, TaskStatus::Completed);
        self.store.save_task_queue(&queue).await?;
        info!("Executed task {} ({})", task.task_id, task.name);

        let next: Vec<&str> = queue.next_executable().iter().map(|t| t.task_id.as_str()).collect();
        Ok(json!({
            "status": "completed",
            "message": format!("Task '{}' executed", task.name),
            "task": queue.get(&task.task_id),
            "progress": queue.progress(),
            "next_tasks": next,
        }))
    }

    /// Execution without a task queue.
    fn execute_unqueued(&mut self, project_id: &str, requested: Option<&str>, auto_confirm: bool) -> Result<Value> {
        let task_id = match requested {
            Some(id) => id.to_string(),
            None => generated_task_id(chrono::Utc::now()),
        };
        let task = Task::new(task_id.clone(), task_id.clone());
        warn!("No task queue found; executing standalone task {}", task_id);

        if !auto_confirm {
            let request = self.create_request(project_id, &task);
            return Ok(json!({
                "status": "pending_confirmation",
                "message": request.description,
                "request_id": request.request_id,
                "task": task,
                "request": request,
            }));
        }

        Ok(json!({
            "status": "completed",
            "message": format!("Task '{}' executed", task_id),
            "task": Task { status: TaskStatus::Completed, ..task },
        }))
    }
}

/// `task_%Y%m%d_%H%M%S_<8 hex>`
fn generated_task_id(now: Time) -> String {
    format!("task_{}_{:08x}", now.format("%Y%m%d_%H%M%S"), Ulid::new().random() as u32)
}

#[async_trait]
impl Module for CollaborationModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn do_initialize(&mut self) -> Result<bool> {
        if !self.is_dependency_resolved(CORE_MODULE) {
            return Err(ModuleError::Other("Collaboration requires the core module".to_string()));
        }
        self.history = self.store.load_history().await?;
        debug!("Loaded {} collaboration history entries", self.history.len());
        Ok(true)
    }

    async fn do_cleanup(&mut self) -> Result<()> {
        self.active.clear();
        self.save_history().await
    }

    fn health_status(&self) -> Value {
        json!({
            "healthy": true,
            "status": "running",
            "tools_available": self.base.metadata.provides,
            "active_requests": self.active.len(),
            "collaboration_history_size": self.history.len(),
            "configuration": self.configuration(),
        })
    }

    async fn handle(&mut self, tool: ToolName, params: &Value) -> Result<Value> {
        match tool {
            ToolName::AceflowRespond => self.respond(params).await,
            ToolName::AceflowCollaborationStatus => self.collaboration_status(params).await,
            ToolName::AceflowTaskExecute => self.task_execute(params).await,
            other => Err(ModuleError::UnsupportedTool {
                module: COLLABORATION_MODULE.to_string(),
                tool: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aceflow_core::{InitMode, ProjectState};
    use tempfile::TempDir;

    const PLANNING: &str = "\
# Planning

- [ ] 1. Set up repository [high] 2h
- [ ] 2. Build login [high] 4h
  - Dependencies: Set up repository
";

    async fn project(dir: &TempDir, planning: bool) -> ProjectStore {
        let store = ProjectStore::new(dir.path());
        store.save_state(&ProjectState::new("demo", InitMode::Minimal)).await.unwrap();
        if planning {
            store.write_stage_result(Stage::Planning, PLANNING).await.unwrap();
        }
        store
    }

    async fn module(store: ProjectStore, config: ModuleConfig) -> CollaborationModule {
        let metadata = CollaborationModuleFactory::new(store.clone()).metadata();
        let mut module = CollaborationModule::new(ModuleBase::new(metadata, config), store);
        module.mark_dependency_resolved(CORE_MODULE);
        assert!(module.initialize().await);
        module
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response("  Yes ").intent, ResponseIntent::Confirm);
        assert_eq!(parse_response("OK!").intent, ResponseIntent::Confirm);
        assert_eq!(parse_response("确认").intent, ResponseIntent::Confirm);
        assert_eq!(parse_response("n").intent, ResponseIntent::Reject);
        assert_eq!(parse_response("取消。").intent, ResponseIntent::Reject);

        let custom = parse_response("use postgres instead");
        assert_eq!(custom.intent, ResponseIntent::Custom);
        assert_eq!(custom.confidence, 0.3);
        assert_eq!(parse_response("ok").confidence, 0.8);
    }

    #[test]
    fn test_negated_replies_never_confirm() {
        for reply in ["no, don't proceed", "n - not ok", "不要继续", "不是", "cancel, not ok", "Yes, go ahead"] {
            assert_ne!(parse_response(reply).intent, ResponseIntent::Confirm, "{}", reply);
        }
    }

    #[tokio::test]
    async fn test_requires_core() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let metadata = CollaborationModuleFactory::new(store.clone()).metadata();
        let mut module = CollaborationModule::new(ModuleBase::new(metadata, ModuleConfig::new(true)), store);
        assert!(!module.initialize().await);
    }

    #[tokio::test]
    async fn test_confirm_flow_completes_task() {
        let dir = TempDir::new().unwrap();
        let store = project(&dir, true).await;
        let mut collab = module(store.clone(), ModuleConfig::new(true)).await;

        let pending = collab.handle(ToolName::AceflowTaskExecute, &json!({})).await.unwrap();
        assert_eq!(pending["status"], "pending_confirmation");
        assert_eq!(pending["task"]["task_id"], "task_1");
        let request_id = pending["request_id"].as_str().unwrap().to_string();

        let status = collab.handle(ToolName::AceflowCollaborationStatus, &json!({})).await.unwrap();
        assert_eq!(status["project_id"], "demo");
        assert_eq!(status["active_requests_count"], 1);
        assert_eq!(status["insights"][0]["priority"], "medium");

        let answered = collab
            .handle(ToolName::AceflowRespond, &json!({"request_id": request_id, "response": "yes"}))
            .await
            .unwrap();
        assert_eq!(answered["processing_result"]["action"], "confirmed");
        assert_eq!(answered["processing_result"]["next_steps"][0], "proceed_with_task");

        let queue = store.load_task_queue().await.unwrap().unwrap();
        assert_eq!(queue.get("task_1").unwrap().status, TaskStatus::Completed);
        assert_eq!(queue.next_executable()[0].task_id, "task_2");

        let history: Vec<CollaborationRecord> = store.load_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id.as_deref(), Some("user"));

        let err = collab
            .handle(ToolName::AceflowRespond, &json!({"request_id": request_id, "response": "yes"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_reject_leaves_task_pending() {
        let dir = TempDir::new().unwrap();
        let store = project(&dir, true).await;
        let mut collab = module(store.clone(), ModuleConfig::new(true)).await;

        let pending = collab.handle(ToolName::AceflowTaskExecute, &json!({})).await.unwrap();
        let request_id = pending["request_id"].as_str().unwrap().to_string();

        let answered = collab
            .handle(ToolName::AceflowRespond, &json!({"request_id": request_id, "response": "no"}))
            .await
            .unwrap();
        assert_eq!(answered["processing_result"]["action"], "rejected");

        let queue = store.load_task_queue().await.unwrap().unwrap();
        assert_ne!(queue.get("task_1").unwrap().status, TaskStatus::Completed);

        let history: Vec<CollaborationRecord> = store.load_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, "rejected");
    }

    #[tokio::test]
    async fn test_auto_confirm_and_blank_response() {
        let dir = TempDir::new().unwrap();
        let store = project(&dir, true).await;
        let config = ModuleConfig::new(true).with_setting("auto_confirm", json!(true));
        let mut collab = module(store, config).await;

        let done = collab.handle(ToolName::AceflowTaskExecute, &json!({})).await.unwrap();
        assert_eq!(done["status"], "completed");
        assert_eq!(done["progress"]["completed_tasks"], 1);
        assert_eq!(done["next_tasks"][0], "task_2");

        let missing = collab
            .handle(ToolName::AceflowTaskExecute, &json!({"task_id": "Deploy"}))
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), "not_found");

        let by_name = collab
            .handle(ToolName::AceflowTaskExecute, &json!({"task_id": "login"}))
            .await
            .unwrap();
        assert_eq!(by_name["task"]["task_id"], "task_2");
        assert_eq!(by_name["progress"]["progress_percentage"], 100.0);

        let err = collab
            .handle(ToolName::AceflowRespond, &json!({"request_id": "x", "response": "  "}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }

    #[tokio::test]
    async fn test_without_queue_uses_generated_id() {
        let dir = TempDir::new().unwrap();
        let store = project(&dir, false).await;
        let mut collab = module(store, ModuleConfig::new(true)).await;

        let done = collab
            .handle(ToolName::AceflowTaskExecute, &json!({"auto_confirm": true}))
            .await
            .unwrap();
        assert_eq!(done["status"], "completed");
        let id = done["task"]["task_id"].as_str().unwrap();
        assert!(id.starts_with("task_"));
        assert_eq!(id.len(), "task_20250101_120000_".len() + 8);
    }

    #[tokio::test]
    async fn test_requests_expire() {
        let dir = TempDir::new().unwrap();
        let store = project(&dir, true).await;
        let config = ModuleConfig::new(true).with_setting("confirmation_timeout", json!(60));
        let mut collab = module(store, config).await;

        collab.handle(ToolName::AceflowTaskExecute, &json!({})).await.unwrap();
        assert_eq!(collab.active_requests().count(), 1);

        assert_eq!(collab.expire_at(chrono::Utc::now() + chrono::Duration::seconds(30)), 0);
        assert_eq!(collab.expire_at(chrono::Utc::now() + chrono::Duration::seconds(61)), 1);
        assert_eq!(collab.active_requests().count(), 0);
        assert_eq!(collab.history()[0].outcome, "expired");

        let status = collab.handle(ToolName::AceflowCollaborationStatus, &json!({})).await.unwrap();
        assert_eq!(status["statistics"]["expired"], 1);
    }

    #[test]
    fn test_history_is_capped() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let metadata = CollaborationModuleFactory::new(store.clone()).metadata();
        let mut collab = CollaborationModule::new(ModuleBase::new(metadata, ModuleConfig::new(true)), store);
        for i in 0..(MAX_HISTORY + 5) {
            collab.push_record(CollaborationRecord {
                record_type: "response_processed".into(),
                request_id: RequestId::new(),
                task_id: format!("task_{}", i),
                project_id: "demo".into(),
                user_id: None,
                response: None,
                outcome: "confirmed".into(),
                timestamp: chrono::Utc::now(),
            });
        }
        assert_eq!(collab.history().len(), MAX_HISTORY);
        assert_eq!(collab.history()[0].task_id, "task_5");
    }
}
