//! Closed set of tool names exposed over MCP.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every tool AceFlow knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Initialize a project directory
    AceflowInit,
    /// Query or move the workflow stage
    AceflowStage,
    /// Run project validation checks
    AceflowValidate,
    /// Answer a pending confirmation request
    AceflowRespond,
    /// Report collaboration state
    AceflowCollaborationStatus,
    /// Execute a task from the task queue
    AceflowTaskExecute,
    /// Classify free-form user input
    AceflowIntentAnalyze,
    /// Suggest next actions
    AceflowRecommend,
}

impl ToolName {
    /// All tools, in registration order.
    pub const ALL: [ToolName; 8] = [
        ToolName::AceflowInit,
        ToolName::AceflowStage,
        ToolName::AceflowValidate,
        ToolName::AceflowRespond,
        ToolName::AceflowCollaborationStatus,
        ToolName::AceflowTaskExecute,
        ToolName::AceflowIntentAnalyze,
        ToolName::AceflowRecommend,
    ];

    /// Wire name of the tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::AceflowInit => "aceflow_init",
            ToolName::AceflowStage => "aceflow_stage",
            ToolName::AceflowValidate => "aceflow_validate",
            ToolName::AceflowRespond => "aceflow_respond",
            ToolName::AceflowCollaborationStatus => "aceflow_collaboration_status",
            ToolName::AceflowTaskExecute => "aceflow_task_execute",
            ToolName::AceflowIntentAnalyze => "aceflow_intent_analyze",
            ToolName::AceflowRecommend => "aceflow_recommend",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known tool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl std::str::FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}
