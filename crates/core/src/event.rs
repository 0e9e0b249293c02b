//! Usage events recorded by the monitor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{EventId, SessionId};
use crate::Time;

/// Kind of usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventType {
    /// A tool was called
    ToolCall,
    /// A resource was read
    ResourceAccess,
    /// Something failed
    ErrorOccurred,
    /// A timing or size sample
    PerformanceMetric,
}

impl UsageEventType {
    /// Snake-case name, also used as the SQL column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageEventType::ToolCall => "tool_call",
            UsageEventType::ResourceAccess => "resource_access",
            UsageEventType::ErrorOccurred => "error_occurred",
            UsageEventType::PerformanceMetric => "performance_metric",
        }
    }

    /// Inverse of [`UsageEventType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool_call" => Some(UsageEventType::ToolCall),
            "resource_access" => Some(UsageEventType::ResourceAccess),
            "error_occurred" => Some(UsageEventType::ErrorOccurred),
            "performance_metric" => Some(UsageEventType::PerformanceMetric),
            _ => None,
        }
    }
}

impl fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single usage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique identifier
    pub event_id: EventId,
    /// Kind of event
    pub event_type: UsageEventType,
    /// When it happened
    pub timestamp: Time,
    /// Monitoring session that recorded it
    pub session_id: SessionId,
    /// Caller, when known
    pub user_id: Option<String>,
    /// Tool involved
    pub tool_name: Option<String>,
    /// Resource involved
    pub resource_name: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: Option<f64>,
    /// Outcome
    pub success: bool,
    /// Error text for failures
    pub error_message: Option<String>,
    /// Extra data
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl UsageEvent {
    /// Create a successful event of the given type, stamped now.
    pub fn new(event_type: UsageEventType, session_id: SessionId) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            timestamp: chrono::Utc::now(),
            session_id,
            user_id: None,
            tool_name: None,
            resource_name: None,
            duration_ms: None,
            success: true,
            error_message: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Filter for event queries. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Inclusive lower bound
    pub start: Option<Time>,
    /// Inclusive upper bound
    pub end: Option<Time>,
    /// Only this type
    pub event_type: Option<UsageEventType>,
    /// Only this user
    pub user_id: Option<String>,
    /// At most this many (newest first)
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Whether an event passes the filter (ignores `limit`).
    pub fn matches(&self, event: &UsageEvent) -> bool {
        self.start.map_or(true, |s| event.timestamp >= s)
            && self.end.map_or(true, |e| event.timestamp <= e)
            && self.event_type.map_or(true, |t| event.event_type == t)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| event.user_id.as_deref() == Some(u))
    }
}
