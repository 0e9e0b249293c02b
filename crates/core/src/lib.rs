//! AceFlow core data models.
//!
//! This crate defines the shared vocabulary of the workflow server: tool
//! names, workflow stages, project state, task queues and usage events.

#![warn(missing_docs)]

// Identities
mod id;

// Workflow
mod stage;
mod project;
mod task;
mod tool;

// Monitoring
mod event;

// Re-exports
pub use id::{EventId, SessionId, RequestId, MigrationId};

pub use stage::{Stage, StageGuide, GuideStep, StageDefinition, QualityGate, WorkflowDefinition};
pub use project::{ProjectState, ProjectInfo, FlowState, StateMetadata, InitMode, STATE_VERSION};
pub use task::{Task, TaskPriority, TaskStatus, TaskQueue, TaskProgress};
pub use tool::{ToolName, UnknownTool};

pub use event::{UsageEvent, UsageEventType, EventQuery};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
