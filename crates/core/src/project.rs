//! Project state persisted in `.aceflow/current_state.json`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stage::Stage;
use crate::Time;

/// Schema version written into new project states.
pub const STATE_VERSION: &str = "3.0";

/// Template mode used by `aceflow_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Only the `.aceflow/` state directory
    Minimal,
    /// State directory plus a README
    Standard,
    /// Full skeleton with `src/`, `tests/` and `docs/`
    Complete,
    /// Full skeleton, tuned for intelligence-assisted projects
    Smart,
}

impl InitMode {
    /// All modes.
    pub const ALL: [InitMode; 4] = [
        InitMode::Minimal,
        InitMode::Standard,
        InitMode::Complete,
        InitMode::Smart,
    ];

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InitMode::Minimal => "minimal",
            InitMode::Standard => "standard",
            InitMode::Complete => "complete",
            InitMode::Smart => "smart",
        }
    }

    /// Parse a mode name, case-insensitively.
    pub fn parse(name: &str) -> Option<InitMode> {
        let name = name.trim().to_ascii_lowercase();
        InitMode::ALL.iter().copied().find(|m| m.as_str() == name)
    }

    /// Whether a README is generated.
    pub fn writes_readme(&self) -> bool {
        !matches!(self, InitMode::Minimal)
    }

    /// Whether the `src/ tests/ docs/` skeleton is generated.
    pub fn writes_skeleton(&self) -> bool {
        matches!(self, InitMode::Complete | InitMode::Smart)
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `project` block of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,
    /// Init mode the project was created with
    pub mode: String,
    /// Creation time
    pub created_at: Time,
    /// State schema version
    pub version: String,
}

/// `flow` block of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    /// Stage the project is in
    pub current_stage: Stage,
    /// Stages already finished, in completion order
    pub completed_stages: Vec<Stage>,
    /// `completed / total * 100`
    pub progress_percentage: f64,
}

/// `metadata` block of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    /// Number of stages in the workflow
    pub total_stages: usize,
    /// Last time the state changed
    pub last_updated: Time,
}

/// Whole project state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    /// Project identity
    pub project: ProjectInfo,
    /// Workflow position
    pub flow: FlowState,
    /// Bookkeeping
    pub metadata: StateMetadata,
}

impl ProjectState {
    /// Fresh state at the first stage.
    pub fn new(name: impl Into<String>, mode: InitMode) -> Self {
        let now = chrono::Utc::now();
        Self {
            project: ProjectInfo {
                name: name.into(),
                mode: mode.as_str().to_string(),
                created_at: now,
                version: STATE_VERSION.to_string(),
            },
            flow: FlowState {
                current_stage: Stage::Initialization,
                completed_stages: Vec::new(),
                progress_percentage: 0.0,
            },
            metadata: StateMetadata {
                total_stages: Stage::ALL.len(),
                last_updated: now,
            },
        }
    }

    /// Mark the current stage complete and move on.
    ///
    /// Returns the new stage, or `None` if already at the last stage
    /// (the state is left untouched in that case).
    pub fn advance(&mut self) -> Option<Stage> {
        let next = self.flow.current_stage.next()?;
        let current = self.flow.current_stage;
        if !self.flow.completed_stages.contains(&current) {
            self.flow.completed_stages.push(current);
        }
        self.flow.current_stage = next;
        self.touch();
        Some(next)
    }

    /// Jump to a stage; every earlier stage counts as completed.
    pub fn set_stage(&mut self, stage: Stage) {
        self.flow.current_stage = stage;
        self.flow.completed_stages = Stage::ALL[..stage.index()].to_vec();
        self.touch();
    }

    /// Back to the first stage with nothing completed.
    pub fn reset(&mut self) {
        self.flow.current_stage = Stage::Initialization;
        self.flow.completed_stages.clear();
        self.touch();
    }

    /// Recompute progress and bump `last_updated`.
    pub fn touch(&mut self) {
        let total = self.metadata.total_stages.max(1) as f64;
        self.flow.progress_percentage = self.flow.completed_stages.len() as f64 / total * 100.0;
        self.metadata.last_updated = chrono::Utc::now();
    }

    /// Stage status label used by stage listings.
    pub fn stage_status(&self, stage: Stage) -> &'static str {
        if self.flow.completed_stages.contains(&stage) {
            "completed"
        } else if self.flow.current_stage == stage {
            "current"
        } else {
            "pending"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = ProjectState::new("demo", InitMode::Standard);
        assert_eq!(state.project.name, "demo");
        assert_eq!(state.project.mode, "standard");
        assert_eq!(state.flow.current_stage, Stage::Initialization);
        assert_eq!(state.metadata.total_stages, 5);
        assert_eq!(state.flow.progress_percentage, 0.0);
    }

    #[test]
    fn test_advance_updates_progress() {
        let mut state = ProjectState::new("demo", InitMode::Minimal);
        assert_eq!(state.advance(), Some(Stage::Planning));
        assert_eq!(state.flow.completed_stages, vec![Stage::Initialization]);
        assert!((state.flow.progress_percentage - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_advance_at_final_stage() {
        let mut state = ProjectState::new("demo", InitMode::Minimal);
        state.set_stage(Stage::Deployment);
        assert_eq!(state.advance(), None);
        assert_eq!(state.flow.current_stage, Stage::Deployment);
        assert_eq!(state.flow.completed_stages.len(), 4);
    }

    #[test]
    fn test_reset() {
        let mut state = ProjectState::new("demo", InitMode::Minimal);
        state.set_stage(Stage::Testing);
        state.reset();
        assert_eq!(state.flow.current_stage, Stage::Initialization);
        assert!(state.flow.completed_stages.is_empty());
        assert_eq!(state.stage_status(Stage::Initialization), "current");
        assert_eq!(state.stage_status(Stage::Planning), "pending");
    }

    #[test]
    fn test_init_mode_parse() {
        assert_eq!(InitMode::parse("Complete"), Some(InitMode::Complete));
        assert_eq!(InitMode::parse("huge"), None);
        assert!(InitMode::Smart.writes_skeleton());
        assert!(!InitMode::Minimal.writes_readme());
    }
}
