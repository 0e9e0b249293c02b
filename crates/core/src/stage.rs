//! Workflow stages, stage guides and the workflow definition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named step in the fixed project workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Project structure and configuration
    Initialization,
    /// Requirements and task breakdown
    Planning,
    /// Building the planned tasks
    Implementation,
    /// Tests and quality assurance
    Testing,
    /// Release
    Deployment,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Stage; 5] = [
        Stage::Initialization,
        Stage::Planning,
        Stage::Implementation,
        Stage::Testing,
        Stage::Deployment,
    ];

    /// Position of the stage in the workflow (0-based).
    pub fn index(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// The stage after this one, `None` at the end of the workflow.
    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// Snake-case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialization => "initialization",
            Stage::Planning => "planning",
            Stage::Implementation => "implementation",
            Stage::Testing => "testing",
            Stage::Deployment => "deployment",
        }
    }

    /// Capitalized name, used for `aceflow_result/<Name>.md`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Initialization => "Initialization",
            Stage::Planning => "Planning",
            Stage::Implementation => "Implementation",
            Stage::Testing => "Testing",
            Stage::Deployment => "Deployment",
        }
    }

    /// Look a stage up by its snake-case name.
    pub fn parse(name: &str) -> Option<Stage> {
        let name = name.trim().to_ascii_lowercase();
        Stage::ALL.iter().copied().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step inside a stage guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideStep {
    /// 1-based step number
    pub step: u32,
    /// Short title
    pub title: String,
    /// What to do
    pub description: String,
    /// What done looks like
    pub expected_outcome: String,
}

/// Guidance document for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageGuide {
    /// Stage name (may be unknown)
    pub stage: String,
    /// Guide title
    pub title: String,
    /// One-line description
    pub description: String,
    /// Paragraph overview
    pub overview: String,
    /// Objectives of the stage
    pub objectives: Vec<String>,
    /// Ordered steps
    pub steps: Vec<GuideStep>,
    /// Best practices
    pub best_practices: Vec<String>,
    /// Stage that follows, if any
    pub next_stage: Option<String>,
    /// Rough time estimate
    pub estimated_time: String,
}

fn step(n: u32, title: &str, description: &str, outcome: &str) -> GuideStep {
    GuideStep {
        step: n,
        title: title.to_string(),
        description: description.to_string(),
        expected_outcome: outcome.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl StageGuide {
    /// Guide for a known stage.
    pub fn for_stage(stage: Stage) -> Self {
        let next_stage = stage.next().map(|s| s.as_str().to_string());
        let (title, description, overview, objectives, steps, best_practices, estimated_time) = match stage {
            Stage::Initialization => (
                "Project Initialization Guide",
                "Complete guide for initializing your AceFlow project",
                "This stage sets up the foundation of your project with proper structure and configuration.",
                strings(&[
                    "Create project directory structure",
                    "Set up configuration files",
                    "Initialize version control",
                    "Configure development environment",
                ]),
                vec![
                    step(1, "Create Project Structure", "Set up the basic directory structure for your project", "Project directories and basic files created"),
                    step(2, "Configure Project Settings", "Customize .aceflow/config.json for the project", "Project configuration matches requirements"),
                    step(3, "Validate Setup", "Run aceflow_validate in basic mode", "All validation checks pass"),
                ],
                strings(&[
                    "Choose meaningful project names",
                    "Set up version control early",
                    "Use consistent naming conventions",
                ]),
                "1-2 hours",
            ),
            Stage::Planning => (
                "Project Planning Guide",
                "Comprehensive planning guide for your project",
                "Define clear requirements and break them into an ordered task list.",
                strings(&[
                    "Define project requirements",
                    "Create implementation roadmap",
                    "Break work into estimated tasks",
                ]),
                vec![
                    step(1, "Requirements Analysis", "Gather and document all project requirements", "Clear, documented requirements"),
                    step(2, "Task Breakdown", "Split the work into prioritized, estimated tasks with dependencies", "A task list ready for execution"),
                ],
                strings(&[
                    "Break large tasks into smaller ones",
                    "Set realistic estimates",
                    "Plan for testing from the start",
                ]),
                "2-4 hours",
            ),
            Stage::Implementation => (
                "Implementation Guide",
                "Guide for building the planned tasks",
                "Work through the task list in dependency order, keeping tests alongside the code.",
                strings(&[
                    "Implement the core functionality",
                    "Write tests for every task",
                    "Keep the task list up to date",
                ]),
                vec![
                    step(1, "Pick Next Task", "Use aceflow_task_execute to pick an executable task", "A task whose dependencies are complete"),
                    step(2, "Implement and Test", "Write the code and its tests", "Task passes its tests"),
                    step(3, "Mark Complete", "Confirm completion so dependents unblock", "Progress updated"),
                ],
                strings(&[
                    "Commit small, focused changes",
                    "Run tests before marking a task complete",
                ]),
                "varies",
            ),
            Stage::Testing => (
                "Testing & QA Guide",
                "Guide for verifying the implementation",
                "Run the full test suite and quality checks before release.",
                strings(&[
                    "Run all tests",
                    "Reach the configured quality threshold",
                ]),
                vec![
                    step(1, "Run Test Suite", "Execute unit and integration tests", "All tests pass"),
                    step(2, "Quality Check", "Run aceflow_validate in comprehensive mode", "Quality grade meets the threshold"),
                ],
                strings(&[
                    "Fix failing tests before adding new ones",
                    "Track coverage over time",
                ]),
                "1-3 hours",
            ),
            Stage::Deployment => (
                "Deployment Guide",
                "Guide for releasing the project",
                "Deploy the validated build and confirm it is healthy.",
                strings(&[
                    "Deploy the release",
                    "Verify the deployment",
                ]),
                vec![
                    step(1, "Deploy", "Ship the release to the target environment", "Release is live"),
                    step(2, "Verify Deployment", "Run health checks against the deployment", "Health checks pass"),
                ],
                strings(&[
                    "Keep a rollback plan ready",
                    "Monitor after release",
                ]),
                "30 minutes - 2 hours",
            ),
        };

        Self {
            stage: stage.as_str().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            overview: overview.to_string(),
            objectives,
            steps,
            best_practices,
            next_stage,
            estimated_time: estimated_time.to_string(),
        }
    }

    /// Guide for an arbitrary stage name; unknown names get a generic guide.
    pub fn for_name(name: &str) -> Self {
        if let Some(stage) = Stage::parse(name) {
            return Self::for_stage(stage);
        }

        let mut title_case = name.to_string();
        if let Some(first) = title_case.get_mut(0..1) {
            first.make_ascii_uppercase();
        }

        Self {
            stage: name.to_string(),
            title: format!("{} Guide", title_case),
            description: format!("Guide for the {} stage", name),
            overview: format!("This guide provides information for the {} stage.", name),
            objectives: vec![format!("Complete {} stage requirements", name)],
            steps: vec![step(
                1,
                &format!("Execute {} tasks", name),
                &format!("Complete all required tasks for {}", name),
                &format!("{} stage completed successfully", name),
            )],
            best_practices: vec![format!("Follow {} best practices", name)],
            next_stage: None,
            estimated_time: "varies".to_string(),
        }
    }
}

/// Stage entry in the workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage identifier
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Description
    pub description: String,
    /// Actions that must happen in the stage
    pub required_actions: Vec<String>,
}

/// Quality gate attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    /// Minimum validation score
    pub min_score: f64,
    /// Minimum test coverage, if enforced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_coverage: Option<f64>,
}

/// The fixed AceFlow workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,
    /// Definition version
    pub version: String,
    /// Stages in order
    pub stages: Vec<StageDefinition>,
    /// Allowed transitions (stage -> reachable stages)
    pub transitions: BTreeMap<String, Vec<String>>,
    /// Gates keyed by the stage they guard
    pub quality_gates: BTreeMap<String, QualityGate>,
}

impl WorkflowDefinition {
    /// The standard five-stage workflow.
    pub fn standard() -> Self {
        let defs: [(Stage, &str, &str, &[&str]); 5] = [
            (Stage::Initialization, "Project Initialization", "Set up project structure and configuration", &["create_structure", "setup_config"]),
            (Stage::Planning, "Project Planning", "Define requirements and create implementation plan", &["define_requirements", "create_plan"]),
            (Stage::Implementation, "Implementation", "Develop the project according to the plan", &["implement_core", "write_tests"]),
            (Stage::Testing, "Testing & QA", "Comprehensive testing and quality assurance", &["run_tests", "quality_check"]),
            (Stage::Deployment, "Deployment", "Deploy and finalize the project", &["deploy", "verify_deployment"]),
        ];

        let stages = defs
            .iter()
            .map(|(stage, display, desc, actions)| StageDefinition {
                name: stage.as_str().to_string(),
                display_name: display.to_string(),
                description: desc.to_string(),
                required_actions: strings(actions),
            })
            .collect();

        let mut transitions = BTreeMap::new();
        for stage in Stage::ALL {
            let mut reachable = Vec::new();
            if let Some(next) = stage.next() {
                reachable.push(next.as_str().to_string());
            }
            if let Some(prev) = stage.index().checked_sub(1).map(|i| Stage::ALL[i]) {
                reachable.push(prev.as_str().to_string());
            }
            transitions.insert(stage.as_str().to_string(), reachable);
        }

        let mut quality_gates = BTreeMap::new();
        quality_gates.insert("planning".to_string(), QualityGate { min_score: 0.7, test_coverage: None });
        quality_gates.insert("implementation".to_string(), QualityGate { min_score: 0.8, test_coverage: Some(0.7) });
        quality_gates.insert("testing".to_string(), QualityGate { min_score: 0.9, test_coverage: Some(0.8) });
        quality_gates.insert("deployment".to_string(), QualityGate { min_score: 0.9, test_coverage: Some(0.8) });

        Self {
            name: "Standard AceFlow Workflow".to_string(),
            version: "1.0.0".to_string(),
            stages,
            transitions,
            quality_gates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sequence() {
        assert_eq!(Stage::Initialization.next(), Some(Stage::Planning));
        assert_eq!(Stage::Testing.next(), Some(Stage::Deployment));
        assert_eq!(Stage::Deployment.next(), None);
        assert_eq!(Stage::Implementation.index(), 2);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(Stage::parse("Testing"), Some(Stage::Testing));
        assert_eq!(Stage::parse("unknown"), None);
    }

    #[test]
    fn test_known_stage_guide() {
        let guide = StageGuide::for_name("initialization");
        assert_eq!(guide.stage, "initialization");
        assert!(guide.title.contains("Initialization"));
        assert_eq!(guide.next_stage.as_deref(), Some("planning"));
        assert!(!guide.steps.is_empty());
    }

    #[test]
    fn test_unknown_stage_guide() {
        let guide = StageGuide::for_name("unknown_stage");
        assert_eq!(guide.stage, "unknown_stage");
        assert_eq!(guide.title, "Unknown_stage Guide");
        assert_eq!(guide.steps.len(), 1);
        assert!(guide.next_stage.is_none());
    }

    #[test]
    fn test_workflow_definition() {
        let wf = WorkflowDefinition::standard();
        assert_eq!(wf.stages.len(), 5);
        assert_eq!(wf.transitions["initialization"], vec!["planning"]);
        assert_eq!(wf.transitions["testing"], vec!["deployment", "implementation"]);
        assert_eq!(wf.transitions["deployment"], vec!["testing"]);
        assert_eq!(wf.quality_gates["testing"].min_score, 0.9);
    }
}
