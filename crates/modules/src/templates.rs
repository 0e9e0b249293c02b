//! Markdown documents written by the core module.

use aceflow_core::{InitMode, Stage, StageGuide};

/// One planned task line.
struct PlannedTask {
    name: String,
    priority: &'static str,
    hours: u32,
    dependencies: Vec<String>,
    details: Vec<String>,
}

impl PlannedTask {
    fn new(name: impl Into<String>, priority: &'static str, hours: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            hours,
            dependencies: Vec::new(),
            details: Vec::new(),
        }
    }

    fn after(mut self, dep: &str) -> Self {
        self.dependencies.push(dep.to_string());
        self
    }

    fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }
}

/// `README.md` for a new project.
pub(crate) fn readme(project_name: &str, mode: InitMode) -> String {
    let mut out = format!("# {}\n\nManaged with AceFlow ({} mode).\n\n## Workflow\n\n", project_name, mode);
    for (i, stage) in Stage::ALL.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, stage.display_name()));
    }
    out.push_str("\nStage documents are written to `aceflow_result/`.\n");
    out
}

/// Headings (level 2 and 3) of a requirements document.
fn feature_headings(prd: &str) -> Vec<String> {
    prd.lines()
        .filter_map(|line| line.strip_prefix("### ").or_else(|| line.strip_prefix("## ")))
        .map(|h| h.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.').trim().to_string())
        .filter(|h| !h.is_empty())
        .take(8)
        .collect()
}

fn planned_tasks(prd: Option<&str>) -> Vec<PlannedTask> {
    let headings = prd.map(feature_headings).unwrap_or_default();

    if headings.is_empty() {
        return vec![
            PlannedTask::new("Requirements analysis", "high", 4).detail("Confirm scope and acceptance criteria"),
            PlannedTask::new("Architecture design", "high", 6).after("Requirements analysis"),
            PlannedTask::new("Core feature implementation", "high", 16).after("Architecture design"),
            PlannedTask::new("Test suite", "medium", 8).after("Core feature implementation"),
            PlannedTask::new("Deployment preparation", "medium", 4).after("Test suite"),
        ];
    }

    let mut tasks = vec![PlannedTask::new("Requirements review", "high", 2)];
    let mut implemented = Vec::new();
    for (i, heading) in headings.iter().enumerate() {
        let name = format!("Implement {}", heading);
        let priority = if i < 2 { "high" } else { "medium" };
        tasks.push(PlannedTask::new(name.clone(), priority, 6).after("Requirements review"));
        implemented.push(name);
    }
    let mut testing = PlannedTask::new("Integration testing", "medium", 6);
    testing.dependencies = implemented;
    tasks.push(testing);
    tasks
}

fn render_tasks(out: &mut String, tasks: &[PlannedTask]) {
    for (i, task) in tasks.iter().enumerate() {
        out.push_str(&format!("- [ ] {}. {} [{}] {}h\n", i + 1, task.name, task.priority, task.hours));
        if !task.dependencies.is_empty() {
            out.push_str(&format!("  - Dependencies: {}\n", task.dependencies.join(", ")));
        }
        for detail in &task.details {
            out.push_str(&format!("  - {}\n", detail));
        }
    }
}

/// `aceflow_result/<Stage>.md`.
///
/// The planning document carries a task breakdown in the checklist
/// syntax the task parser reads.
pub(crate) fn stage_document(project_name: &str, stage: Stage, prd: Option<&str>) -> String {
    let guide = StageGuide::for_stage(stage);
    let mut out = format!(
        "# {} - {}\n\n**Stage**: {}\n**Generated**: {}\n\n{}\n\n## Objectives\n\n",
        guide.title,
        project_name,
        stage.as_str(),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
        guide.overview,
    );
    for objective in &guide.objectives {
        out.push_str(&format!("- {}\n", objective));
    }

    out.push_str("\n## Steps\n\n");
    for step in &guide.steps {
        out.push_str(&format!(
            "### {}. {}\n\n{}\n\nExpected outcome: {}\n\n",
            step.step, step.title, step.description, step.expected_outcome
        ));
    }

    if stage == Stage::Planning {
        out.push_str("## Task Breakdown\n\n");
        render_tasks(&mut out, &planned_tasks(prd));
        out.push('\n');
    }

    out.push_str("## Best Practices\n\n");
    for practice in &guide.best_practices {
        out.push_str(&format!("- {}\n", practice));
    }
    if let Some(next) = &guide.next_stage {
        out.push_str(&format!("\nNext stage: {}\n", next));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_headings() {
        let prd = "# Product\n\n## 1. User login\ntext\n### Task board\n## \n";
        assert_eq!(feature_headings(prd), vec!["User login", "Task board"]);
    }

    #[test]
    fn test_planning_document_has_tasks() {
        let doc = stage_document("demo", Stage::Planning, None);
        assert!(doc.contains("## Task Breakdown"));
        assert!(doc.contains("- [ ] 1. Requirements analysis [high] 4h"));
        assert!(doc.contains("  - Dependencies: Requirements analysis"));

        let other = stage_document("demo", Stage::Testing, None);
        assert!(!other.contains("Task Breakdown"));
    }

    #[test]
    fn test_planning_from_prd() {
        let doc = stage_document("demo", Stage::Planning, Some("## Login\n## Search\n"));
        assert!(doc.contains("Implement Login [high] 6h"));
        assert!(doc.contains("  - Dependencies: Implement Login, Implement Search"));
    }
}
