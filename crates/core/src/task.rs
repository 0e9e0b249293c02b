//! Task model parsed from task-breakdown documents.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Time;

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// 高
    High,
    /// 中
    Medium,
    /// 低
    Low,
}

impl TaskPriority {
    /// Parse an English or Chinese priority marker.
    pub fn parse(marker: &str) -> Option<TaskPriority> {
        match marker.trim().to_lowercase().as_str() {
            "高" | "high" | "h" | "p0" | "p1" => Some(TaskPriority::High),
            "中" | "medium" | "med" | "m" | "p2" => Some(TaskPriority::Medium),
            "低" | "low" | "l" | "p3" => Some(TaskPriority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Pending,
    /// Being worked on
    InProgress,
    /// Done
    Completed,
    /// Waiting on something outside the queue
    Blocked,
    /// Deliberately not done
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One task from a breakdown document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable id (`task_<n>` or the table id)
    pub task_id: String,
    /// Task name
    pub name: String,
    /// Free-form detail lines
    #[serde(default)]
    pub description: String,
    /// Priority
    pub priority: TaskPriority,
    /// Estimate in hours
    pub estimated_hours: f64,
    /// Names (or ids) of tasks that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Requirement ids this task covers
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Current status
    pub status: TaskStatus,
}

impl Task {
    /// Create a pending task.
    pub fn new(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            priority: TaskPriority::Medium,
            estimated_hours: 0.0,
            dependencies: Vec::new(),
            requirements: Vec::new(),
            status: TaskStatus::Pending,
        }
    }

    /// Set priority.
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set estimate.
    pub fn estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Whether `reference` (a dependency entry) points at this task.
    ///
    /// Matches the id exactly, or the name by substring in either direction
    /// ("用户登录功能" refers to "实现用户登录功能").
    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        if reference.is_empty() {
            return false;
        }
        self.task_id == reference || self.name.contains(reference) || reference.contains(self.name.as_str())
    }
}

/// Progress summary of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Number of tasks
    pub total_tasks: usize,
    /// Completed tasks
    pub completed_tasks: usize,
    /// In-progress tasks
    pub in_progress_tasks: usize,
    /// Pending tasks
    pub pending_tasks: usize,
    /// Blocked tasks
    pub blocked_tasks: usize,
    /// `completed / total * 100`
    pub progress_percentage: f64,
    /// Sum of all estimates
    pub total_estimated_hours: f64,
    /// Sum of completed estimates
    pub completed_hours: f64,
}

/// Tasks parsed from one document, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    /// Owning project
    pub project_id: String,
    /// Stage the document belongs to
    pub stage_id: String,
    /// Tasks
    pub tasks: Vec<Task>,
    /// Creation time
    pub created_at: Time,
    /// Last mutation
    pub updated_at: Time,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new(project_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            project_id: project_id.into(),
            stage_id: stage_id.into(),
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of all task estimates.
    pub fn total_estimated_hours(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_hours).sum()
    }

    /// Find a task by id.
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    fn dependency_completed(&self, task: &Task, reference: &str) -> bool {
        self.tasks
            .iter()
            .filter(|other| other.task_id != task.task_id)
            .find(|other| other.matches_reference(reference))
            .map(|other| other.status == TaskStatus::Completed)
            // A dependency outside the queue cannot be tracked, so it never blocks.
            .unwrap_or(true)
    }

    /// Pending tasks whose dependencies are all completed, in document order.
    pub fn next_executable(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.dependencies.iter().all(|d| self.dependency_completed(t, d)))
            .collect()
    }

    /// Change a task's status. Returns false for an unknown id.
    pub fn update_status(&mut self, task_id: &str, status: TaskStatus) -> bool {
        match self.tasks.iter_mut().find(|t| t.task_id == task_id) {
            Some(task) => {
                task.status = status;
                self.updated_at = chrono::Utc::now();
                true
            }
            None => false,
        }
    }

    /// Progress summary.
    pub fn progress(&self) -> TaskProgress {
        let count = |status: TaskStatus| self.tasks.iter().filter(|t| t.status == status).count();
        let total = self.tasks.len();
        let completed = count(TaskStatus::Completed);
        TaskProgress {
            total_tasks: total,
            completed_tasks: completed,
            in_progress_tasks: count(TaskStatus::InProgress),
            pending_tasks: count(TaskStatus::Pending),
            blocked_tasks: count(TaskStatus::Blocked),
            progress_percentage: if total == 0 { 0.0 } else { completed as f64 / total as f64 * 100.0 },
            total_estimated_hours: self.total_estimated_hours(),
            completed_hours: self
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.estimated_hours)
                .sum(),
        }
    }
}
