//! Task-breakdown document parser.
//!
//! Two layouts are recognised and may be mixed in one document.
//!
//! Checklist bullets, with optional indented detail lines:
//!
//! ```text
//! - [ ] 1. 实现用户登录功能 [高] 4小时
//!   - 依赖: 用户注册功能
//!   - _需求: 1.1, 1.2_
//!   - 支持 JWT 会话
//! - [x] 2. Write migration script [low] 2h
//! ```
//!
//! Table rows:
//!
//! ```text
//! | T-001 | 用户注册功能 | 用户名+密码注册 | 4h | 高 | - |
//! | T-002 | 用户登录功能 | JWT认证 | 3h | 高 | T-001 |
//! ```

use aceflow_core::{Task, TaskPriority, TaskQueue, TaskStatus};
use regex::Regex;
use tracing::debug;

use crate::trait_::{Result, StorageError};

const CHECKLIST: &str = r"^[-*]\s+\[([ xX])\]\s+(?:(\d+(?:\.\d+)*)\.?\s+)?(.+?)\s*$";
const PRIORITY_TAG: &str = r"\[(高|中|低|(?i:high|medium|low))\]";
const HOURS: &str = r"(\d+(?:\.\d+)?)\s*(?:小时|(?i:hours|hour|hrs|hr|h))";
const DEPENDENCIES: &str = r"^[-*]?\s*(?:依赖|(?i:dependencies|depends on))\s*[:：]\s*(.*)$";
const REQUIREMENTS: &str = r"^[-*]?\s*_?(?:需求|(?i:requirements))\s*[:：]\s*(.*?)_?\s*$";
const TABLE_ROW: &str = r"^\|\s*([A-Za-z]+-\d+)\s*\|(.*)\|\s*$";

/// Parses task-breakdown Markdown into a [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct TaskParser {
    checklist: Regex,
    priority_tag: Regex,
    hours: Regex,
    dependencies: Regex,
    requirements: Regex,
    table_row: Regex,
}

impl TaskParser {
    /// Compile the parser.
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| StorageError::Parse(e.to_string()));
        Ok(Self {
            checklist: compile(CHECKLIST)?,
            priority_tag: compile(PRIORITY_TAG)?,
            hours: compile(HOURS)?,
            dependencies: compile(DEPENDENCIES)?,
            requirements: compile(REQUIREMENTS)?,
            table_row: compile(TABLE_ROW)?,
        })
    }

    /// Parse `content`. Lines that are neither tasks nor task details are
    /// ignored, so a whole stage document can be passed in.
    pub fn parse_document(&self, content: &str, project_id: &str, stage_id: &str) -> TaskQueue {
        let mut queue = TaskQueue::new(project_id, stage_id);
        let mut current: Option<Task> = None;

        for line in content.lines() {
            let indented = line.starts_with("  ") || line.starts_with('\t');
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if indented {
                if let Some(task) = current.as_mut() {
                    self.apply_detail(task, trimmed);
                }
                continue;
            }

            if let Some(task) = self.parse_checklist(trimmed, queue.tasks.len() + usize::from(current.is_some())) {
                queue.tasks.extend(current.replace(task));
                continue;
            }

            queue.tasks.extend(current.take());
            if let Some(task) = self.parse_table_row(trimmed) {
                queue.tasks.push(task);
            }
        }
        queue.tasks.extend(current);

        debug!("Parsed {} tasks for {}/{}", queue.tasks.len(), project_id, stage_id);
        queue
    }

    fn parse_checklist(&self, line: &str, seen: usize) -> Option<Task> {
        let caps = self.checklist.captures(line)?;
        let done = &caps[1] != " ";
        let number = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_else(|| (seen + 1).to_string());
        let rest = &caps[3];

        let priority = self
            .priority_tag
            .captures(rest)
            .and_then(|c| TaskPriority::parse(&c[1]))
            .unwrap_or(TaskPriority::Medium);
        let hours = self
            .hours
            .captures(rest)
            .and_then(|c| c[1].parse::<f64>().ok())
            .unwrap_or(0.0);

        let name = self.priority_tag.replace_all(rest, "");
        let name = self.hours.replace_all(&name, "");
        let name = name.trim().trim_end_matches(['-', ',', '，', '(', ')', '（', '）']).trim();
        if name.is_empty() {
            return None;
        }

        let mut task = Task::new(format!("task_{}", number), name)
            .priority(priority)
            .estimated_hours(hours);
        if done {
            task.status = TaskStatus::Completed;
        }
        Some(task)
    }

    fn apply_detail(&self, task: &mut Task, line: &str) {
        if let Some(caps) = self.dependencies.captures(line) {
            task.dependencies.extend(split_list(&caps[1]));
        } else if let Some(caps) = self.requirements.captures(line) {
            task.requirements.extend(split_list(&caps[1]));
        } else {
            let text = line.trim_start_matches(['-', '*']).trim();
            if text.is_empty() {
                return;
            }
            if !task.description.is_empty() {
                task.description.push('\n');
            }
            task.description.push_str(text);
        }
    }

    fn parse_table_row(&self, line: &str) -> Option<Task> {
        let caps = self.table_row.captures(line)?;
        let cells: Vec<&str> = caps[2].split('|').map(str::trim).collect();
        let cell = |i: usize| cells.get(i).copied().unwrap_or("");

        let name = cell(0);
        if name.is_empty() {
            return None;
        }

        let hours = self
            .hours
            .captures(cell(2))
            .and_then(|c| c[1].parse::<f64>().ok())
            .or_else(|| cell(2).parse::<f64>().ok())
            .unwrap_or(0.0);

        let mut task = Task::new(&caps[1], name)
            .priority(TaskPriority::parse(cell(3)).unwrap_or(TaskPriority::Medium))
            .estimated_hours(hours);
        task.description = cell(1).to_string();
        task.dependencies = split_list(cell(4));
        if matches!(cell(5), "x" | "X" | "✅" | "done" | "completed" | "已完成") {
            task.status = TaskStatus::Completed;
        }
        Some(task)
    }
}

/// Split a `a, b、c` list, dropping placeholders like `-` and `无`.
fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '，', '、', ';'])
        .map(|s| s.trim().trim_matches('_').trim())
        .filter(|s| !s.is_empty() && !matches!(*s, "-" | "无" | "none" | "None" | "N/A"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKLIST_DOC: &str = "\
# Tasks

- [ ] 1. 用户注册功能 [高] 4小时
  - 支持邮箱注册
- [ ] 2. 实现用户登录功能 [高] 3小时
  - 依赖: 用户注册功能
  - _需求: 1.1, 1.2_
- [x] 3. Write migration script [low] 1.5h
- [ ] 4. Dashboard [medium] 6h
  - Dependencies: 用户登录功能, Write migration script
";

    const TABLE_DOC: &str = "\
| 任务ID | 任务名称 | 描述 | 预估工时 | 优先级 | 依赖 |
|--------|----------|------|----------|--------|------|
| T-001 | 用户注册功能 | 用户名+密码注册 | 4h | 高 | - |
| T-002 | 用户登录功能 | JWT认证 | 3h | 高 | T-001 |
| T-003 | 密码加密存储 | bcrypt | 2h | 中 | T-001、T-002 |
";

    fn parser() -> TaskParser {
        TaskParser::new().unwrap()
    }

    #[test]
    fn test_parse_checklist() {
        let queue = parser().parse_document(CHECKLIST_DOC, "demo", "planning");
        assert_eq!(queue.tasks.len(), 4);

        let first = &queue.tasks[0];
        assert_eq!(first.task_id, "task_1");
        assert_eq!(first.name, "用户注册功能");
        assert_eq!(first.priority, TaskPriority::High);
        assert_eq!(first.estimated_hours, 4.0);
        assert_eq!(first.description, "支持邮箱注册");

        let second = &queue.tasks[1];
        assert_eq!(second.dependencies, vec!["用户注册功能"]);
        assert_eq!(second.requirements, vec!["1.1", "1.2"]);
        assert!(second.description.is_empty());

        let third = &queue.tasks[2];
        assert_eq!(third.name, "Write migration script");
        assert_eq!(third.status, TaskStatus::Completed);
        assert_eq!(third.priority, TaskPriority::Low);
        assert_eq!(third.estimated_hours, 1.5);

        assert_eq!(queue.tasks[3].dependencies.len(), 2);
        assert_eq!(queue.total_estimated_hours(), 14.5);
    }

    #[test]
    fn test_parse_table() {
        let queue = parser().parse_document(TABLE_DOC, "demo", "planning");
        assert_eq!(queue.tasks.len(), 3);
        assert_eq!(queue.tasks[0].task_id, "T-001");
        assert!(queue.tasks[0].dependencies.is_empty());
        assert_eq!(queue.tasks[1].dependencies, vec!["T-001"]);
        assert_eq!(queue.tasks[2].dependencies, vec!["T-001", "T-002"]);
        assert_eq!(queue.tasks[2].priority, TaskPriority::Medium);
        assert_eq!(queue.tasks[1].description, "JWT认证");
    }

    #[test]
    fn test_executable_order_follows_dependencies() {
        let mut queue = parser().parse_document(CHECKLIST_DOC, "demo", "planning");

        let ids: Vec<_> = queue.next_executable().iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, vec!["task_1"]);

        assert!(queue.update_status("task_1", TaskStatus::Completed));
        let ids: Vec<_> = queue.next_executable().iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, vec!["task_2"]);

        assert!(queue.update_status("task_2", TaskStatus::Completed));
        let ids: Vec<_> = queue.next_executable().iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, vec!["task_4"]);

        let progress = queue.progress();
        assert_eq!(progress.completed_tasks, 3);
        assert_eq!(progress.progress_percentage, 75.0);
        assert_eq!(progress.completed_hours, 8.5);
    }

    #[test]
    fn test_table_dependencies_by_id() {
        let mut queue = parser().parse_document(TABLE_DOC, "demo", "planning");
        let ids: Vec<_> = queue.next_executable().iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, vec!["T-001"]);
        queue.update_status("T-001", TaskStatus::Completed);
        let ids: Vec<_> = queue.next_executable().iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, vec!["T-002"]);
        assert!(!queue.update_status("T-999", TaskStatus::Completed));
    }

    #[test]
    fn test_ignores_prose() {
        let queue = parser().parse_document("Just some notes\n\n- a plain bullet\n", "demo", "planning");
        assert!(queue.tasks.is_empty());
    }
}
