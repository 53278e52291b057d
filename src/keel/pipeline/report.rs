// SPDX-License-Identifier: MIT

//! Run report and the task log line format

use chrono::{DateTime, Local};
use serde::Serialize;

use super::task::{NormalizedTask, TaskKind, TaskStatus};

/// Terminal snapshot of one task
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskSummary {
    pub order: usize,
    pub name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub code: Option<i32>,
    pub message: Option<String>,
    pub command: Option<String>,
}

impl From<&NormalizedTask> for TaskSummary {
    fn from(task: &NormalizedTask) -> Self {
        Self {
            order: task.order,
            name: task.name.clone(),
            kind: task.kind,
            status: task.status,
            code: task.code,
            message: task.message.clone(),
            command: task.command.clone(),
        }
    }
}

/// Outcome of a whole run, tasks in execution order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub dry_run: bool,
    pub tasks: Vec<TaskSummary>,
}

impl RunReport {
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Non-zero counts per status
    pub fn counts(&self) -> Vec<(TaskStatus, usize)> {
        TaskStatus::ALL
            .iter()
            .map(|&s| (s, self.count(s)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Process exit code: 1 if any task failed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn get(&self, name: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Human-readable summary
    pub fn render(&self) -> String {
        let total = self.tasks.len();
        let mut lines = vec![
            String::new(),
            format!("Run ended at: {}", self.finished_at.format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            format!(
                "From {} processed task{}:",
                total,
                if total == 1 { "" } else { "s" }
            ),
        ];
        let width = digits(total);
        for (status, n) in self.counts() {
            lines.push(format!(
                "  {:>7}: {:>width$} {}",
                status.as_str(),
                n,
                status.face(),
                width = width
            ));
        }
        lines.push(String::new());
        lines.push("Tasks completion details:".to_string());
        for t in &self.tasks {
            lines.push(format!(
                "  {}",
                format_task_line(
                    t.order,
                    total,
                    t.kind,
                    t.status,
                    &t.name,
                    t.message.as_deref().unwrap_or("")
                )
            ));
        }
        lines.join("\n")
    }
}

fn digits(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// `<face>  <order>/<total>  <TYPE>  <STATUS>  <name>  <message>`
pub fn format_task_line(
    order: usize,
    total: usize,
    kind: TaskKind,
    status: TaskStatus,
    name: &str,
    message: &str,
) -> String {
    let width = digits(total);
    format!(
        "{}  {:>width$}/{:<width$}  {:<12}  {:<7}  {:<20}  {}",
        status.face(),
        order,
        total,
        kind.as_str(),
        status.as_str(),
        name,
        message,
        width = width
    )
    .trim_end()
    .to_string()
}
