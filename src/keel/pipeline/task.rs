// SPDX-License-Identifier: MIT

//! Task node types shared by every pipeline phase

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Reserved name of the sentinel every dependency-less task hangs off
pub const ROOT_TASK_NAME: &str = "$_ROOT_TASK_$";
/// Name given to tasks whose name can't be determined
pub const DEAD_TASK_NAME: &str = "$_DEAD_TASK_$";
/// Appended to the build half of a build+push task
pub const BUILD_TASK_SUFFIX: &str = ":$_build_$";
pub const DEFAULT_DOCKERFILE_NAME: &str = "Dockerfile";
/// Image name used when a build task carries no tag
pub const DEFAULT_IMAGE_NAME: &str = "latest";

/// What a task does when executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// No-op aggregator
    Control,
    DockerBuild,
    DockerPush,
    /// Arbitrary shell command
    Command,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Control => "CONTROL",
            TaskKind::DockerBuild => "DOCKER_BUILD",
            TaskKind::DockerPush => "DOCKER_PUSH",
            TaskKind::Command => "COMMAND",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "CONTROL" => Ok(TaskKind::Control),
            "DOCKER_BUILD" => Ok(TaskKind::DockerBuild),
            "DOCKER_PUSH" => Ok(TaskKind::DockerPush),
            "COMMAND" => Ok(TaskKind::Command),
            _ => Err(format!("Unknown task type: \"{}\"", s)),
        }
    }
}

/// Task lifecycle: `Pending -> {Skipped | Running} -> {Done | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Skipped,
    Running,
    Done,
    Failed,
    /// Internal-error paths only
    Unknown,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Done,
        TaskStatus::Failed,
        TaskStatus::Skipped,
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Unknown,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Unknown => "UNKNOWN",
        }
    }

    /// Small ASCII face shown next to the status in logs
    pub fn face(&self) -> &'static str {
        match self {
            TaskStatus::Skipped => " -.- ",
            TaskStatus::Pending => "[~_~]",
            TaskStatus::Running => "[O.O]",
            TaskStatus::Done => "(^_^)",
            TaskStatus::Failed => "{X.X}",
            TaskStatus::Unknown => "{x.x}",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the task graph
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTask {
    pub name: String,
    pub kind: TaskKind,
    /// Ordered, duplicate-free dependency names
    pub depends_on: Vec<String>,
    /// Ordered, duplicate-free image references
    pub tags: Vec<String>,
    pub dockerfile: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub args: BTreeMap<String, String>,
    pub skip: bool,
    pub push: bool,
    pub status: TaskStatus,
    /// Command text as declared in the manifest
    pub script: Option<String>,
    /// Validate text as declared in the manifest
    pub check: Option<String>,
    /// Synthesized shell command
    pub command: Option<String>,
    /// Synthesized validate command
    pub validate: Option<String>,
    /// 1-based execution position, 0 until scheduled
    pub order: usize,
    pub message: Option<String>,
    pub code: Option<i32>,
    pub description: Option<String>,
    pub manifest_path: Option<PathBuf>,
}

impl NormalizedTask {
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: vec![ROOT_TASK_NAME.to_string()],
            tags: vec![],
            dockerfile: None,
            context: None,
            args: BTreeMap::new(),
            skip: false,
            push: false,
            status: TaskStatus::Pending,
            script: None,
            check: None,
            command: None,
            validate: None,
            order: 0,
            message: None,
            code: None,
            description: None,
            manifest_path: None,
        }
    }

    /// The sentinel root node; never executed, always `Done`
    pub fn root() -> Self {
        Self {
            depends_on: vec![],
            status: TaskStatus::Done,
            description: Some("Root task (will not be executed)".to_string()),
            ..Self::new(ROOT_TASK_NAME, TaskKind::Control)
        }
    }

    /// A synthetic grouping node that waits on `depends_on`
    pub fn control(name: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self {
            depends_on,
            ..Self::new(name, TaskKind::Control)
        }
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_TASK_NAME
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.message = Some(message.into());
    }
}
