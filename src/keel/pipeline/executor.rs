// SPDX-License-Identifier: MIT

//! Sequential task executor
//!
//! Runs scheduled tasks one at a time. A task whose dependencies are not all
//! `Done` when its turn comes fails without being invoked, so a failure
//! cascades through everything downstream of it. Task-level failures never
//! abort the run; they are recorded on the node and show up in the report.

use chrono::Local;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::command::{self, CommandOptions};
use super::graph::TaskGraph;
use super::report::{format_task_line, RunReport, TaskSummary};
use super::task::{TaskKind, TaskStatus};
use crate::kit::error::ProcessError;
use crate::kit::process::{OutputLine, ProcessRunner, SIGNAL_EXIT_CODE};

const SEPARATOR: &str = "----------------";

/// Resolves exactly once with the terminal snapshot of its task
pub struct TaskHandle {
    name: String,
    rx: oneshot::Receiver<TaskSummary>,
}

impl TaskHandle {
    /// Wait for the task to finish. A handle whose task was never reported
    /// resolves as `Unknown` instead of erroring.
    pub async fn wait(self) -> TaskSummary {
        let name = self.name;
        self.rx.await.unwrap_or_else(|_| TaskSummary {
            order: 0,
            name,
            kind: TaskKind::Control,
            status: TaskStatus::Unknown,
            code: None,
            message: Some("Task was never reported as finished".to_string()),
            command: None,
        })
    }
}

/// Result of one step: exit code and a status line
struct StepOutcome {
    status: TaskStatus,
    code: i32,
    message: String,
}

/// Executes a scheduled task graph
pub struct Executor {
    runner: Arc<dyn ProcessRunner>,
    options: CommandOptions,
}

impl Executor {
    pub fn new(runner: Arc<dyn ProcessRunner>, options: CommandOptions) -> Self {
        Self { runner, options }
    }

    /// Synthesize commands for every scheduled task
    pub fn prepare(&self, graph: &mut TaskGraph, order: &[usize]) {
        for &idx in order {
            command::apply(graph.node_mut(idx), &self.options);
        }
    }

    /// Log the execution plan
    pub fn log_plan(&self, graph: &TaskGraph, order: &[usize]) {
        log::info!("Following tasks execution order will be used:");
        for &idx in order {
            let t = graph.node(idx);
            let message = t
                .command
                .as_deref()
                .or(t.message.as_deref())
                .or(t.description.as_deref())
                .unwrap_or("");
            log::info!(
                "  {}",
                format_task_line(t.order, order.len(), t.kind, t.status, &t.name, message)
            );
        }
    }

    /// Run every task in `order` and collect the report
    pub async fn run(&self, graph: &mut TaskGraph, order: &[usize]) -> RunReport {
        self.drive(graph, order, Vec::new()).await
    }

    /// Start the run on the tokio runtime.
    ///
    /// Returns one handle per scheduled task, in execution order, each
    /// resolving as soon as its task reaches a terminal status, plus the join
    /// handle of the whole run.
    pub fn spawn(
        self,
        mut graph: TaskGraph,
        order: Vec<usize>,
    ) -> (Vec<TaskHandle>, JoinHandle<RunReport>) {
        let mut senders = Vec::with_capacity(order.len());
        let mut handles = Vec::with_capacity(order.len());
        for &idx in &order {
            let (tx, rx) = oneshot::channel();
            senders.push(tx);
            handles.push(TaskHandle {
                name: graph.node(idx).name.clone(),
                rx,
            });
        }

        let join = tokio::spawn(async move { self.drive(&mut graph, &order, senders).await });
        (handles, join)
    }

    async fn drive(
        &self,
        graph: &mut TaskGraph,
        order: &[usize],
        senders: Vec<oneshot::Sender<TaskSummary>>,
    ) -> RunReport {
        let started_at = Local::now();
        self.prepare(graph, order);
        self.log_plan(graph, order);
        log::info!(
            "Run started at: {}",
            started_at.format("%Y-%m-%d %H:%M:%S")
        );

        let mut senders = senders.into_iter();
        let mut tasks = Vec::with_capacity(order.len());
        for &idx in order {
            let summary = self.execute(graph, idx, order.len()).await;
            log::info!("{}", SEPARATOR);
            if let Some(tx) = senders.next() {
                let _ = tx.send(summary.clone());
            }
            tasks.push(summary);
        }

        RunReport {
            started_at,
            finished_at: Local::now(),
            dry_run: self.options.dry_run,
            tasks,
        }
    }

    /// Drive one task to a terminal status
    async fn execute(&self, graph: &mut TaskGraph, idx: usize, total: usize) -> TaskSummary {
        let status = graph.node(idx).status;
        if status.is_terminal() {
            let task = graph.node_mut(idx);
            if status == TaskStatus::Skipped {
                task.code = Some(0);
            }
            log::info!(
                "{}",
                format_task_line(
                    task.order,
                    total,
                    task.kind,
                    task.status,
                    &task.name,
                    task.message.as_deref().unwrap_or("")
                )
            );
            return TaskSummary::from(&*task);
        }

        let unmet = self.unmet_dependencies(graph, idx);
        if !unmet.is_empty() {
            let names: Vec<String> = unmet.iter().map(|n| format!("\"{}\"", n)).collect();
            let task = graph.node_mut(idx);
            task.fail(format!("Not started, unmet dependencies: {}", names.join(", ")));
            log::info!(
                "{}",
                format_task_line(
                    task.order,
                    total,
                    task.kind,
                    task.status,
                    &task.name,
                    task.message.as_deref().unwrap_or("")
                )
            );
            return TaskSummary::from(&*task);
        }

        let kind = graph.node(idx).kind;
        let outcome = match kind {
            TaskKind::Control => Ok(StepOutcome {
                status: TaskStatus::Done,
                code: 0,
                message: "Completed successfully".to_string(),
            }),
            TaskKind::DockerBuild | TaskKind::DockerPush | TaskKind::Command => {
                self.run_task(graph, idx, total).await
            }
        };

        let task = graph.node_mut(idx);
        match outcome {
            Ok(step) => {
                task.status = step.status;
                task.code = Some(step.code);
                task.message = Some(step.message);
            }
            Err(e) => {
                log::error!("Task \"{}\": {}", task.name, e);
                task.status = TaskStatus::Failed;
                task.code = Some(SIGNAL_EXIT_CODE);
                task.message = Some(e.to_string());
            }
        }
        log::info!(
            "{}",
            format_task_line(
                task.order,
                total,
                task.kind,
                task.status,
                &task.name,
                task.message.as_deref().unwrap_or("")
            )
        );
        TaskSummary::from(&*task)
    }

    /// Dependencies of `idx` that are not `Done`
    fn unmet_dependencies(&self, graph: &TaskGraph, idx: usize) -> Vec<String> {
        graph
            .node(idx)
            .depends_on
            .iter()
            .filter(|dep| {
                graph
                    .get(dep)
                    .map(|d| d.status != TaskStatus::Done)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    async fn run_task(
        &self,
        graph: &mut TaskGraph,
        idx: usize,
        total: usize,
    ) -> Result<StepOutcome, ProcessError> {
        let task = graph.node_mut(idx);
        let Some(command) = task.command.clone() else {
            return Ok(StepOutcome {
                status: TaskStatus::Failed,
                code: SIGNAL_EXIT_CODE,
                message: "No command to run".to_string(),
            });
        };
        let validate = task.validate.clone();
        let name = task.name.clone();

        task.status = TaskStatus::Running;
        task.message = Some(format!(
            "Started at: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        log::info!(
            "{}",
            format_task_line(
                task.order,
                total,
                task.kind,
                task.status,
                &task.name,
                task.message.as_deref().unwrap_or("")
            )
        );

        let Some(validate) = validate else {
            let code = self.run_command(&name, &command).await?;
            return Ok(exit_outcome(code));
        };

        let before = self.run_command(&name, &validate).await?;
        // A dry-run validate is an echo and always passes
        if before == 0 && !self.options.dry_run {
            return Ok(StepOutcome {
                status: TaskStatus::Done,
                code: 0,
                message: "Already satisfied, validate passed".to_string(),
            });
        }

        let code = self.run_command(&name, &command).await?;
        let after = self.run_command(&name, &validate).await?;
        Ok(match (code, after) {
            (0, 0) => StepOutcome {
                status: TaskStatus::Done,
                code: 0,
                message: "Completed successfully, validate passed".to_string(),
            },
            (0, after) => StepOutcome {
                status: TaskStatus::Failed,
                code: after,
                message: format!("Command succeeded but validate failed with code: {}", after),
            },
            (code, _) => exit_outcome(code),
        })
    }

    /// Run one shell command, forwarding its output to the log
    async fn run_command(&self, name: &str, command: &str) -> Result<i32, ProcessError> {
        log::info!("[{}] $ {}", name, command);
        let (tx, mut rx) = mpsc::channel::<OutputLine>(256);
        let drain = async {
            while let Some(line) = rx.recv().await {
                log::info!("[{}] {}: {}", name, line.stream.label(), line.line);
            }
        };
        let (result, ()) = tokio::join!(self.runner.run(command, tx), drain);
        result
    }
}

fn exit_outcome(code: i32) -> StepOutcome {
    if code == 0 {
        StepOutcome {
            status: TaskStatus::Done,
            code,
            message: "Completed successfully".to_string(),
        }
    } else {
        StepOutcome {
            status: TaskStatus::Failed,
            code,
            message: format!("Failed with code: {}", code),
        }
    }
}
