// SPDX-License-Identifier: MIT

//! Command synthesis - maps a task to the shell text that performs it

use std::collections::BTreeMap;
use std::path::Path;

use super::task::{NormalizedTask, TaskKind, DEFAULT_IMAGE_NAME};
use crate::kit::error::SynthesisError;

/// Run-wide parameters that shape every synthesized command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    /// Replace every command with an echo of itself
    pub dry_run: bool,
    /// Appended to build and command invocations
    pub extra_args: Vec<String>,
}

/// Shell command for `task`, or `None` for no-op tasks
pub fn command_for(
    task: &NormalizedTask,
    options: &CommandOptions,
) -> Result<Option<String>, SynthesisError> {
    let command = if task.skip {
        Some(format!(
            "echo {}",
            single_quote(&format!("Task \"{}\" is skipped", task.name))
        ))
    } else {
        match task.kind {
            TaskKind::Control => None,
            TaskKind::DockerBuild => Some(docker_build(task, &options.extra_args)),
            TaskKind::DockerPush => Some(docker_push(task)?),
            TaskKind::Command => Some(shell_command(task, &options.extra_args)?),
        }
    };
    Ok(command.map(|c| dry_run_wrap(c, options.dry_run)))
}

/// Validate command for `task`; only `COMMAND` tasks carry one
pub fn validate_for(task: &NormalizedTask, options: &CommandOptions) -> Option<String> {
    if task.skip || task.kind != TaskKind::Command {
        return None;
    }
    task.check
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .map(|v| dry_run_wrap(v.clone(), options.dry_run))
}

/// Fill `command` and `validate` on the task; a synthesis failure fails it
pub fn apply(task: &mut NormalizedTask, options: &CommandOptions) {
    match command_for(task, options) {
        Ok(command) => {
            task.command = command;
            task.validate = validate_for(task, options);
        }
        Err(e) => {
            log::error!("{}", e);
            task.command = None;
            task.validate = None;
            if !task.status.is_terminal() {
                task.fail(e.to_string());
            }
        }
    }
}

fn docker_build(task: &NormalizedTask, extra_args: &[String]) -> String {
    let mut parts: Vec<String> = vec!["docker".to_string(), "build".to_string()];
    parts.extend(format_build_args(&task.args));
    if let Some(dockerfile) = &task.dockerfile {
        parts.push("-f".to_string());
        parts.push(shell_path(dockerfile));
    }

    let primary = task
        .tags
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_IMAGE_NAME);
    parts.push("-t".to_string());
    parts.push(primary.to_string());
    parts.extend(extra_args.iter().filter(|a| !a.is_empty()).cloned());
    parts.push(
        task.context
            .as_deref()
            .map(shell_path)
            .unwrap_or_else(|| ".".to_string()),
    );

    let mut chain = vec![parts.join(" ")];
    for alias in task.tags.iter().skip(1) {
        chain.push(format!("docker tag {} {}", primary, alias));
    }
    chain.join(" && ")
}

fn docker_push(task: &NormalizedTask) -> Result<String, SynthesisError> {
    if task.tags.is_empty() {
        return Err(SynthesisError::MissingTags(task.name.clone()));
    }
    Ok(task
        .tags
        .iter()
        .map(|tag| format!("docker push {}", tag))
        .collect::<Vec<_>>()
        .join(" && "))
}

fn shell_command(task: &NormalizedTask, extra_args: &[String]) -> Result<String, SynthesisError> {
    let script = task
        .script
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SynthesisError::MissingCommand(task.name.clone()))?;

    let mut parts = vec![script.clone()];
    parts.extend(format_args(&task.args));
    parts.extend(extra_args.iter().filter(|a| !a.is_empty()).cloned());
    Ok(parts.join(" "))
}

/// `--build-arg "KEY=VALUE"` flags, sorted by key
pub fn format_build_args(args: &BTreeMap<String, String>) -> Vec<String> {
    args.iter()
        .map(|(k, v)| format!("--build-arg \"{}={}\"", k, v.replace('"', "\\\"")))
        .collect()
}

/// `key value` pairs, sorted by key
pub fn format_args(args: &BTreeMap<String, String>) -> Vec<String> {
    args.iter().map(|(k, v)| format!("{} {}", k, v)).collect()
}

fn dry_run_wrap(command: String, dry_run: bool) -> String {
    if dry_run {
        format!("echo {}", single_quote(&format!("dry run of {}", command)))
    } else {
        command
    }
}

/// Wrap `s` in single quotes so the shell treats it as one literal word
pub fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn shell_path(path: &Path) -> String {
    let s = path.display().to_string();
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:@%+=,-".contains(c));
    if safe {
        s
    } else {
        single_quote(&s)
    }
}
