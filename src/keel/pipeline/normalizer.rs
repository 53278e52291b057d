// SPDX-License-Identifier: MIT

//! Task normalization - turns manifest declarations into graph nodes
//!
//! Normalization never fails as a whole: a declaration that can't be made
//! sense of becomes a node already marked `Failed`, so the rest of the run
//! still goes ahead and its dependents fail by cascade.

use std::path::{Path, PathBuf};

use super::task::{
    NormalizedTask, TaskKind, TaskStatus, DEAD_TASK_NAME, DEFAULT_DOCKERFILE_NAME, ROOT_TASK_NAME,
};
use crate::keel::manifest::TaskSpec;
use crate::kit::reference::{familiar, ReferenceNormalizer};

/// Fills defaults, resolves paths and image references
pub struct TaskNormalizer<'a> {
    references: &'a dyn ReferenceNormalizer,
}

impl<'a> TaskNormalizer<'a> {
    pub fn new(references: &'a dyn ReferenceNormalizer) -> Self {
        Self { references }
    }

    pub fn normalize_all(&self, specs: &[TaskSpec]) -> Vec<NormalizedTask> {
        specs.iter().map(|spec| self.normalize(spec)).collect()
    }

    pub fn normalize(&self, spec: &TaskSpec) -> NormalizedTask {
        let declared_tags = spec.declared_tags();
        let mut failure: Option<String> = None;

        let kind = match spec.kind.as_deref() {
            Some(raw) => raw.parse::<TaskKind>().unwrap_or_else(|e| {
                log::error!("{}", e);
                failure = Some(e);
                infer_kind(spec, &declared_tags)
            }),
            None => infer_kind(spec, &declared_tags),
        };

        let mut name = spec
            .task
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if kind == TaskKind::DockerBuild && name.is_none() {
            name = declared_tags.first().cloned();
        }

        let mut task = NormalizedTask::new(name.clone().unwrap_or_default(), kind);
        task.depends_on = normalize_depends_on(&spec.depends_on.to_vec());
        task.args = spec.string_args();
        task.skip = spec.skip;
        task.push = spec.push;
        task.script = spec.command.clone();
        task.check = spec.validate.clone();
        task.description = spec.description.clone();
        task.manifest_path = spec.manifest_path.clone();
        task.tags = declared_tags.clone();

        if let Some(message) = failure {
            task.fail(message);
        }
        if task.skip && task.status == TaskStatus::Pending {
            task.status = TaskStatus::Skipped;
            task.message = Some("Skipped due to \"skip\": true flag".to_string());
        }

        if kind == TaskKind::DockerBuild && !task.skip {
            let raw_tags: Vec<String> = if declared_tags.is_empty() {
                name.iter().cloned().collect()
            } else {
                declared_tags
            };
            self.resolve_tags(&mut task, &raw_tags);
            resolve_paths(&mut task, spec);
        }

        if name.is_none() {
            let message = format!(
                "No \"task\" or \"tag\" params defined for {}, so the task can't be named",
                serde_json::to_string(spec).unwrap_or_default()
            );
            log::error!("{}", message);
            task.name = DEAD_TASK_NAME.to_string();
            task.fail(message);
        }

        task
    }

    fn resolve_tags(&self, task: &mut NormalizedTask, raw_tags: &[String]) {
        let mut tags: Vec<String> = Vec::with_capacity(raw_tags.len());
        for raw in raw_tags {
            match self.references.normalize(raw) {
                Ok(full) => {
                    let short = familiar(&full);
                    if !tags.contains(&short) {
                        tags.push(short);
                    }
                }
                Err(e) => {
                    log::error!("Task \"{}\": {}", task.name, e);
                    task.tags = vec![];
                    task.fail(e.to_string());
                    return;
                }
            }
        }
        task.tags = tags;
    }
}

/// `COMMAND` when only a command is given, `DOCKER_BUILD` otherwise
fn infer_kind(spec: &TaskSpec, declared_tags: &[String]) -> TaskKind {
    if spec.command.is_some() && spec.dockerfile.is_none() && declared_tags.is_empty() {
        TaskKind::Command
    } else {
        TaskKind::DockerBuild
    }
}

fn normalize_depends_on(raw: &[String]) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for dep in raw.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
        if !deps.iter().any(|d| d == dep) {
            deps.push(dep.to_string());
        }
    }
    if deps.is_empty() {
        deps.push(ROOT_TASK_NAME.to_string());
    }
    deps
}

fn manifest_dir(spec: &TaskSpec) -> PathBuf {
    spec.manifest_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
}

fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn resolve_paths(task: &mut NormalizedTask, spec: &TaskSpec) {
    let base = manifest_dir(spec);

    let dockerfile = spec.dockerfile.as_deref().map(|d| {
        let resolved = resolve_against(&base, d);
        if resolved.is_dir() {
            resolved.join(DEFAULT_DOCKERFILE_NAME)
        } else {
            resolved
        }
    });

    let context = match (&spec.context, &dockerfile) {
        (Some(ctx), _) => resolve_against(&base, ctx),
        (None, Some(df)) => df.parent().map(Path::to_path_buf).unwrap_or_else(|| base.clone()),
        (None, None) => base.clone(),
    };

    task.dockerfile = dockerfile;
    task.context = Some(context);
}
