// SPDX-License-Identifier: MIT

//! Task graph construction
//!
//! Expands normalized tasks into the full node set:
//! - every `:`-separated ancestor of a task name becomes a `CONTROL` node
//!   depending on the task(s) beneath it, so `keel svc` style selection runs
//!   everything under `svc`
//! - a `DOCKER_BUILD` task with `push: true` is split into a build node and a
//!   push node; the push node keeps the declared name so dependents wait for
//!   the image to be pushed
//!
//! Node 0 is always the root task.

use std::collections::{HashMap, HashSet};

use super::task::{NormalizedTask, TaskKind, BUILD_TASK_SUFFIX, ROOT_TASK_NAME};
use crate::kit::error::GraphError;

/// Index of the root node
pub const ROOT_INDEX: usize = 0;

/// Owned node table plus dependency edges
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<NormalizedTask>,
    index: HashMap<String, usize>,
    /// `(dependency, dependent)` pairs
    edges: Vec<(usize, usize)>,
}

impl TaskGraph {
    /// Expand `tasks` and wire up their dependencies
    pub fn build(tasks: Vec<NormalizedTask>) -> Result<Self, GraphError> {
        let mut graph = Self {
            nodes: vec![NormalizedTask::root()],
            index: HashMap::from([(ROOT_TASK_NAME.to_string(), ROOT_INDEX)]),
            edges: vec![],
        };
        let mut synthetic: HashSet<usize> = HashSet::new();

        for task in tasks {
            if task.name == ROOT_TASK_NAME {
                return Err(GraphError::ReservedName(ROOT_TASK_NAME.to_string()));
            }
            if graph.index.contains_key(&task.name) {
                log::warn!("Task \"{}\" is already defined, dropping duplicate", task.name);
                continue;
            }

            let name = task.name.clone();
            let mut original = Some(task);
            for prefix in hierarchy_prefixes(&name) {
                if prefix == name {
                    if let Some(t) = original.take() {
                        graph.materialize(t);
                    }
                    continue;
                }
                match graph.index.get(&prefix) {
                    Some(&idx) if synthetic.contains(&idx) => {
                        let control = &mut graph.nodes[idx];
                        if !control.depends_on.contains(&name) {
                            control.depends_on.push(name.clone());
                        }
                    }
                    Some(_) => {}
                    None => {
                        let idx = graph.insert(NormalizedTask::control(prefix, vec![name.clone()]));
                        synthetic.insert(idx);
                    }
                }
            }
        }

        graph.connect();
        Ok(graph)
    }

    fn insert(&mut self, task: NormalizedTask) -> usize {
        let idx = self.nodes.len();
        self.index.insert(task.name.clone(), idx);
        self.nodes.push(task);
        idx
    }

    /// Insert a task, splitting build+push tasks into two chained nodes
    fn materialize(&mut self, task: NormalizedTask) {
        if task.kind != TaskKind::DockerBuild || !task.push {
            self.insert(task);
            return;
        }

        let build_name = format!("{}{}", task.name, BUILD_TASK_SUFFIX);
        let build = NormalizedTask {
            name: build_name.clone(),
            ..task.clone()
        };
        let push = NormalizedTask {
            kind: TaskKind::DockerPush,
            depends_on: vec![build_name],
            ..task
        };
        self.insert(build);
        self.insert(push);
    }

    /// Turn `depends_on` names into edges, dropping names that don't resolve
    fn connect(&mut self) {
        for idx in 1..self.nodes.len() {
            let mut kept: Vec<String> = Vec::new();
            for dep in &self.nodes[idx].depends_on {
                match self.index.get(dep) {
                    Some(&dep_idx) => {
                        self.edges.push((dep_idx, idx));
                        kept.push(dep.clone());
                    }
                    None => log::error!(
                        "Can't find dependency \"{}\" of task \"{}\", ignoring it",
                        dep,
                        self.nodes[idx].name
                    ),
                }
            }
            if kept.is_empty() {
                self.edges.push((ROOT_INDEX, idx));
                kept.push(ROOT_TASK_NAME.to_string());
            }
            self.nodes[idx].depends_on = kept;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn nodes(&self) -> &[NormalizedTask] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &NormalizedTask {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut NormalizedTask {
        &mut self.nodes[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&NormalizedTask> {
        self.index_of(name).map(|idx| &self.nodes[idx])
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Names of the nodes `name` depends on, in edge order
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(idx) = self.index_of(name) else {
            return vec![];
        };
        self.edges
            .iter()
            .filter(|(_, to)| *to == idx)
            .map(|(from, _)| self.nodes[*from].name.as_str())
            .collect()
    }
}

/// `"a:b:c"` -> `["a", "a:b", "a:b:c"]`; ancestors are lower-cased, the
/// last element is the name itself.
pub fn hierarchy_prefixes(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split(':').collect();
    let mut prefixes: Vec<String> = Vec::with_capacity(parts.len());
    for i in 1..parts.len() {
        prefixes.push(parts[..i].join(":").to_lowercase());
    }
    prefixes.push(name.to_string());
    prefixes
}
