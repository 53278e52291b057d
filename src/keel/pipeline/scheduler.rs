// SPDX-License-Identifier: MIT

//! Topological ordering of the task graph (Kahn's algorithm)

use std::collections::BTreeSet;

use super::graph::TaskGraph;
use crate::kit::error::GraphError;

/// Order the graph so every task comes after its dependencies.
///
/// Among tasks that are ready at the same time the one inserted into the
/// graph first wins, so identical input always yields the same order.
/// Assigns `order = 1..N` to the non-root nodes and returns their indices in
/// execution order.
pub fn schedule(graph: &mut TaskGraph) -> Result<Vec<usize>, GraphError> {
    let n = graph.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(from, to) in graph.edges() {
        indegree[to] += 1;
        dependents[from].push(to);
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut sorted: Vec<usize> = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        sorted.push(idx);
        for &next in &dependents[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if sorted.len() < n {
        let cyclic: Vec<String> = (0..n)
            .filter(|&i| indegree[i] > 0)
            .map(|i| graph.node(i).name.clone())
            .collect();
        log::error!("Circular dependency between tasks: {:?}", cyclic);
        return Err(GraphError::CycleDetected(cyclic));
    }

    let order: Vec<usize> = sorted
        .into_iter()
        .filter(|&i| !graph.node(i).is_root())
        .collect();
    for (pos, &idx) in order.iter().enumerate() {
        graph.node_mut(idx).order = pos + 1;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keel::pipeline::graph::ROOT_INDEX;
    use crate::keel::pipeline::task::{NormalizedTask, TaskKind};

    fn task(name: &str, deps: &[&str]) -> NormalizedTask {
        let mut t = NormalizedTask::new(name, TaskKind::Command);
        if !deps.is_empty() {
            t.depends_on = deps.iter().map(|d| d.to_string()).collect();
        }
        t
    }

    fn ordered_names(graph: &TaskGraph, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| graph.node(i).name.clone()).collect()
    }

    #[test]
    fn test_dependency_comes_first() {
        let mut graph =
            TaskGraph::build(vec![task("app", &["base"]), task("base", &[])]).unwrap();
        let order = schedule(&mut graph).unwrap();

        assert_eq!(ordered_names(&graph, &order), vec!["base", "app"]);
        assert_eq!(graph.get("base").unwrap().order, 1);
        assert_eq!(graph.get("app").unwrap().order, 2);
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let mut graph =
            TaskGraph::build(vec![task("c", &[]), task("a", &[]), task("b", &[])]).unwrap();
        let order = schedule(&mut graph).unwrap();
        assert_eq!(ordered_names(&graph, &order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_order_is_topological() {
        let mut graph = TaskGraph::build(vec![
            task("deploy", &["api", "web"]),
            task("api", &["lib"]),
            task("web", &["lib", "assets"]),
            task("lib", &[]),
            task("assets", &[]),
            task("tools:lint", &["lib"]),
        ])
        .unwrap();
        let order = schedule(&mut graph).unwrap();

        assert_eq!(order.len(), graph.len() - 1);
        for &(from, to) in graph.edges() {
            if from == ROOT_INDEX {
                continue;
            }
            assert!(
                graph.node(from).order < graph.node(to).order,
                "{} must run before {}",
                graph.node(from).name,
                graph.node(to).name
            );
        }
    }

    #[test]
    fn test_hierarchy_control_runs_after_children() {
        let mut graph = TaskGraph::build(vec![task("a:b:c", &[])]).unwrap();
        let order = schedule(&mut graph).unwrap();
        assert_eq!(ordered_names(&graph, &order), vec!["a:b:c", "a", "a:b"]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph = TaskGraph::build(vec![
            task("a", &["b"]),
            task("b", &["a"]),
            task("c", &[]),
        ])
        .unwrap();
        let err = schedule(&mut graph).unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = TaskGraph::build(vec![task("a", &["a"])]).unwrap();
        assert!(matches!(
            schedule(&mut graph),
            Err(GraphError::CycleDetected(_))
        ));
    }
}
