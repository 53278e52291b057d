// SPDX-License-Identifier: MIT

//! Manifest-driven task orchestration
//!
//! A run goes through four phases: load manifests, normalize declarations,
//! build and order the task graph, then execute it. Only the first and third
//! phases can abort the run; everything after is reported per task.

pub mod config;
pub mod manifest;
pub mod pipeline;

use std::sync::Arc;

use crate::kit::error::KeelError;
use crate::kit::process::ProcessRunner;
use crate::kit::reference::ReferenceNormalizer;
use config::RunConfig;
use manifest::ManifestLoader;
use pipeline::{schedule, Executor, RunReport, TaskGraph, TaskNormalizer};

/// Run every task declared in the configured manifests.
///
/// Returns `Ok(None)` when the manifests declare no tasks at all.
pub async fn run(
    config: &RunConfig,
    runner: Arc<dyn ProcessRunner>,
    references: &dyn ReferenceNormalizer,
) -> Result<Option<RunReport>, KeelError> {
    let specs = ManifestLoader::new()
        .with_default_args(config.default_args.clone())
        .load_all(&config.manifests[..])?;
    if specs.is_empty() {
        log::warn!("Nothing to do, no tasks declared");
        return Ok(None);
    }

    let tasks = TaskNormalizer::new(references).normalize_all(&specs);
    let mut graph = TaskGraph::build(tasks)?;
    let order = schedule(&mut graph)?;
    log::debug!("Task graph has {} nodes", graph.len());

    let executor = Executor::new(runner, config.command_options());
    let (handles, join) = executor.spawn(graph, order);
    for handle in handles {
        let summary = handle.wait().await;
        log::debug!("Task \"{}\" finished as {}", summary.name, summary.status);
    }
    let report = join
        .await
        .map_err(|e| KeelError::other(format!("Executor stopped unexpectedly: {}", e)))?;
    Ok(Some(report))
}
