// SPDX-License-Identifier: MIT

//! Normalize, expand, order and execute tasks

pub mod command;
pub mod executor;
pub mod graph;
pub mod normalizer;
pub mod report;
pub mod scheduler;
pub mod task;

pub use command::CommandOptions;
pub use executor::Executor;
pub use graph::TaskGraph;
pub use normalizer::TaskNormalizer;
pub use report::{RunReport, TaskSummary};
pub use scheduler::schedule;
pub use task::{NormalizedTask, TaskKind, TaskStatus};
