// SPDX-License-Identifier: MIT

//! Manifest loading
//!
//! Manifests are JSON or YAML files holding a list of task declarations.

pub mod loader;
pub mod types;

pub use loader::{Manifest, ManifestLoader};
pub use types::{OneOrMany, TaskSpec};
