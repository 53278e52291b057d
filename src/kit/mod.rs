// SPDX-License-Identifier: MIT

//! Collaborator boundaries used by the orchestrator
//!
//! - `error` - typed error hierarchy
//! - `process` - `ProcessRunner` trait and the `sh -c` runner
//! - `reference` - `ReferenceNormalizer` trait and Docker reference rules

pub mod error;
pub mod process;
pub mod reference;
