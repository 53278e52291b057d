// SPDX-License-Identifier: MIT

//! Manifest schema types
//!
//! A manifest is a single task object or a list of them, written in JSON or
//! YAML. Everything except the task body is optional.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A field that accepts either a scalar or a list
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    /// Field absent or null
    #[default]
    None,
    /// Single value
    Single(String),
    /// Multiple values
    Multiple(Vec<String>),
}

impl OneOrMany {
    /// Convert to a vector of values
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::None => vec![],
            OneOrMany::Single(s) => vec![s.clone()],
            OneOrMany::Multiple(v) => v.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OneOrMany::None => true,
            OneOrMany::Single(_) => false,
            OneOrMany::Multiple(v) => v.is_empty(),
        }
    }
}

/// One task as written by the manifest author
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Task name; `:` separates hierarchy levels
    pub task: Option<String>,
    /// `CONTROL`, `DOCKER_BUILD`, `DOCKER_PUSH` or `COMMAND`; inferred when absent
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub tags: OneOrMany,
    pub dockerfile: Option<String>,
    pub context: Option<String>,
    /// Build args for images, `key value` pairs for commands
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    #[serde(default, alias = "depends_on")]
    pub depends_on: OneOrMany,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub push: bool,
    pub command: Option<String>,
    pub validate: Option<String>,
    pub description: Option<String>,
    /// Manifest file this task was read from
    #[serde(skip)]
    pub manifest_path: Option<PathBuf>,
}

impl TaskSpec {
    /// `tag` followed by `tags`, first occurrence kept
    pub fn declared_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tag.iter().cloned().chain(self.tags.to_vec()) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Args rendered as strings; scalars are stringified, null becomes empty
    pub fn string_args(&self) -> BTreeMap<String, String> {
        self.args
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// Top-level manifest document
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ManifestDocument {
    Many(Vec<TaskSpec>),
    One(Box<TaskSpec>),
}

impl ManifestDocument {
    pub(crate) fn into_tasks(self) -> Vec<TaskSpec> {
        match self {
            ManifestDocument::Many(tasks) => tasks,
            ManifestDocument::One(task) => vec![*task],
        }
    }
}
