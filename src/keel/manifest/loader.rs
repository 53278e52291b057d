// SPDX-License-Identifier: MIT

//! Manifest loader - locates and parses JSON/YAML manifest files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{ManifestDocument, TaskSpec};
use crate::kit::error::{KeelError, ManifestError};

/// File extensions recognised as manifests, lower-case
pub const MANIFEST_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// A parsed manifest file
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub tasks: Vec<TaskSpec>,
}

/// Loads task manifests from disk
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    /// Run-level `args` given to every task that declares none
    default_args: BTreeMap<String, String>,
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.default_args = args;
        self
    }

    /// Resolve `path` to a manifest file. A directory is searched for the
    /// first manifest-looking file in name order.
    pub fn locate<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, KeelError> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !path.exists() {
            return Err(ManifestError::NotFound(path).into());
        }
        if !path.is_dir() {
            return Ok(path);
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_manifest_extension(p))
            .collect();
        candidates.sort();

        if candidates.len() > 1 {
            let names: Vec<String> = candidates
                .iter()
                .map(|p| format!("\"{}\"", p.display()))
                .collect();
            log::warn!(
                "More than one possible manifest found: {}, using the first",
                names.join(" ")
            );
        }

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ManifestError::NoManifestInDirectory(path).into())
    }

    /// Load a single manifest; each task remembers where it came from
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Manifest, KeelError> {
        let path = self.locate(path)?;
        log::info!("Loading manifest file: \"{}\"", path.display());

        let ext = extension_of(&path);
        let content = fs::read_to_string(&path)?;
        let tasks = match ext.as_str() {
            "json" => Self::parse_json(&content),
            "yaml" | "yml" => Self::parse_yaml(&content),
            _ => {
                return Err(ManifestError::UnknownFormat {
                    ext,
                    path: path.clone(),
                }
                .into())
            }
        }
        .map_err(|e| ManifestError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let tasks = tasks
            .into_iter()
            .map(|mut t| {
                t.manifest_path = Some(path.clone());
                if t.args.is_empty() && !self.default_args.is_empty() {
                    t.args = self
                        .default_args
                        .iter()
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect();
                }
                t
            })
            .collect::<Vec<_>>();

        if tasks.is_empty() {
            log::warn!("No tasks defined in manifest: \"{}\"", path.display());
        }

        Ok(Manifest { path, tasks })
    }

    /// Load several manifests and concatenate their tasks in order
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<TaskSpec>, KeelError> {
        let mut tasks = Vec::new();
        for path in paths {
            tasks.extend(self.load(path)?.tasks);
        }
        Ok(tasks)
    }

    /// Parse manifest tasks from a JSON string
    pub fn parse_json(content: &str) -> Result<Vec<TaskSpec>, KeelError> {
        if content.trim().is_empty() {
            return Ok(vec![]);
        }
        let doc: ManifestDocument = serde_json::from_str(content)?;
        Ok(doc.into_tasks())
    }

    /// Parse manifest tasks from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Vec<TaskSpec>, KeelError> {
        if content.trim().is_empty() {
            return Ok(vec![]);
        }
        let doc: Option<ManifestDocument> = serde_yaml::from_str(content)?;
        Ok(doc.map(ManifestDocument::into_tasks).unwrap_or_default())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn has_manifest_extension(path: &Path) -> bool {
    MANIFEST_EXTENSIONS.contains(&extension_of(path).as_str())
}
