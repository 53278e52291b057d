// SPDX-License-Identifier: MIT

//! Typed error handling for keel-rs
//!
//! `KeelError` is what aborts a run. Reference, synthesis and process errors
//! are recovered on the task that raised them and surface in the run report.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for keel-rs
#[derive(Debug, Error)]
pub enum KeelError {
    /// Task graph could not be built or ordered
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Manifest could not be located or parsed
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Bad command line or environment values
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// The run itself could not be driven to completion
    #[error("{0}")]
    Other(String),
}

/// Graph construction and scheduling errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// A manifest task uses the name reserved for the root task
    #[error("Don't use reserved root task name in manifests: \"{0}\"")]
    ReservedName(String),

    /// The dependency edges contain at least one cycle
    #[error("Circular dependency detected between tasks: {0:?}")]
    CycleDetected(Vec<String>),
}

/// Manifest discovery and parsing errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest path does not exist: \"{0}\"")]
    NotFound(PathBuf),

    #[error("No manifest file found in directory: \"{0}\"")]
    NoManifestInDirectory(PathBuf),

    #[error("Unknown file format: \"{ext}\" of file \"{path}\"")]
    UnknownFormat { ext: String, path: PathBuf },

    #[error("Can't parse manifest \"{path}\": {message}")]
    Parse { path: PathBuf, message: String },
}

/// Image reference format errors
#[derive(Debug, Error, PartialEq)]
pub enum ReferenceError {
    #[error("invalid reference format: \"{0}\"")]
    InvalidFormat(String),

    #[error("invalid reference format: repository name must be lowercase: \"{0}\"")]
    Uppercase(String),

    #[error("repository name must not be more than {max} characters: \"{name}\"")]
    NameTooLong { name: String, max: usize },

    #[error("invalid repository name \"{0}\", cannot specify 64-byte hexadecimal strings")]
    HexIdentifier(String),

    #[error("repository name must have at least one component")]
    Empty,
}

/// A task whose type has no derivable shell command
#[derive(Debug, Error, PartialEq)]
pub enum SynthesisError {
    #[error("Task \"{0}\" has no \"command\" to run")]
    MissingCommand(String),

    #[error("Task \"{0}\" has no tags to push")]
    MissingTags(String),
}

/// Child process errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Can't spawn \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {stream}: {source}")]
    Stream {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl KeelError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Configuration-class errors: the user has to fix the manifest or the
    /// command line before anything can run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Graph(_) | Self::Manifest(_) | Self::Config(_))
    }
}
