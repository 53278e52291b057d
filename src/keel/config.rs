// SPDX-License-Identifier: MIT

//! Run configuration

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use super::pipeline::CommandOptions;
use crate::kit::error::KeelError;

/// Manifest path used when none is given on the command line
pub const MANIFEST_ENV: &str = "KEEL_MANIFEST";
/// Forces dry-run mode when set to `1` or `true`
pub const DRY_RUN_ENV: &str = "KEEL_DRY_RUN";

/// Everything a run needs to know
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub manifests: Vec<PathBuf>,
    pub dry_run: bool,
    pub extra_args: Vec<String>,
    /// `args` for every task that declares none
    pub default_args: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manifests: vec![PathBuf::from(".")],
            dry_run: false,
            extra_args: vec![],
            default_args: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Build a config from CLI values, filling gaps from the environment
    pub fn resolve(manifests: Vec<PathBuf>, dry_run: bool, extra_args: Vec<String>) -> Self {
        let manifests = if manifests.is_empty() {
            vec![env::var(MANIFEST_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))]
        } else {
            manifests
        };
        let dry_run = dry_run || env_flag(DRY_RUN_ENV);
        if dry_run {
            log::info!("Dry run mode is on, commands will only be echoed");
        }

        Self {
            manifests,
            dry_run,
            extra_args,
            default_args: BTreeMap::new(),
        }
    }

    pub fn with_default_args(mut self, args: impl IntoIterator<Item = (String, String)>) -> Self {
        self.default_args = args.into_iter().collect();
        self
    }

    pub fn command_options(&self) -> CommandOptions {
        let joined = self.extra_args.join(" ");
        CommandOptions {
            dry_run: self.dry_run,
            extra_args: if joined.trim().is_empty() {
                vec![]
            } else {
                vec![joined]
            },
        }
    }
}

/// Parse a `KEY=VALUE` run-level argument
pub fn parse_arg(raw: &str) -> Result<(String, String), KeelError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(KeelError::config(format!(
            "expected KEY=VALUE, got \"{}\"",
            raw
        ))),
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true")
}
