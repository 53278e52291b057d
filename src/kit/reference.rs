// SPDX-License-Identifier: MIT

//! Container image reference normalization
//!
//! Implements the "parse normalized named" rules of the Docker distribution
//! reference grammar: familiar names such as `redis:7` are expanded to the
//! fully-qualified `docker.io/library/redis:7`.

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ReferenceError;

pub const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const LOCALHOST: &str = "localhost";
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

const NAME_COMPONENT: &str = r"[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*";
const DOMAIN: &str = r"(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*(?::[0-9]+)?";
const TAG: &str = r"[\w][\w.-]{0,127}";
const DIGEST: &str = r"[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[A-Fa-f0-9]{32,}";

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    let name = format!("(?:{DOMAIN}/)?{NAME_COMPONENT}(?:/{NAME_COMPONENT})*");
    Regex::new(&format!("^({name})(?::({TAG}))?(?:@({DIGEST}))?$"))
        .expect("reference grammar is a valid regex")
});

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-f0-9]{64}$").expect("identifier grammar is a valid regex"));

/// Turns a user-supplied image tag into a fully-qualified reference
pub trait ReferenceNormalizer: Send + Sync {
    fn normalize(&self, reference: &str) -> Result<String, ReferenceError>;
}

/// Normalizer following Docker Hub defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerReferenceNormalizer;

impl DockerReferenceNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Split `name` into registry domain and the rest of the reference.
    fn split_domain(name: &str) -> (String, String) {
        let (mut domain, mut remainder) = match name.find('/') {
            Some(i) if Self::looks_like_domain(&name[..i]) => {
                (name[..i].to_string(), name[i + 1..].to_string())
            }
            _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
        };
        if domain == LEGACY_DEFAULT_DOMAIN {
            domain = DEFAULT_DOMAIN.to_string();
        }
        if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
            remainder = format!("{OFFICIAL_REPO_PREFIX}{remainder}");
        }
        (domain, remainder)
    }

    fn looks_like_domain(candidate: &str) -> bool {
        candidate.contains(['.', ':'])
            || candidate == LOCALHOST
            || candidate.to_lowercase() != candidate
    }
}

impl ReferenceNormalizer for DockerReferenceNormalizer {
    fn normalize(&self, reference: &str) -> Result<String, ReferenceError> {
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }
        if IDENTIFIER_RE.is_match(reference) {
            return Err(ReferenceError::HexIdentifier(reference.to_string()));
        }

        let (domain, remainder) = Self::split_domain(reference);

        let remote_name = match remainder.find(':') {
            Some(i) => &remainder[..i],
            None => remainder.as_str(),
        };
        if remote_name.to_lowercase() != remote_name {
            return Err(ReferenceError::Uppercase(reference.to_string()));
        }

        let full = format!("{domain}/{remainder}");
        let captures = REFERENCE_RE
            .captures(&full)
            .ok_or_else(|| ReferenceError::InvalidFormat(reference.to_string()))?;

        let name_len = captures.get(1).map(|m| m.as_str().len()).unwrap_or(0);
        if name_len > NAME_TOTAL_LENGTH_MAX {
            return Err(ReferenceError::NameTooLong {
                name: reference.to_string(),
                max: NAME_TOTAL_LENGTH_MAX,
            });
        }

        Ok(full)
    }
}

/// Shorten a normalized reference to the form Docker shows users:
/// the default registry and the official `library/` namespace are dropped.
pub fn familiar(reference: &str) -> String {
    let Some(rest) = reference.strip_prefix(&format!("{DEFAULT_DOMAIN}/")) else {
        return reference.to_string();
    };
    match rest.strip_prefix(OFFICIAL_REPO_PREFIX) {
        Some(short) if !short.contains('/') => short.to_string(),
        _ => rest.to_string(),
    }
}
