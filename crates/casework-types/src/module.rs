//! Logic-module naming, versioning, and manifests.
//!
//! Modules live on disk as `{root}/{name}-{version}/` directories. The name
//! must match `^[a-z][a-z0-9_]*$`; the version is the remainder after the
//! first `-` and is a dotted-numeric string compared component-wise, so
//! `0.0.10` sorts above `0.0.9`. An optional `module.yaml` manifest declares
//! the operations a module serves and whether it handles reply broadcasts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether `name` is a valid module name (`^[a-z][a-z0-9_]*$`).
pub fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Split a `name-version` directory name into its parts.
///
/// Returns `None` when the name part is invalid or the version part fails
/// to parse as dotted-numeric. The split is on the *first* `-`, so
/// `ingest-0.2.0` yields `("ingest", 0.2.0)`.
pub fn split_versioned_dir(dir_name: &str) -> Option<(String, ModuleVersion)> {
    let (name, version) = dir_name.split_once('-')?;
    if !is_valid_module_name(name) {
        return None;
    }
    let version = version.parse().ok()?;
    Some((name.to_string(), version))
}

/// A dotted-numeric module version.
///
/// Comparison is component-wise numeric with missing components treated as
/// zero, not lexical: `0.0.10 > 0.0.9`, and `1.2` orders equal to `1.2.0`.
#[derive(Debug, Clone)]
pub struct ModuleVersion {
    raw: String,
    components: Vec<u64>,
}

impl ModuleVersion {
    /// The numeric components as parsed.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// The version string exactly as it appeared in the directory name.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ModuleVersion {
    type Err = ModuleVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ModuleVersionError::Empty);
        }
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| ModuleVersionError::NonNumeric(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: s.to_string(),
            components,
        })
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for ModuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ModuleVersion {}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

/// Failure to parse a dotted-numeric version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleVersionError {
    #[error("empty version string")]
    Empty,

    #[error("non-numeric version component: '{0}'")]
    NonNumeric(String),
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Parsed `module.yaml` from a versioned module directory.
///
/// The manifest is optional: a module without one is assumed to serve any
/// operation and to ignore reply broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Operations the module serves. Empty means "any".
    #[serde(default)]
    pub operations: Vec<String>,
    /// Whether the module exposes the reply-handler operation.
    #[serde(default)]
    pub handles_replies: bool,
    /// Semver requirement on the host service version, e.g. `">=0.1"`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl ModuleManifest {
    /// Parse a manifest from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(text)
    }

    /// Check the manifest's `host` requirement against the running service
    /// version. A manifest without a requirement is compatible with any host.
    pub fn host_compatible(&self, host_version: &semver::Version) -> Result<bool, semver::Error> {
        match &self.host {
            None => Ok(true),
            Some(req) => Ok(semver::VersionReq::parse(req)?.matches(host_version)),
        }
    }
}
