//! Repository index types
//!
//! Helm-compatible repository index format: a YAML document mapping chart
//! names to version entry lists.

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RepoError, Result};

/// A version range constraint over chart versions.
///
/// The EMPTY constraint is meaningful: it matches every version, including
/// pre-releases. It is represented explicitly so nothing downstream can
/// accidentally reinterpret it as "latest stable".
#[derive(Debug, Clone, Default, PartialEq)]
pub enum VersionConstraint {
    /// Match any version, pre-releases included
    #[default]
    Any,

    /// Match a semver range expression
    Range(VersionReq),
}

impl VersionConstraint {
    /// Parse a constraint expression; empty text means [`Self::Any`]
    pub fn parse(expr: &str) -> Result<Self> {
        if expr.trim().is_empty() {
            return Ok(Self::Any);
        }
        let req = VersionReq::parse(expr).map_err(|e| RepoError::ResolutionFailed {
            message: format!("Invalid version constraint '{}': {}", expr, e),
        })?;
        Ok(Self::Range(req))
    }

    /// Whether a concrete version satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Range(req) => req.matches(version),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Range(req) => write!(f, "{}", req),
        }
    }
}

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Charts indexed by name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: Utc::now(),
            entries: HashMap::new(),
        }
    }
}

impl RepositoryIndex {
    /// Parse index from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Find the highest version satisfying a constraint
    pub fn find_best_match(
        &self,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Result<&ChartEntry> {
        let entries = self
            .entries
            .get(name)
            .ok_or_else(|| RepoError::ChartNotFound {
                name: name.to_string(),
                repo: "index".to_string(),
            })?;

        entries
            .iter()
            .filter_map(|e| {
                Version::parse(&e.version)
                    .ok()
                    .filter(|v| constraint.matches(v))
                    .map(|v| (v, e))
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, e)| e)
            .ok_or_else(|| RepoError::VersionNotFound {
                name: name.to_string(),
                constraint: constraint.to_string(),
                repo: "index".to_string(),
            })
    }
}

/// A single chart version in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Chart name
    pub name: String,

    /// Chart version (string form; not every index entry is valid semver)
    pub version: String,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Download URLs (absolute or repository-relative)
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    /// Publication timestamp
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    /// Deprecation marker
    #[serde(default)]
    pub deprecated: bool,
}

impl ChartEntry {
    /// First download URL, if any
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}
