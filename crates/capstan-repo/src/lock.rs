//! Dependency lock file
//!
//! After a network dependency update, the resolved versions are pinned in a
//! `Chart.lock` file next to Chart.yaml, together with a digest of the
//! declaration set so staleness is detectable.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use capstan_core::ChartDependency;

use crate::error::Result;

/// Lock file name, relative to the chart root
pub const LOCK_FILE_NAME: &str = "Chart.lock";

/// Pinned dependency set (Chart.lock)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLock {
    /// When this lock was generated
    pub generated: DateTime<Utc>,

    /// SHA256 over the declared dependency set, to detect drift
    pub digest: String,

    /// Resolved dependencies
    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,
}

/// A single resolved dependency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockedDependency {
    /// Dependency name
    pub name: String,

    /// Exact resolved version (not a range)
    pub version: Version,

    /// Repository the dependency was resolved from
    pub repository: String,
}

impl DependencyLock {
    /// Build a lock for a declaration set and its resolved versions
    pub fn new(declared: &[ChartDependency], resolved: Vec<LockedDependency>) -> Self {
        Self {
            generated: Utc::now(),
            digest: declaration_digest(declared),
            dependencies: resolved,
        }
    }

    /// Whether this lock still matches a declaration set
    pub fn is_current(&self, declared: &[ChartDependency]) -> bool {
        self.digest == declaration_digest(declared)
    }

    /// Write the lock next to the chart definition
    pub fn save(&self, chart_root: &Path) -> Result<PathBuf> {
        let path = chart_root.join(LOCK_FILE_NAME);
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Load a lock file from a chart root, if present
    pub fn load(chart_root: &Path) -> Result<Option<Self>> {
        let path = chart_root.join(LOCK_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_yaml::from_str(&content)?))
    }
}

/// Digest over the declared dependency set, order-sensitive
fn declaration_digest(declared: &[ChartDependency]) -> String {
    let mut hasher = Sha256::new();
    for dep in declared {
        hasher.update(dep.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(dep.version.as_bytes());
        hasher.update(b"\0");
        hasher.update(dep.repository.as_bytes());
        hasher.update(b"\0");
    }
    format!("sha256:{:x}", hasher.finalize())
}
