//! Release specification
//!
//! One explicit configuration struct per orchestrator call, constructed by
//! the caller and immutable for the duration of that call. New knobs are
//! added as fields here rather than as new method overloads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use capstan_core::{ChartReference, Values};
use capstan_repo::{Result as RepoResult, VersionConstraint};

/// Specification for installing or upgrading a release
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseSpec {
    /// Release name; empty means "generate one" (install only)
    pub release_name: String,

    /// Chart reference: local path, archive, or "repo/name" locator
    pub chart: String,

    /// Target namespace
    pub namespace: String,

    /// Version constraint expression. Empty means "any version, including
    /// pre-releases", not "latest stable".
    pub version: String,

    /// Raw values YAML applied over the chart defaults
    pub values_yaml: String,

    /// Structured value overrides, applied in order after `values_yaml`
    pub set_values: Vec<Values>,

    /// Caller metadata injected under the reserved values key after the
    /// main merge
    pub metadata: Option<Values>,

    /// Generate a release name from the chart name
    pub generate_name: bool,

    /// Name template; supports the `{random}` placeholder
    pub name_template: Option<String>,

    /// Wait for resources to become ready
    pub wait: bool,

    /// Roll back automatically on failure; implies `wait`
    pub atomic: bool,

    /// Allow fetching missing dependencies from repositories
    pub dependency_update: bool,

    /// Never run schema migration, regardless of other flags
    pub skip_schema_migration: bool,

    /// Run schema migration on upgrade (no-op unless set)
    pub run_schema_migration: bool,

    /// Create the target namespace if missing
    pub create_namespace: bool,

    /// Force resource replacement
    pub force: bool,

    /// Ignore the previous release's values on upgrade
    pub reset_values: bool,

    /// Fold the previous release's values under the new overrides
    pub reuse_values: bool,

    /// Maximum revisions to keep per release; 0 keeps everything
    pub max_history: u32,

    /// Per-operation timeout passed to collaborators
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for ReleaseSpec {
    fn default() -> Self {
        Self {
            release_name: String::new(),
            chart: String::new(),
            namespace: "default".to_string(),
            version: String::new(),
            values_yaml: String::new(),
            set_values: Vec::new(),
            metadata: None,
            generate_name: false,
            name_template: None,
            wait: false,
            atomic: false,
            dependency_update: false,
            skip_schema_migration: false,
            run_schema_migration: false,
            create_namespace: false,
            force: false,
            reset_values: false,
            reuse_values: false,
            max_history: 0,
            timeout: None,
        }
    }
}

impl ReleaseSpec {
    /// Create a spec with the required identity fields
    pub fn new(
        release_name: impl Into<String>,
        chart: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            release_name: release_name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Parsed chart reference
    pub fn chart_reference(&self) -> ChartReference {
        ChartReference::parse(&self.chart)
    }

    /// Parsed version constraint; empty text is the match-anything
    /// constraint, pre-releases included
    pub fn version_constraint(&self) -> RepoResult<VersionConstraint> {
        VersionConstraint::parse(&self.version)
    }

    /// Atomic implies wait
    pub fn effective_wait(&self) -> bool {
        self.wait || self.atomic
    }

    /// Schema migration runs only when requested and not skipped
    pub fn migration_enabled(&self) -> bool {
        !self.skip_schema_migration && self.run_schema_migration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_implies_wait() {
        let mut spec = ReleaseSpec::new("web", "stable/web", "default");
        assert!(!spec.effective_wait());

        spec.atomic = true;
        assert!(spec.effective_wait());
        assert!(!spec.wait);
    }

    #[test]
    fn test_empty_version_is_match_anything() {
        let spec = ReleaseSpec::new("web", "stable/web", "default");
        let constraint = spec.version_constraint().unwrap();
        assert!(constraint.is_any());
    }

    #[test]
    fn test_migration_gating() {
        let mut spec = ReleaseSpec::new("web", "stable/web", "default");
        // Not requested: off
        assert!(!spec.migration_enabled());

        spec.run_schema_migration = true;
        assert!(spec.migration_enabled());

        // Skip always wins
        spec.skip_schema_migration = true;
        assert!(!spec.migration_enabled());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut spec = ReleaseSpec::new("web", "stable/web", "prod");
        spec.timeout = Some(Duration::from_secs(300));
        spec.max_history = 10;

        let json = serde_json::to_string(&spec).unwrap();
        let parsed: ReleaseSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.release_name, "web");
        assert_eq!(parsed.timeout, Some(Duration::from_secs(300)));
        assert_eq!(parsed.max_history, 10);
    }
}
