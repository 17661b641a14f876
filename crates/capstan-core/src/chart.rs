//! Chart definition and the loaded-chart model

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Chart type
///
/// Library charts provide reusable template helpers and are never
/// installable on their own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Application,
    Library,
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::Library => write!(f, "library"),
        }
    }
}

/// Chart metadata (Chart.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    pub version: Version,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Version of the packaged application
    #[serde(default)]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default)]
    pub kube_version: Option<String>,

    /// Deprecation marker
    #[serde(default)]
    pub deprecated: bool,

    /// Keywords
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Free-form annotations
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Full chart definition as declared in Chart.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// API version (capstan/v1)
    pub api_version: String,

    /// Chart type
    #[serde(default)]
    pub kind: ChartKind,

    /// Chart metadata
    pub metadata: ChartMetadata,

    /// Declared sub-chart dependencies
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

impl Chart {
    /// Parse a chart definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let chart: Self = serde_yaml::from_str(yaml).map_err(|e| CoreError::InvalidChart {
            message: e.to_string(),
        })?;
        if chart.metadata.name.is_empty() {
            return Err(CoreError::MissingField {
                field: "metadata.name".to_string(),
            });
        }
        Ok(chart)
    }
}

/// A declared sub-chart dependency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    /// Dependency name
    pub name: String,

    /// Version range expression (e.g. "^15.0.0")
    pub version: String,

    /// Source repository alias or URL
    pub repository: String,

    /// Alias under which the dependency is vendored
    #[serde(default)]
    pub alias: Option<String>,
}

impl ChartDependency {
    /// Effective name (alias or original name)
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Parse the version range expression
    pub fn version_req(&self) -> Result<VersionReq> {
        VersionReq::parse(&self.version).map_err(|e| CoreError::InvalidChart {
            message: format!(
                "dependency '{}' has invalid version constraint '{}': {}",
                self.name, self.version, e
            ),
        })
    }
}

/// Reference to a chart: local directory, packaged archive, or remote locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartReference {
    /// Unpacked chart directory on disk
    Path(PathBuf),

    /// Packaged .tgz archive on disk
    Archive(PathBuf),

    /// Chart in a configured repository ("repo/name")
    Remote { repository: String, name: String },
}

impl ChartReference {
    /// Parse a chart reference string.
    ///
    /// `repo/name` (no leading path marker) is a remote locator, `*.tgz` is
    /// an archive, everything else is a local directory.
    pub fn parse(reference: &str) -> Self {
        if reference.ends_with(".tgz") || reference.ends_with(".tar.gz") {
            return Self::Archive(PathBuf::from(reference));
        }

        let looks_local = reference.starts_with('/')
            || reference.starts_with("./")
            || reference.starts_with("../")
            || reference.starts_with('.');

        if !looks_local
            && let Some((repo, name)) = reference.split_once('/')
            && !repo.is_empty()
            && !name.is_empty()
            && !name.contains('/')
        {
            return Self::Remote {
                repository: repo.to_string(),
                name: name.to_string(),
            };
        }

        Self::Path(PathBuf::from(reference))
    }
}

impl std::fmt::Display for ChartReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) | Self::Archive(p) => write!(f, "{}", p.display()),
            Self::Remote { repository, name } => write!(f, "{}/{}", repository, name),
        }
    }
}

/// A dependency archive vendored under the chart's charts/ directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledArchive {
    /// Chart name read from the archive
    pub name: String,

    /// Concrete version read from the archive
    pub version: Version,

    /// Archive path, when loaded from disk
    pub path: Option<PathBuf>,
}

/// A schema-definition document bundled under the chart's crds/ directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdDocument {
    /// Source file name within the chart
    pub filename: String,

    /// Raw YAML document
    pub data: String,
}

/// A chart resolved to memory, ready for dependency checks and rendering
#[derive(Debug, Clone)]
pub struct LoadedChart {
    /// The chart definition
    pub chart: Chart,

    /// Default values text (values.yaml, may be empty)
    pub values_yaml: String,

    /// Vendored dependency archives found under charts/
    pub bundled: Vec<BundledArchive>,

    /// Schema definitions found under crds/
    pub crds: Vec<CrdDocument>,

    /// On-disk root for directory-loaded charts
    pub root: Option<PathBuf>,
}

impl LoadedChart {
    /// Chart name
    pub fn name(&self) -> &str {
        &self.chart.metadata.name
    }

    /// Chart version
    pub fn version(&self) -> &Version {
        &self.chart.metadata.version
    }

    /// Whether the chart can be installed as a release
    pub fn is_installable(&self) -> bool {
        self.chart.kind == ChartKind::Application
    }

    /// Reject library and other non-application charts
    pub fn ensure_installable(&self) -> Result<()> {
        if !self.is_installable() {
            return Err(CoreError::NotInstallable {
                name: self.name().to_string(),
                kind: self.chart.kind.to_string(),
            });
        }
        Ok(())
    }

    /// Declared dependencies from the chart definition
    pub fn dependencies(&self) -> &[ChartDependency] {
        &self.chart.dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chart_yaml() {
        let chart = Chart::from_yaml(
            r#"
apiVersion: capstan/v1
metadata:
  name: web
  version: "1.2.3"
  description: A web thing
dependencies:
  - name: redis
    version: "^17.0.0"
    repository: "@stable"
"#,
        )
        .unwrap();

        assert_eq!(chart.metadata.name, "web");
        assert_eq!(chart.metadata.version, Version::new(1, 2, 3));
        assert_eq!(chart.kind, ChartKind::Application);
        assert_eq!(chart.dependencies.len(), 1);
        assert_eq!(chart.dependencies[0].repository, "@stable");
    }

    #[test]
    fn test_parse_library_kind() {
        let chart = Chart::from_yaml(
            r#"
apiVersion: capstan/v1
kind: library
metadata:
  name: helpers
  version: "0.1.0"
"#,
        )
        .unwrap();

        assert_eq!(chart.kind, ChartKind::Library);
    }

    #[test]
    fn test_missing_name_rejected() {
        let result = Chart::from_yaml(
            r#"
apiVersion: capstan/v1
metadata:
  name: ""
  version: "0.1.0"
"#,
        );
        assert!(matches!(result, Err(CoreError::MissingField { .. })));
    }

    #[test]
    fn test_chart_reference_parse() {
        assert_eq!(
            ChartReference::parse("stable/nginx"),
            ChartReference::Remote {
                repository: "stable".to_string(),
                name: "nginx".to_string(),
            }
        );
        assert_eq!(
            ChartReference::parse("./charts/nginx"),
            ChartReference::Path(PathBuf::from("./charts/nginx"))
        );
        assert_eq!(
            ChartReference::parse("/tmp/nginx-1.0.0.tgz"),
            ChartReference::Archive(PathBuf::from("/tmp/nginx-1.0.0.tgz"))
        );
    }

    #[test]
    fn test_dependency_version_req() {
        let dep = ChartDependency {
            name: "redis".to_string(),
            version: "^17.0.0".to_string(),
            repository: "@stable".to_string(),
            alias: None,
        };
        let req = dep.version_req().unwrap();
        assert!(req.matches(&Version::new(17, 3, 0)));
        assert!(!req.matches(&Version::new(18, 0, 0)));
    }

    #[test]
    fn test_library_chart_not_installable() {
        let chart = LoadedChart {
            chart: Chart::from_yaml(
                "apiVersion: capstan/v1\nkind: library\nmetadata:\n  name: helpers\n  version: \"0.1.0\"\n",
            )
            .unwrap(),
            values_yaml: String::new(),
            bundled: vec![],
            crds: vec![],
            root: None,
        };

        assert!(!chart.is_installable());
        assert!(matches!(
            chart.ensure_installable(),
            Err(CoreError::NotInstallable { .. })
        ));
    }
}
