//! Chart lint rules
//!
//! The lint gate runs before rendering: every violation is collected and the
//! full set is reported as one error. A chart with any violation is not
//! rendered.

use crate::chart::{ChartKind, LoadedChart};
use crate::error::CoreError;
use crate::values::Values;

/// Lint rule identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintCode {
    /// Chart name is empty or not a valid DNS-1123 label
    InvalidName,
    /// Chart type cannot be installed
    NotInstallable,
    /// Default values text does not parse to a mapping
    InvalidValues,
    /// A declared dependency is malformed
    InvalidDependency,
}

impl std::fmt::Display for LintCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidName => "invalid-name",
            Self::NotInstallable => "not-installable",
            Self::InvalidValues => "invalid-values",
            Self::InvalidDependency => "invalid-dependency",
        };
        write!(f, "{}", s)
    }
}

/// A single rule violation
#[derive(Debug, Clone)]
pub struct LintViolation {
    pub code: LintCode,
    pub message: String,
}

impl LintViolation {
    fn new(code: LintCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Collapse a violation set into a single aggregated error
    pub fn aggregate(violations: Vec<LintViolation>) -> Option<CoreError> {
        if violations.is_empty() {
            return None;
        }
        let report = violations
            .iter()
            .map(|v| format!("  [{}] {}", v.code, v.message))
            .collect::<Vec<_>>()
            .join("\n");
        Some(CoreError::Lint {
            count: violations.len(),
            report,
        })
    }
}

/// Run all lint rules over a loaded chart and its default values text
pub fn lint_chart(chart: &LoadedChart) -> Vec<LintViolation> {
    let mut violations = Vec::new();

    let name = chart.name();
    if !is_valid_name(name) {
        violations.push(LintViolation::new(
            LintCode::InvalidName,
            format!("chart name '{}' is not a valid DNS-1123 label", name),
        ));
    }

    if chart.chart.kind != ChartKind::Application {
        violations.push(LintViolation::new(
            LintCode::NotInstallable,
            format!("chart type '{}' is not installable", chart.chart.kind),
        ));
    }

    if let Err(e) = Values::from_yaml(&chart.values_yaml) {
        violations.push(LintViolation::new(LintCode::InvalidValues, e.to_string()));
    }

    for dep in chart.dependencies() {
        if dep.name.is_empty() {
            violations.push(LintViolation::new(
                LintCode::InvalidDependency,
                "dependency with empty name",
            ));
            continue;
        }
        if let Err(e) = dep.version_req() {
            violations.push(LintViolation::new(LintCode::InvalidDependency, e.to_string()));
        }
    }

    violations
}

/// DNS-1123 label: lowercase alphanumerics and '-', must start and end
/// alphanumeric, at most 53 chars to leave room for revision suffixes.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 53 {
        return false;
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_lowercase() && !bytes[0].is_ascii_digit() {
        return false;
    }
    if !bytes[bytes.len() - 1].is_ascii_lowercase() && !bytes[bytes.len() - 1].is_ascii_digit() {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;

    fn loaded(chart_yaml: &str, values_yaml: &str) -> LoadedChart {
        LoadedChart {
            chart: Chart::from_yaml(chart_yaml).unwrap(),
            values_yaml: values_yaml.to_string(),
            bundled: vec![],
            crds: vec![],
            root: None,
        }
    }

    #[test]
    fn test_clean_chart_passes() {
        let chart = loaded(
            "apiVersion: capstan/v1\nmetadata:\n  name: web\n  version: \"1.0.0\"\n  description: ok\n",
            "replicas: 1\n",
        );
        assert!(lint_chart(&chart).is_empty());
    }

    #[test]
    fn test_library_chart_flagged() {
        let chart = loaded(
            "apiVersion: capstan/v1\nkind: library\nmetadata:\n  name: helpers\n  version: \"1.0.0\"\n  description: ok\n",
            "",
        );
        let violations = lint_chart(&chart);
        assert!(violations.iter().any(|v| v.code == LintCode::NotInstallable));
    }

    #[test]
    fn test_bad_name_and_values_both_reported() {
        let chart = loaded(
            "apiVersion: capstan/v1\nmetadata:\n  name: Web_App\n  version: \"1.0.0\"\n  description: ok\n",
            "- just\n- a\n- list\n",
        );
        let violations = lint_chart(&chart);
        assert!(violations.iter().any(|v| v.code == LintCode::InvalidName));
        assert!(violations.iter().any(|v| v.code == LintCode::InvalidValues));
    }

    #[test]
    fn test_aggregate_collects_all_violations() {
        let violations = vec![
            LintViolation::new(LintCode::InvalidName, "bad name"),
            LintViolation::new(LintCode::InvalidValues, "unparseable values"),
        ];
        let err = LintViolation::aggregate(violations).unwrap();
        let text = err.to_string();
        assert!(text.contains("2 violation(s)"));
        assert!(text.contains("bad name"));
        assert!(text.contains("unparseable values"));
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(LintViolation::aggregate(vec![]).is_none());
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("my-app-2"));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("-app"));
        assert!(!is_valid_name("app-"));
        assert!(!is_valid_name(""));
    }
}
