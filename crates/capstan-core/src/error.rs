//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid Chart.yaml: {message}")]
    InvalidChart { message: String },

    #[error("chart '{name}' has an unsupported type and is not installable: '{kind}'")]
    NotInstallable { name: String, kind: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Invalid values text: {message}")]
    InvalidValues { message: String },

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("linting failed with {count} violation(s):\n{report}")]
    Lint { count: usize, report: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
