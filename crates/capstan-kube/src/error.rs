//! Error types for capstan-kube

use thiserror::Error;

/// Result type for capstan-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors from cluster operations, schema migration, and orchestration
#[derive(Debug, Error)]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Release already exists
    #[error("release '{name}' already exists in namespace '{namespace}'")]
    ReleaseAlreadyExists { name: String, namespace: String },

    /// Revision numbers must increase monotonically per (name, namespace)
    #[error("revision {revision} for release '{name}' would not be monotonic (latest is {latest})")]
    NonMonotonicRevision {
        name: String,
        revision: u32,
        latest: u32,
    },

    /// Schema definition carries an unknown API encoding
    #[error("failed to migrate schema definition '{name}': unsupported api-version '{api_version}'")]
    UnsupportedSchemaVersion { name: String, api_version: String },

    /// The desired version set would change the storage version
    #[error("storage version of schema definition '{name}' changed from '{existing}' to '{desired}', aborting migration")]
    StorageVersionChanged {
        name: String,
        existing: String,
        desired: String,
    },

    /// The desired version set flags more than one storage version
    #[error("more than one storage version set on schema definition '{name}', aborting migration")]
    TooManyStorageVersions { name: String },

    /// The stored object already flags more than one storage version
    #[error("schema definition '{name}' in the cluster flags multiple storage versions; refusing to touch inconsistent data")]
    StorageVersionConflict { name: String },

    /// Upgrade failed and the rollback policy also failed; both causes kept
    #[error("release failed, rollback failed: release error: {upgrade}, rollback error: {rollback}")]
    RollbackFailed { upgrade: String, rollback: String },

    /// Upgrade failed and the configured rollback policy recovered
    #[error("release failed, rollback succeeded: release error: {upgrade}")]
    RolledBack { upgrade: String },

    /// Rollback has no target revision
    #[error("cannot rollback release '{name}': {reason}")]
    RollbackNotPossible { name: String, reason: String },

    /// Rendering failed
    #[error("render error: {message}")]
    Render {
        message: String,
        /// Partial output, when the renderer produced any before failing
        partial: Option<String>,
    },

    /// Chart loading failed
    #[error("chart error: {0}")]
    Chart(#[from] capstan_core::CoreError),

    /// Dependency resolution failed
    #[error("dependency error: {0}")]
    Dependency(#[from] capstan_repo::RepoError),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation timed out
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
