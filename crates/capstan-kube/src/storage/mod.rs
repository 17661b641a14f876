//! Storage drivers for persisting release history
//!
//! Releases are persisted one record per revision. Drivers enforce the two
//! history invariants at the write boundary:
//!
//! - revisions are assigned monotonically per (name, namespace) and never
//!   reused
//! - at most one revision per (name, namespace) is in an active status at
//!   a time

mod mock;
mod secrets;

pub use mock::{MockStorageDriver, OperationCounts};
pub use secrets::SecretsDriver;

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use capstan_core::{Release, StatusMask};

use crate::error::{KubeError, Result};

/// Storage driver trait for release persistence
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get a specific release revision
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release>;

    /// Get the latest revision for a name
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release>;

    /// List the newest revision of every release whose status matches the
    /// mask, optionally restricted to one namespace
    async fn list(&self, namespace: Option<&str>, mask: StatusMask) -> Result<Vec<Release>>;

    /// All revisions for a name, ascending by revision
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>>;

    /// Persist a new revision; the revision number must extend the history
    async fn create(&self, release: &Release) -> Result<()>;

    /// Update an existing revision in place
    async fn update(&self, release: &Release) -> Result<()>;

    /// Delete a specific revision
    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release>;

    /// Check whether any revision exists for a name
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.get_latest(namespace, name).await {
            Ok(_) => Ok(true),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Validate a create against the existing history for the same release.
///
/// Shared by drivers so the revision and single-active invariants hold
/// regardless of backend.
pub(crate) fn validate_create(history: &[Release], new: &Release) -> Result<()> {
    let latest = history.iter().map(|r| r.revision).max().unwrap_or(0);
    if new.revision != latest + 1 {
        return Err(KubeError::NonMonotonicRevision {
            name: new.name.clone(),
            revision: new.revision,
            latest,
        });
    }

    if StatusMask::ACTIVE.matches(new.status)
        && let Some(active) = history
            .iter()
            .find(|r| StatusMask::ACTIVE.matches(r.status))
    {
        return Err(KubeError::Storage(format!(
            "release '{}' already has active revision {} ({})",
            new.name, active.revision, active.status
        )));
    }

    Ok(())
}

/// Encode a release for storage: JSON, gzip-compressed
pub(crate) fn encode_release(release: &Release) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(release)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| KubeError::Compression(e.to_string()))
}

/// Decode a release from its stored form
pub(crate) fn decode_release(data: &[u8]) -> Result<Release> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::{ChartMetadata, Values};
    use semver::Version;

    fn release(revision: u32) -> Release {
        let mut r = Release::for_install(
            "web".to_string(),
            "default".to_string(),
            ChartMetadata {
                name: "web".to_string(),
                version: Version::new(1, 0, 0),
                description: None,
                app_version: None,
                kube_version: None,
                deprecated: false,
                keywords: vec![],
                annotations: Default::default(),
            },
            Values::new(),
            "kind: ConfigMap\n".to_string(),
            vec![],
        );
        r.revision = revision;
        r
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let release = release(1);
        let encoded = encode_release(&release).unwrap();
        let decoded = decode_release(&encoded).unwrap();
        assert_eq!(decoded.name, release.name);
        assert_eq!(decoded.revision, release.revision);
        assert_eq!(decoded.manifest, release.manifest);
    }

    #[test]
    fn test_validate_create_requires_next_revision() {
        let mut first = release(1);
        first.mark_deployed();

        // Gap
        let err = validate_create(&[first.clone()], &release(3)).unwrap_err();
        assert!(matches!(err, KubeError::NonMonotonicRevision { .. }));

        // Reuse
        let err = validate_create(&[first.clone()], &release(1)).unwrap_err();
        assert!(matches!(err, KubeError::NonMonotonicRevision { .. }));

        // Revision 1 only valid on empty history
        assert!(validate_create(&[], &release(1)).is_ok());
    }

    #[test]
    fn test_validate_create_rejects_second_active() {
        let mut deployed = release(1);
        deployed.mark_deployed();

        let err = validate_create(&[deployed], &release(2)).unwrap_err();
        assert!(matches!(err, KubeError::Storage(_)));
    }

    #[test]
    fn test_validate_create_allows_after_terminal() {
        let mut superseded = release(1);
        superseded.mark_superseded();

        assert!(validate_create(&[superseded], &release(2)).is_ok());
    }
}
