//! Mock storage driver for testing
//!
//! Stores releases in memory, useful for unit tests without a cluster.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use capstan_core::{Release, StatusMask};

use super::{StorageDriver, validate_create};
use crate::error::{KubeError, Result};

/// In-memory storage driver for testing
#[derive(Clone, Default)]
pub struct MockStorageDriver {
    /// Storage: namespace -> name -> revision -> release
    store: Arc<RwLock<HashMap<String, HashMap<String, HashMap<u32, Release>>>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MockStorageDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let driver = Self::new();
        {
            let mut store = driver.store.write().unwrap();
            for release in releases {
                store
                    .entry(release.namespace.clone())
                    .or_default()
                    .entry(release.name.clone())
                    .or_default()
                    .insert(release.revision, release);
            }
        }
        driver
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Get all releases (for testing)
    pub fn all_releases(&self) -> Vec<Release> {
        let store = self.store.read().unwrap();
        store
            .values()
            .flat_map(|ns| ns.values())
            .flat_map(|name| name.values())
            .cloned()
            .collect()
    }

    /// Count total stored revisions
    pub fn release_count(&self) -> usize {
        let store = self.store.read().unwrap();
        store
            .values()
            .flat_map(|ns| ns.values())
            .map(|name| name.len())
            .sum()
    }

    fn count(&self, field: fn(&mut OperationCounts) -> &mut usize) {
        let mut ops = self.operations.write().unwrap();
        *field(&mut ops) += 1;
    }
}

#[async_trait]
impl StorageDriver for MockStorageDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        self.count(|o| &mut o.gets);

        let store = self.store.read().unwrap();
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.get(&revision))
            .cloned()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release> {
        self.count(|o| &mut o.gets);

        let store = self.store.read().unwrap();
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.values().max_by_key(|r| r.revision))
            .cloned()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn list(&self, namespace: Option<&str>, mask: StatusMask) -> Result<Vec<Release>> {
        self.count(|o| &mut o.lists);

        let store = self.store.read().unwrap();
        let mut releases: Vec<Release> = store
            .iter()
            .filter(|(ns, _)| namespace.is_none_or(|n| n == *ns))
            .flat_map(|(_, by_name)| by_name.values())
            .filter_map(|revisions| revisions.values().max_by_key(|r| r.revision))
            .filter(|r| mask.matches(r.status))
            .cloned()
            .collect();

        releases.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(releases)
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        self.count(|o| &mut o.lists);

        let store = self.store.read().unwrap();
        let mut revisions: Vec<Release> = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|revisions| revisions.values().cloned().collect())
            .unwrap_or_default();

        revisions.sort_by_key(|r| r.revision);
        Ok(revisions)
    }

    async fn create(&self, release: &Release) -> Result<()> {
        self.count(|o| &mut o.creates);

        let mut store = self.store.write().unwrap();
        let revisions = store
            .entry(release.namespace.clone())
            .or_default()
            .entry(release.name.clone())
            .or_default();

        let history: Vec<Release> = revisions.values().cloned().collect();
        validate_create(&history, release)?;

        revisions.insert(release.revision, release.clone());
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.count(|o| &mut o.updates);

        let mut store = self.store.write().unwrap();
        let slot = store
            .get_mut(&release.namespace)
            .and_then(|ns| ns.get_mut(&release.name))
            .and_then(|revisions| revisions.get_mut(&release.revision))
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            })?;

        *slot = release.clone();
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        self.count(|o| &mut o.deletes);

        let mut store = self.store.write().unwrap();
        store
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(name))
            .and_then(|revisions| revisions.remove(&revision))
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::{ChartMetadata, ReleaseStatus, Values};
    use semver::Version;

    fn release(name: &str, namespace: &str, revision: u32, status: ReleaseStatus) -> Release {
        let mut r = Release::for_install(
            name.to_string(),
            namespace.to_string(),
            ChartMetadata {
                name: name.to_string(),
                version: Version::new(1, 0, 0),
                description: None,
                app_version: None,
                kube_version: None,
                deprecated: false,
                keywords: vec![],
                annotations: Default::default(),
            },
            Values::new(),
            String::new(),
            vec![],
        );
        r.revision = revision;
        r.status = status;
        r
    }

    #[tokio::test]
    async fn test_create_get_latest() {
        let driver = MockStorageDriver::new();

        driver
            .create(&release("web", "default", 1, ReleaseStatus::Deployed))
            .await
            .unwrap();

        let latest = driver.get_latest("default", "web").await.unwrap();
        assert_eq!(latest.revision, 1);
        assert!(driver.exists("default", "web").await.unwrap());
        assert!(!driver.exists("default", "other").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_revision_reuse() {
        let driver = MockStorageDriver::with_releases(vec![release(
            "web",
            "default",
            1,
            ReleaseStatus::Superseded,
        )]);

        let err = driver
            .create(&release("web", "default", 1, ReleaseStatus::Deployed))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::NonMonotonicRevision { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_namespace() {
        let driver = MockStorageDriver::with_releases(vec![
            release("web", "default", 1, ReleaseStatus::Deployed),
            release("db", "default", 1, ReleaseStatus::Failed),
            release("web", "other", 1, ReleaseStatus::Deployed),
        ]);

        let deployed = driver
            .list(Some("default"), StatusMask::DEPLOYED)
            .await
            .unwrap();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].name, "web");

        let all = driver.list(None, StatusMask::ALL).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_reports_only_latest_revision() {
        let driver = MockStorageDriver::with_releases(vec![
            release("web", "default", 1, ReleaseStatus::Superseded),
            release("web", "default", 2, ReleaseStatus::Deployed),
        ]);

        let all = driver.list(Some("default"), StatusMask::ALL).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].revision, 2);
    }

    #[tokio::test]
    async fn test_history_is_ascending() {
        let driver = MockStorageDriver::with_releases(vec![
            release("web", "default", 2, ReleaseStatus::Superseded),
            release("web", "default", 1, ReleaseStatus::Superseded),
            release("web", "default", 3, ReleaseStatus::Deployed),
        ]);

        let history = driver.history("default", "web").await.unwrap();
        let revisions: Vec<u32> = history.iter().map(|r| r.revision).collect();
        assert_eq!(revisions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delete_revision() {
        let driver = MockStorageDriver::with_releases(vec![
            release("web", "default", 1, ReleaseStatus::Superseded),
            release("web", "default", 2, ReleaseStatus::Deployed),
        ]);

        driver.delete("default", "web", 1).await.unwrap();
        assert_eq!(driver.release_count(), 1);
        assert!(driver.get("default", "web", 1).await.is_err());
    }
}
