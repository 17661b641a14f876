//! In-process repository index cache
//!
//! The cache is an explicitly constructed store owned by the caller, not a
//! process global. Writes are serialized by an internal lock; reads see
//! writes made earlier in the same process only. There is no cross-process
//! or cluster-wide coherence.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::index::RepositoryIndex;

#[derive(Debug, Clone)]
struct CachedIndex {
    index: Arc<RepositoryIndex>,
    fetched_at: DateTime<Utc>,
}

/// Caller-owned cache of repository indices, keyed by repository name
#[derive(Debug, Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<String, CachedIndex>>,
}

impl IndexCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached index without fetching
    pub fn lookup(&self, repository: &str) -> Option<Arc<RepositoryIndex>> {
        let entries = self.entries.lock().expect("index cache lock poisoned");
        entries.get(repository).map(|c| Arc::clone(&c.index))
    }

    /// When the index for a repository was last stored
    pub fn fetched_at(&self, repository: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().expect("index cache lock poisoned");
        entries.get(repository).map(|c| c.fetched_at)
    }

    /// Store an index, replacing any previous entry
    pub fn store(&self, repository: &str, index: RepositoryIndex) -> Arc<RepositoryIndex> {
        let index = Arc::new(index);
        let mut entries = self.entries.lock().expect("index cache lock poisoned");
        entries.insert(
            repository.to_string(),
            CachedIndex {
                index: Arc::clone(&index),
                fetched_at: Utc::now(),
            },
        );
        index
    }

    /// Get the cached index for a repository, fetching on miss.
    ///
    /// The fetch runs outside the lock; concurrent callers missing on the
    /// same repository may fetch redundantly, last store wins.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        repository: &str,
        fetch: F,
    ) -> Result<Arc<RepositoryIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<RepositoryIndex>>,
    {
        if let Some(index) = self.lookup(repository) {
            return Ok(index);
        }

        tracing::debug!(repository, "index cache miss, fetching");
        let index = fetch().await?;
        Ok(self.store(repository, index))
    }

    /// Drop the cached index for one repository
    pub fn invalidate(&self, repository: &str) {
        let mut entries = self.entries.lock().expect("index cache lock poisoned");
        entries.remove(repository);
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("index cache lock poisoned");
        entries.clear();
    }

    /// Number of cached repositories
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().expect("index cache lock poisoned");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fetch_on_miss_then_hit() {
        let cache = IndexCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let index = cache
                .get_or_fetch("stable", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(RepositoryIndex::default())
                })
                .await
                .unwrap();
            assert_eq!(index.api_version, "v1");
        }

        // Only the first call fetched
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache = IndexCache::new();
        let fetches = AtomicUsize::new(0);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(RepositoryIndex::default())
        };

        cache.get_or_fetch("stable", fetch).await.unwrap();
        cache.invalidate("stable");
        cache.get_or_fetch("stable", fetch).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_store_is_read_after_write() {
        let cache = IndexCache::new();
        assert!(cache.lookup("stable").is_none());

        cache.store("stable", RepositoryIndex::default());
        assert!(cache.lookup("stable").is_some());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
