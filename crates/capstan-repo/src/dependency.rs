//! Dependency resolution
//!
//! A chart declares sub-chart dependencies in its metadata; satisfied
//! dependencies live as vendored archives under the chart's charts/
//! directory. Resolution checks the declared set against the vendored
//! inventory and, only when the caller allowed it, fetches what is missing.
//!
//! Key behavior:
//! - update disabled + anything unmet: fail naming EVERY unmet dependency,
//!   without touching the network
//! - update enabled: fetch best matches, verify signatures when a keyring
//!   is configured (failure is fatal), vendor the archives, write the lock,
//!   and tell the caller to reload the chart

use async_trait::async_trait;
use semver::Version;

use capstan_core::archive::read_chart_definition_bytes;
use capstan_core::{BundledArchive, ChartDependency, LoadedChart};

use crate::cache::IndexCache;
use crate::config::RepositoryConfig;
use crate::error::{RepoError, Result};
use crate::http::HttpRepository;
use crate::index::{ChartEntry, VersionConstraint};
use crate::keyring::Keyring;
use crate::lock::{DependencyLock, LockedDependency};

/// A declared dependency with no satisfying vendored archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    pub name: String,
    pub constraint: String,
    pub repository: String,
}

impl std::fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (from {})",
            self.name, self.constraint, self.repository
        )
    }
}

/// Outcome of dependency resolution
#[derive(Debug)]
pub enum Resolution {
    /// Every declared dependency is satisfied by a vendored archive
    Satisfied,

    /// Missing dependencies were fetched and vendored. The in-memory chart
    /// no longer reflects its on-disk state: the caller MUST reload it.
    Refreshed { lock: DependencyLock },
}

/// Network side of resolution, injected so tests can count calls
#[async_trait]
pub trait DependencyFetcher: Send + Sync {
    /// Find the best index entry for a dependency
    async fn best_match(
        &self,
        repository: &str,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Result<ChartEntry>;

    /// Download the archive for an entry
    async fn download(&self, repository: &str, entry: &ChartEntry) -> Result<Vec<u8>>;

    /// Download the detached signature for an entry
    async fn download_signature(&self, repository: &str, entry: &ChartEntry) -> Result<String>;
}

/// Fetcher backed by the repository configuration and the index cache
pub struct RepositoryFetcher<'a> {
    config: &'a RepositoryConfig,
    cache: &'a IndexCache,
}

impl<'a> RepositoryFetcher<'a> {
    pub fn new(config: &'a RepositoryConfig, cache: &'a IndexCache) -> Self {
        Self { config, cache }
    }

    fn client(&self, repository: &str) -> Result<HttpRepository> {
        let repo = self
            .config
            .get(repository)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: repository.to_string(),
            })?;
        HttpRepository::new(repo.clone())
    }
}

#[async_trait]
impl DependencyFetcher for RepositoryFetcher<'_> {
    async fn best_match(
        &self,
        repository: &str,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Result<ChartEntry> {
        let client = self.client(repository)?;
        let index = self
            .cache
            .get_or_fetch(repository, || async { client.fetch_index().await })
            .await?;
        index.find_best_match(name, constraint).cloned()
    }

    async fn download(&self, repository: &str, entry: &ChartEntry) -> Result<Vec<u8>> {
        self.client(repository)?.download(entry).await
    }

    async fn download_signature(&self, repository: &str, entry: &ChartEntry) -> Result<String> {
        self.client(repository)?.download_signature(entry).await
    }
}

/// Dependency resolver
pub struct DependencyResolver<'a> {
    fetcher: &'a dyn DependencyFetcher,
    keyring: Option<&'a Keyring>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(fetcher: &'a dyn DependencyFetcher, keyring: Option<&'a Keyring>) -> Self {
        Self { fetcher, keyring }
    }

    /// Check declared dependencies against the vendored inventory.
    ///
    /// Purely local: no network access, no filesystem access.
    pub fn check(
        declared: &[ChartDependency],
        bundled: &[BundledArchive],
    ) -> Vec<UnmetDependency> {
        let mut unmet = Vec::new();

        for dep in declared {
            let satisfied = match VersionConstraint::parse(&dep.version) {
                Ok(constraint) => bundled
                    .iter()
                    .any(|b| b.name == dep.name && constraint.matches(&b.version)),
                // An unparseable range can never be satisfied; surfaced here
                // rather than dropped
                Err(_) => false,
            };

            if !satisfied {
                unmet.push(UnmetDependency {
                    name: dep.name.clone(),
                    constraint: dep.version.clone(),
                    repository: dep.repository.clone(),
                });
            }
        }

        unmet
    }

    /// Ensure a chart's declared dependencies are present and current.
    ///
    /// With `allow_update` off, any unmet dependency fails immediately with
    /// the full unmet list and zero network calls. With it on, missing
    /// dependencies are fetched, verified, and vendored; the caller must
    /// then reload the chart.
    pub async fn ensure(&self, chart: &LoadedChart, allow_update: bool) -> Result<Resolution> {
        let unmet = Self::check(chart.dependencies(), &chart.bundled);
        if unmet.is_empty() {
            return Ok(Resolution::Satisfied);
        }

        if !allow_update {
            let report = unmet
                .iter()
                .map(|u| format!("  {}", u))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(RepoError::UnmetDependencies { report });
        }

        let chart_root = chart
            .root
            .as_deref()
            .ok_or_else(|| RepoError::ResolutionFailed {
                message: format!(
                    "chart '{}' has no on-disk root to vendor dependencies into",
                    chart.name()
                ),
            })?;
        let charts_dir = chart_root.join("charts");
        std::fs::create_dir_all(&charts_dir)?;

        let mut resolved: Vec<LockedDependency> = chart
            .dependencies()
            .iter()
            .filter(|dep| !unmet.iter().any(|u| u.name == dep.name))
            .filter_map(|dep| {
                chart
                    .bundled
                    .iter()
                    .find(|b| b.name == dep.name)
                    .map(|b| LockedDependency {
                        name: dep.name.clone(),
                        version: b.version.clone(),
                        repository: dep.repository.clone(),
                    })
            })
            .collect();

        for dep in &unmet {
            let version = self.vendor_one(dep, &charts_dir).await?;
            resolved.push(LockedDependency {
                name: dep.name.clone(),
                version,
                repository: dep.repository.clone(),
            });
        }

        let lock = DependencyLock::new(chart.dependencies(), resolved);
        lock.save(chart_root)?;

        Ok(Resolution::Refreshed { lock })
    }

    /// Fetch, verify, and vendor a single dependency; returns the concrete
    /// version that was vendored.
    async fn vendor_one(
        &self,
        dep: &UnmetDependency,
        charts_dir: &std::path::Path,
    ) -> Result<Version> {
        let constraint = VersionConstraint::parse(&dep.constraint)?;
        let entry = self
            .fetcher
            .best_match(&dep.repository, &dep.name, &constraint)
            .await?;

        let data = self.fetcher.download(&dep.repository, &entry).await?;

        if let Some(keyring) = self.keyring {
            let signature = self
                .fetcher
                .download_signature(&dep.repository, &entry)
                .await?;
            keyring.verify(&dep.name, &data, &signature)?;
            tracing::debug!(name = %dep.name, "dependency signature verified");
        }

        // The archive must identify itself as what the index promised
        let definition = read_chart_definition_bytes(&data)?;
        if definition.metadata.name != dep.name {
            return Err(RepoError::ResolutionFailed {
                message: format!(
                    "archive for '{}' declares itself as '{}'",
                    dep.name, definition.metadata.name
                ),
            });
        }
        let version = definition.metadata.version.clone();

        let file_name = format!("{}-{}.tgz", dep.name, version);
        std::fs::write(charts_dir.join(&file_name), &data)?;
        tracing::info!(name = %dep.name, %version, "vendored dependency archive");

        Ok(version)
    }
}
