//! HTTP repository client
//!
//! Thin download wrapper for Helm-style HTTP repositories: index.yaml plus
//! chart archives, with digest verification on the archive path. Each call
//! is bounded by a per-request timeout; there is no overall deadline here.

use std::time::Duration;

use capstan_core::archive::digest_bytes;

use crate::config::Repository;
use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, RepositoryIndex};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP repository client
pub struct HttpRepository {
    repo: Repository,
    client: reqwest::Client,
}

impl HttpRepository {
    /// Create a client with the default per-request timeout
    pub fn new(repo: Repository) -> Result<Self> {
        Self::with_timeout(repo, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout
    pub fn with_timeout(repo: Repository, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RepoError::from)?;
        Ok(Self { repo, client })
    }

    /// Repository name
    pub fn name(&self) -> &str {
        &self.repo.name
    }

    /// Fetch and parse the repository index
    pub async fn fetch_index(&self) -> Result<RepositoryIndex> {
        let url = self.repo.index_url();
        let data = self.get_bytes(&url).await?;
        RepositoryIndex::from_bytes(&data)
    }

    /// Download a chart archive, verifying its digest when the index has one
    pub async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        let url = entry.download_url().ok_or_else(|| RepoError::ChartNotFound {
            name: entry.name.clone(),
            repo: self.repo.name.clone(),
        })?;

        let data = self.get_bytes(&self.absolute_url(url)).await?;

        if let Some(expected) = &entry.digest {
            let actual = digest_bytes(&data);
            if !digest_matches(expected, &actual) {
                return Err(RepoError::IntegrityCheckFailed {
                    name: entry.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(data)
    }

    /// Download the detached signature for a chart archive
    pub async fn download_signature(&self, entry: &ChartEntry) -> Result<String> {
        let url = entry.download_url().ok_or_else(|| RepoError::ChartNotFound {
            name: entry.name.clone(),
            repo: self.repo.name.clone(),
        })?;

        let sig_url = format!("{}.minisig", self.absolute_url(url));
        let data = self.get_bytes(&sig_url).await.map_err(|e| match e {
            RepoError::HttpError { status: 404, .. } => RepoError::SignatureRejected {
                name: entry.name.clone(),
                reason: format!("no signature published at {}", sig_url),
            },
            other => other,
        })?;

        String::from_utf8(data).map_err(|e| RepoError::SignatureRejected {
            name: entry.name.clone(),
            reason: format!("signature is not UTF-8: {}", e),
        })
    }

    /// Resolve an index URL that may be repository-relative
    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.repo.url.trim_end_matches('/'), url)
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(username) = &self.repo.username {
            request = request.basic_auth(username, self.repo.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("GET {}", url),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Check if two digests match, tolerating prefix and case differences
fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    };
    normalize(expected) == normalize(actual)
}
