//! Capstan Repository Management
//!
//! This crate provides the repository side of Capstan:
//!
//! - **Repository configuration**: the list of chart repositories (name,
//!   URL, optional credentials) read, not owned, by the resolver
//! - **Index handling**: Helm-compatible index.yaml with explicit
//!   version-constraint semantics (an empty constraint matches everything,
//!   pre-releases included)
//! - **Index cache**: a caller-owned, mutex-guarded store, no globals
//! - **Signature verification**: minisign keyrings; a configured keyring
//!   makes verification mandatory and failures fatal
//! - **Dependency resolution**: check vendored archives against the
//!   declared set, optionally fetching what is missing and pinning the
//!   result in Chart.lock

pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod http;
pub mod index;
pub mod keyring;
pub mod lock;

// Re-exports for convenience
pub use cache::IndexCache;
pub use config::{Repository, RepositoryConfig};
pub use dependency::{
    DependencyFetcher, DependencyResolver, RepositoryFetcher, Resolution, UnmetDependency,
};
pub use error::{RepoError, Result};
pub use http::HttpRepository;
pub use index::{ChartEntry, RepositoryIndex, VersionConstraint};
pub use keyring::Keyring;
pub use lock::{DependencyLock, LOCK_FILE_NAME, LockedDependency};
