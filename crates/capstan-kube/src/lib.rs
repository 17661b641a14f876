//! Capstan Kube - cluster integration and the release orchestrator
//!
//! This crate provides:
//! - **Deployer**: the install-or-upgrade orchestrator composing chart
//!   loading, dependency resolution, values composition, the lint gate,
//!   schema migration, rendering, and rollback coordination
//! - **Schema migration**: the validate-then-commit engine evolving
//!   chart-bundled CustomResourceDefinitions under strict invariants
//! - **Storage drivers**: release history persisted in Kubernetes Secrets
//!   (or in memory for tests), with monotonic revision assignment
//! - **Rollback policies**: pluggable failure-recovery strategies

pub mod crd;
pub mod deploy;
pub mod error;
pub mod render;
pub mod rollback;
pub mod spec;
pub mod storage;

pub use crd::{
    ApiEncoding, ClusterSchemaClient, ExistingSchema, MigrationOutcome, MigrationReport,
    MigrationSkip, MockSchemaClient, SchemaClient, SchemaDefinition, SchemaMigrator, SchemaVersion,
};
pub use deploy::{Deployer, DeployerOptions};
pub use error::{KubeError, Result};
pub use render::{ChartLoader, RenderFailure, Rendered, Renderer};
pub use rollback::{PreviousRevisionRollback, RollbackPolicy};
pub use spec::ReleaseSpec;
pub use storage::{MockStorageDriver, OperationCounts, SecretsDriver, StorageDriver};
