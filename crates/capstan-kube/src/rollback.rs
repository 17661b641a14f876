//! Rollback policies
//!
//! Failure recovery is an injected strategy, not orchestrator behavior:
//! the deployer calls whatever policy it was handed, and only when an
//! upgrade failed without producing a partial release. The default policy
//! re-deploys the most recent deployed revision; custom policies can target
//! arbitrary revisions or force-replace semantics.

use async_trait::async_trait;
use std::sync::Arc;

use capstan_core::{Release, ReleaseStatus};

use crate::error::{KubeError, Result};
use crate::spec::ReleaseSpec;
use crate::storage::StorageDriver;

/// A pluggable rollback strategy
#[async_trait]
pub trait RollbackPolicy: Send + Sync {
    /// Roll the release named by the spec back to a known-good state
    async fn rollback_release(&self, spec: &ReleaseSpec) -> Result<()>;
}

/// Default policy: re-deploy the most recent deployed revision as a new
/// revision, superseding it in place.
pub struct PreviousRevisionRollback {
    store: Arc<dyn StorageDriver>,
}

impl PreviousRevisionRollback {
    pub fn new(store: Arc<dyn StorageDriver>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RollbackPolicy for PreviousRevisionRollback {
    async fn rollback_release(&self, spec: &ReleaseSpec) -> Result<()> {
        let history = self
            .store
            .history(&spec.namespace, &spec.release_name)
            .await?;

        let latest = history.last().cloned().ok_or_else(|| {
            KubeError::ReleaseNotFound {
                name: spec.release_name.clone(),
                namespace: spec.namespace.clone(),
            }
        })?;

        let target = history
            .iter()
            .rev()
            .find(|r| r.status == ReleaseStatus::Deployed)
            .cloned()
            .ok_or_else(|| KubeError::RollbackNotPossible {
                name: spec.release_name.clone(),
                reason: "no deployed revision to roll back to".to_string(),
            })?;

        tracing::info!(
            release = %spec.release_name,
            namespace = %spec.namespace,
            target_revision = target.revision,
            "rolling back to previous deployed revision"
        );

        let mut superseded = target.clone();
        superseded.mark_superseded();
        self.store.update(&superseded).await?;

        let mut restored = Release::for_upgrade(
            &latest,
            target.chart.clone(),
            target.values.clone(),
            target.manifest.clone(),
            target.hooks.clone(),
        );
        restored.status = ReleaseStatus::PendingRollback;
        self.store.create(&restored).await?;

        restored.mark_deployed();
        self.store.update(&restored).await?;

        Ok(())
    }
}
