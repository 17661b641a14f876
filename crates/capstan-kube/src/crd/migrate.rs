//! Schema-definition migration
//!
//! Charts may bundle CustomResourceDefinitions; upgrades have to evolve the
//! stored definitions without stranding objects already persisted under the
//! current storage version. The engine processes each bundled document
//! strictly in order and enforces three invariants before it writes
//! anything:
//!
//! - a previously declared version is never removed automatically
//! - the storage version never changes through a migration
//! - a desired set flagging more than one storage version never reaches
//!   the store
//!
//! Changes that survive the checks are committed in two phases: a dry-run
//! update exercising all server-side validation, then the real update
//! carrying the stored object's concurrency token.
//!
//! The run is NOT atomic across definitions: a fatal error aborts the rest
//! of the run, but definitions committed earlier in the same call stay
//! committed. Re-running after a fix is safe because unchanged definitions
//! are skipped without writes.

use capstan_core::CrdDocument;

use super::client::{ExistingSchema, SchemaClient};
use super::object::SchemaDefinition;
use crate::error::{KubeError, Result};

/// Why a definition was skipped without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationSkip {
    /// The desired set declares fewer versions than the stored object;
    /// removing an available version is never done automatically
    VersionRemoval { existing: usize, desired: usize },

    /// The desired set is semantically identical to the stored one
    NoChanges,
}

impl std::fmt::Display for MigrationSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VersionRemoval { existing, desired } => write!(
                f,
                "would remove an existing version ({} declared, {} stored)",
                desired, existing
            ),
            Self::NoChanges => write!(f, "no changes"),
        }
    }
}

/// Outcome of migrating a single definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The definition did not exist and was created
    Created,

    /// The definition existed and was updated (dry-run, then commit)
    Applied,

    /// Nothing was written
    Skipped(MigrationSkip),
}

/// Result of a whole migration run
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Definitions created fresh
    pub created: Vec<String>,

    /// Definitions updated in place
    pub applied: Vec<String>,

    /// Definitions skipped, with reasons
    pub skipped: Vec<(String, MigrationSkip)>,
}

impl MigrationReport {
    /// Total definitions processed
    pub fn total(&self) -> usize {
        self.created.len() + self.applied.len() + self.skipped.len()
    }

    fn record(&mut self, name: &str, outcome: MigrationOutcome) {
        match outcome {
            MigrationOutcome::Created => self.created.push(name.to_string()),
            MigrationOutcome::Applied => self.applied.push(name.to_string()),
            MigrationOutcome::Skipped(reason) => self.skipped.push((name.to_string(), reason)),
        }
    }
}

/// The migration engine
pub struct SchemaMigrator<'a> {
    client: &'a dyn SchemaClient,
}

impl<'a> SchemaMigrator<'a> {
    pub fn new(client: &'a dyn SchemaClient) -> Self {
        Self { client }
    }

    /// Migrate every bundled schema document, strictly in order.
    ///
    /// The first fatal error aborts the run; documents processed before the
    /// abort keep whatever was committed for them.
    pub async fn migrate_documents(&self, documents: &[CrdDocument]) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for doc in documents {
            let definition = SchemaDefinition::from_yaml(&doc.data)?;
            let name = definition.name.clone();
            let outcome = self.migrate_one(&definition).await?;

            match &outcome {
                MigrationOutcome::Created => {
                    tracing::info!(crd = %name, "schema definition created");
                }
                MigrationOutcome::Applied => {
                    tracing::info!(crd = %name, "schema definition migrated");
                }
                MigrationOutcome::Skipped(reason) => {
                    tracing::warn!(crd = %name, %reason, "skipping schema migration");
                }
            }

            report.record(&name, outcome);
        }

        Ok(report)
    }

    /// Migrate a single parsed definition
    pub async fn migrate_one(&self, definition: &SchemaDefinition) -> Result<MigrationOutcome> {
        let existing = self.client.get(definition.encoding, &definition.name).await?;

        let Some(existing) = existing else {
            self.client.create(definition).await?;
            return Ok(MigrationOutcome::Created);
        };

        if definition.versions.len() < existing.versions.len() {
            return Ok(MigrationOutcome::Skipped(MigrationSkip::VersionRemoval {
                existing: existing.versions.len(),
                desired: definition.versions.len(),
            }));
        }

        self.check_storage_version(definition, &existing)?;

        if definition.raw_versions() == existing.raw_versions {
            return Ok(MigrationOutcome::Skipped(MigrationSkip::NoChanges));
        }

        // Validate first; only a clean dry-run may be followed by the real
        // write, which carries the stored object's concurrency token so a
        // concurrent writer is surfaced as a conflict instead of clobbered.
        let token = existing.resource_version.as_deref();
        self.client.update(definition, token, true).await?;
        self.client.update(definition, token, false).await?;

        Ok(MigrationOutcome::Applied)
    }

    /// Enforce the storage-version invariants against the stored object
    fn check_storage_version(
        &self,
        definition: &SchemaDefinition,
        existing: &ExistingSchema,
    ) -> Result<()> {
        let stored_names: Vec<&str> = existing
            .versions
            .iter()
            .filter(|v| v.storage)
            .map(|v| v.name.as_str())
            .collect();

        // More than one flagged version in the cluster is corrupted data;
        // surface it rather than pick a winner
        if stored_names.len() > 1 {
            return Err(KubeError::StorageVersionConflict {
                name: definition.name.clone(),
            });
        }

        let desired_names = definition.storage_version_names();
        if desired_names.len() > 1 {
            return Err(KubeError::TooManyStorageVersions {
                name: definition.name.clone(),
            });
        }

        let stored = stored_names.first().copied();
        let desired = desired_names.first().copied();
        if stored != desired {
            return Err(KubeError::StorageVersionChanged {
                name: definition.name.clone(),
                existing: stored.unwrap_or("<none>").to_string(),
                desired: desired.unwrap_or("<none>").to_string(),
            });
        }

        Ok(())
    }
}
