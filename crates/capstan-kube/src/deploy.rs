//! The release orchestrator
//!
//! `Deployer` composes the injected collaborators (chart loader, renderer,
//! release store, schema client) into the install/upgrade decision flow:
//!
//! 1. an existing active release with the same (name, namespace) redirects
//!    install to upgrade
//! 2. dependencies are checked (and only fetched when the spec asked)
//! 3. values are composed with override precedence
//! 4. the lint gate aborts before rendering on any violation
//! 5. upgrades may run schema migration before rendering
//! 6. an upgrade failure with no partial output hands control to the
//!    injected rollback policy, and both errors survive if that fails too

use std::sync::Arc;

use capstan_core::{
    ChartReference, LintViolation, LoadedChart, Release, StatusMask, Values, lint_chart,
};
use capstan_repo::{
    DependencyResolver, IndexCache, Keyring, RepositoryConfig, RepositoryFetcher, Resolution,
    VersionConstraint,
};

use crate::crd::{SchemaClient, SchemaMigrator};
use crate::error::{KubeError, Result};
use crate::render::{ChartLoader, RenderFailure, Rendered, Renderer};
use crate::rollback::RollbackPolicy;
use crate::spec::ReleaseSpec;
use crate::storage::StorageDriver;

/// Deployer configuration
///
/// An explicit, versioned structure: new behavior lands as a field here,
/// not as another constructor variant.
pub struct DeployerOptions {
    /// Run the lint gate before rendering
    pub lint: bool,

    /// Repositories available for dependency updates
    pub repositories: RepositoryConfig,

    /// Keyring making dependency signature verification mandatory
    pub keyring: Option<Keyring>,

    /// Caller-owned index cache shared across calls
    pub index_cache: Arc<IndexCache>,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            lint: true,
            repositories: RepositoryConfig::default(),
            keyring: None,
            index_cache: Arc::new(IndexCache::new()),
        }
    }
}

/// The release orchestrator
pub struct Deployer {
    loader: Arc<dyn ChartLoader>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn StorageDriver>,
    schema: Arc<dyn SchemaClient>,
    options: DeployerOptions,
}

impl Deployer {
    pub fn new(
        loader: Arc<dyn ChartLoader>,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn StorageDriver>,
        schema: Arc<dyn SchemaClient>,
        options: DeployerOptions,
    ) -> Self {
        Self {
            loader,
            renderer,
            store,
            schema,
            options,
        }
    }

    /// The release history store this deployer writes to
    pub fn store(&self) -> Arc<dyn StorageDriver> {
        Arc::clone(&self.store)
    }

    /// Install the chart, or upgrade it when an active release with the
    /// same (name, namespace) already exists. Matching is exact-string on
    /// both fields.
    pub async fn install_or_upgrade(
        &self,
        spec: &ReleaseSpec,
        rollback: Option<&dyn RollbackPolicy>,
    ) -> Result<Release> {
        let active = self
            .store
            .list(Some(&spec.namespace), StatusMask::ACTIVE)
            .await?;

        let exists = active
            .iter()
            .any(|r| r.name == spec.release_name && r.namespace == spec.namespace);

        if exists {
            self.upgrade(spec, rollback).await
        } else {
            self.install(spec).await
        }
    }

    /// Install a new release
    pub async fn install(&self, spec: &ReleaseSpec) -> Result<Release> {
        let name = self.effective_release_name(spec);
        let reference = spec.chart_reference();
        let constraint = spec.version_constraint()?;

        let chart = self.loader.load(&reference, &constraint).await?;
        chart.ensure_installable()?;
        self.warn_if_deprecated(&chart);

        let chart = self
            .resolve_dependencies(chart, &reference, &constraint, spec)
            .await?;
        let values = self.compose_values(&chart, spec, None)?;
        self.lint_gate(&chart)?;

        let rendered = self
            .renderer
            .render(&chart, &values)
            .map_err(KubeError::from)?;

        // A fresh name starts at revision 1; reinstalling over terminal
        // history continues the revision sequence instead of reusing it
        let next_revision = match self.store.get_latest(&spec.namespace, &name).await {
            Ok(latest) => latest.revision + 1,
            Err(KubeError::ReleaseNotFound { .. }) => 1,
            Err(e) => return Err(e),
        };

        let mut release = Release::for_install(
            name,
            spec.namespace.clone(),
            chart.chart.metadata.clone(),
            values,
            rendered.manifest,
            rendered.hooks,
        );
        release.revision = next_revision;

        self.store.create(&release).await?;
        release.mark_deployed();
        self.store.update(&release).await?;

        tracing::info!(
            "release installed successfully: {}/{}-{}",
            release.name,
            release.chart.name,
            release.chart.version
        );

        Ok(release)
    }

    /// Upgrade an existing release
    pub async fn upgrade(
        &self,
        spec: &ReleaseSpec,
        rollback: Option<&dyn RollbackPolicy>,
    ) -> Result<Release> {
        let previous = self
            .store
            .get_latest(&spec.namespace, &spec.release_name)
            .await?;

        let reference = spec.chart_reference();
        let constraint = spec.version_constraint()?;
        let chart = self.loader.load(&reference, &constraint).await?;
        self.warn_if_deprecated(&chart);

        let chart = self
            .resolve_dependencies(chart, &reference, &constraint, spec)
            .await?;

        let previous_values =
            (spec.reuse_values && !spec.reset_values).then(|| previous.values.clone());
        let values = self.compose_values(&chart, spec, previous_values.as_ref())?;
        self.lint_gate(&chart)?;

        if spec.migration_enabled() {
            tracing::debug!("upgrading schema definitions");
            let migrator = SchemaMigrator::new(self.schema.as_ref());
            let report = migrator.migrate_documents(&chart.crds).await?;
            tracing::debug!(
                created = report.created.len(),
                applied = report.applied.len(),
                skipped = report.skipped.len(),
                "schema migration finished"
            );
        }

        let rendered = match self.renderer.render(&chart, &values) {
            Ok(rendered) => rendered,
            Err(failure) => return self.upgrade_failed(spec, failure, rollback).await,
        };

        let mut superseded = previous.clone();
        superseded.mark_superseded();
        self.store.update(&superseded).await?;

        let mut release = Release::for_upgrade(
            &previous,
            chart.chart.metadata.clone(),
            values,
            rendered.manifest,
            rendered.hooks,
        );
        self.store.create(&release).await?;
        release.mark_deployed();
        self.store.update(&release).await?;

        self.prune_history(spec, &release).await?;

        tracing::info!(
            "release upgraded successfully: {}/{}-{}",
            release.name,
            release.chart.name,
            release.chart.version
        );

        Ok(release)
    }

    /// Uninstall the release named by the spec
    pub async fn uninstall(&self, spec: &ReleaseSpec) -> Result<()> {
        self.uninstall_by_name(&spec.release_name, &spec.namespace)
            .await
    }

    /// Uninstall a release by name: terminal transition to uninstalled
    pub async fn uninstall_by_name(&self, name: &str, namespace: &str) -> Result<()> {
        let mut latest = self.store.get_latest(namespace, name).await?;
        latest.mark_uninstalled();
        self.store.update(&latest).await?;

        tracing::info!("release uninstalled: {}/{}", namespace, name);
        Ok(())
    }

    /// List the newest revision of each release matching the status mask
    pub async fn list_releases(
        &self,
        namespace: Option<&str>,
        mask: StatusMask,
    ) -> Result<Vec<Release>> {
        self.store.list(namespace, mask).await
    }

    /// Get the latest revision of a release
    pub async fn get_release(&self, name: &str, namespace: &str) -> Result<Release> {
        self.store.get_latest(namespace, name).await
    }

    /// Get the composed values of the latest revision
    pub async fn get_release_values(&self, name: &str, namespace: &str) -> Result<Values> {
        Ok(self.store.get_latest(namespace, name).await?.values)
    }

    /// Release history, oldest first, optionally capped to the last `max`
    pub async fn release_history(
        &self,
        name: &str,
        namespace: &str,
        max: usize,
    ) -> Result<Vec<Release>> {
        let mut history = self.store.history(namespace, name).await?;
        if max > 0 && history.len() > max {
            history.drain(..history.len() - max);
        }
        Ok(history)
    }

    /// Render a chart without recording anything
    pub async fn template(&self, spec: &ReleaseSpec) -> Result<Rendered> {
        let reference = spec.chart_reference();
        let constraint = spec.version_constraint()?;
        let chart = self.loader.load(&reference, &constraint).await?;
        chart.ensure_installable()?;

        let values = self.compose_values(&chart, spec, None)?;
        self.renderer
            .render(&chart, &values)
            .map_err(KubeError::from)
    }

    /// Lint a chart, aggregating every violation into one error
    pub async fn lint(&self, spec: &ReleaseSpec) -> Result<()> {
        let chart = self
            .loader
            .load(&spec.chart_reference(), &spec.version_constraint()?)
            .await?;

        match LintViolation::aggregate(lint_chart(&chart)) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // internals

    /// Effective release name: explicit > template expansion > generated.
    /// `generate_name` opts out of the explicit name.
    fn effective_release_name(&self, spec: &ReleaseSpec) -> String {
        if !spec.release_name.is_empty() && !spec.generate_name {
            return spec.release_name.clone();
        }

        if let Some(template) = &spec.name_template {
            return template.replace("{random}", &random_suffix());
        }

        format!(
            "{}-{}",
            chart_base_name(&spec.chart_reference()),
            random_suffix()
        )
    }

    fn warn_if_deprecated(&self, chart: &LoadedChart) {
        if chart.chart.metadata.deprecated {
            tracing::warn!("chart '{}' is deprecated", chart.name());
        }
    }

    /// Check dependencies; fetch them only when the spec asked for updates,
    /// and reload the chart when the on-disk state changed under it
    async fn resolve_dependencies(
        &self,
        chart: LoadedChart,
        reference: &ChartReference,
        constraint: &VersionConstraint,
        spec: &ReleaseSpec,
    ) -> Result<LoadedChart> {
        if chart.dependencies().is_empty() {
            return Ok(chart);
        }

        let fetcher = RepositoryFetcher::new(&self.options.repositories, &self.options.index_cache);
        let resolver = DependencyResolver::new(&fetcher, self.options.keyring.as_ref());

        match resolver.ensure(&chart, spec.dependency_update).await? {
            Resolution::Satisfied => Ok(chart),
            Resolution::Refreshed { .. } => {
                tracing::debug!("dependencies refreshed, reloading chart");
                self.loader.load(reference, constraint).await
            }
        }
    }

    /// Compose values: chart defaults, then (optionally) the previous
    /// release's values, then the spec's raw text, then structured
    /// overrides, then the reserved metadata namespace
    fn compose_values(
        &self,
        chart: &LoadedChart,
        spec: &ReleaseSpec,
        previous: Option<&Values>,
    ) -> Result<Values> {
        let mut values = Values::from_yaml(&chart.values_yaml).map_err(KubeError::Chart)?;

        if let Some(previous) = previous {
            values.merge(previous);
        }

        values.merge(&Values::from_yaml(&spec.values_yaml).map_err(KubeError::Chart)?);
        for overlay in &spec.set_values {
            values.merge(overlay);
        }

        if let Some(metadata) = &spec.metadata {
            values.inject_metadata(metadata.clone());
        }

        Ok(values)
    }

    /// The lint gate: any violation aborts before rendering
    fn lint_gate(&self, chart: &LoadedChart) -> Result<()> {
        if !self.options.lint {
            return Ok(());
        }
        match LintViolation::aggregate(lint_chart(chart)) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Compose the upgrade failure with the rollback outcome.
    ///
    /// The policy runs only when the renderer produced nothing at all; a
    /// partial render is returned to the caller for debugging instead.
    /// Whatever happens, the original cause is never discarded.
    async fn upgrade_failed(
        &self,
        spec: &ReleaseSpec,
        failure: RenderFailure,
        rollback: Option<&dyn RollbackPolicy>,
    ) -> Result<Release> {
        let partial = failure.partial.is_some();
        let upgrade_err = KubeError::from(failure);

        let result = if !partial && let Some(policy) = rollback {
            match policy.rollback_release(spec).await {
                Ok(()) => KubeError::RolledBack {
                    upgrade: upgrade_err.to_string(),
                },
                Err(rollback_err) => KubeError::RollbackFailed {
                    upgrade: upgrade_err.to_string(),
                    rollback: rollback_err.to_string(),
                },
            }
        } else {
            upgrade_err
        };

        tracing::warn!("release upgrade failed: {}", result);
        Err(result)
    }

    /// Drop the oldest terminal revisions beyond the configured history cap
    async fn prune_history(&self, spec: &ReleaseSpec, current: &Release) -> Result<()> {
        if spec.max_history == 0 {
            return Ok(());
        }

        let history = self
            .store
            .history(&current.namespace, &current.name)
            .await?;
        let excess = history.len().saturating_sub(spec.max_history as usize);

        for release in history
            .iter()
            .filter(|r| r.status.is_terminal())
            .take(excess)
        {
            self.store
                .delete(&release.namespace, &release.name, release.revision)
                .await?;
            tracing::debug!(
                "pruned revision {} of release {}/{}",
                release.revision,
                release.namespace,
                release.name
            );
        }

        Ok(())
    }
}

/// Base name for generated release names
fn chart_base_name(reference: &ChartReference) -> String {
    let raw = match reference {
        ChartReference::Remote { name, .. } => name.clone(),
        ChartReference::Path(p) | ChartReference::Archive(p) => p
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart".to_string()),
    };

    let base: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    base.trim_matches('-').to_string()
}

/// Five random lowercase alphanumerics, like generated resource names
fn random_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..5)
        .map(|_| (rng.sample(rand::distr::Alphanumeric) as char).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_base_name() {
        assert_eq!(
            chart_base_name(&ChartReference::parse("stable/nginx")),
            "nginx"
        );
        assert_eq!(
            chart_base_name(&ChartReference::parse("./charts/My_App")),
            "my-app"
        );
        assert_eq!(
            chart_base_name(&ChartReference::parse("/tmp/nginx-1.0.0.tgz")),
            "nginx-1-0-0"
        );
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 5);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }
}
