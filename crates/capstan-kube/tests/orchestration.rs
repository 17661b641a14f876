//! End-to-end orchestration scenarios over mock collaborators

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use capstan_core::{Chart, ChartReference, CrdDocument, LoadedChart, ReleaseStatus, StatusMask, Values};
use capstan_repo::VersionConstraint;
use capstan_kube::{
    ApiEncoding, ChartLoader, Deployer, DeployerOptions, KubeError, MockSchemaClient,
    MockStorageDriver, PreviousRevisionRollback, ReleaseSpec, RenderFailure, Rendered, Renderer,
    Result, RollbackPolicy, StorageDriver,
};

/// Loader that serves one fixed chart for every reference
struct StaticLoader {
    chart: LoadedChart,
}

#[async_trait]
impl ChartLoader for StaticLoader {
    async fn load(
        &self,
        _reference: &ChartReference,
        _constraint: &VersionConstraint,
    ) -> Result<LoadedChart> {
        Ok(self.chart.clone())
    }
}

/// Renderer with a failure switch and a call counter
#[derive(Default)]
struct SwitchRenderer {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchRenderer {
    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for SwitchRenderer {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
    ) -> std::result::Result<Rendered, RenderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderFailure {
                message: "template exploded".to_string(),
                partial: None,
            });
        }

        Ok(Rendered {
            manifest: format!(
                "# chart: {} replicas: {}\n",
                chart.name(),
                values.get("replicas").cloned().unwrap_or_default()
            ),
            hooks: vec![],
        })
    }
}

fn chart(yaml: &str, values: &str, crds: Vec<CrdDocument>) -> LoadedChart {
    LoadedChart {
        chart: Chart::from_yaml(yaml).unwrap(),
        values_yaml: values.to_string(),
        bundled: vec![],
        crds,
        root: None,
    }
}

fn app_chart() -> LoadedChart {
    chart(
        "apiVersion: capstan/v1\nmetadata:\n  name: web\n  version: \"1.0.0\"\n  description: a web thing\n",
        "replicas: 1\n",
        vec![],
    )
}

struct Harness {
    deployer: Deployer,
    store: Arc<MockStorageDriver>,
    schema: MockSchemaClient,
    renderer: Arc<SwitchRenderer>,
}

fn harness(loaded: LoadedChart) -> Harness {
    let store = Arc::new(MockStorageDriver::new());
    let schema = MockSchemaClient::new();
    let renderer = Arc::new(SwitchRenderer::default());

    let deployer = Deployer::new(
        Arc::new(StaticLoader { chart: loaded }),
        renderer.clone(),
        store.clone(),
        Arc::new(schema.clone()),
        DeployerOptions::default(),
    );

    Harness {
        deployer,
        store,
        schema,
        renderer,
    }
}

#[tokio::test]
async fn install_creates_first_revision_deployed() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    let release = h.deployer.install_or_upgrade(&spec, None).await.unwrap();

    assert_eq!(release.revision, 1);
    assert_eq!(release.status, ReleaseStatus::Deployed);
    assert!(release.manifest.contains("chart: web"));
    assert_eq!(h.store.release_count(), 1);
}

#[tokio::test]
async fn existing_deployed_release_redirects_install_to_upgrade() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    let second = h.deployer.install_or_upgrade(&spec, None).await.unwrap();

    // The second call went down the upgrade path: a new revision, the old
    // one superseded
    assert_eq!(second.revision, 2);
    assert_eq!(second.status, ReleaseStatus::Deployed);

    let first = h.store.get("default", "web", 1).await.unwrap();
    assert_eq!(first.status, ReleaseStatus::Superseded);

    let active = h
        .store
        .list(Some("default"), StatusMask::ACTIVE)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].revision, 2);
}

#[tokio::test]
async fn same_name_other_namespace_installs_fresh() {
    let h = harness(app_chart());

    h.deployer
        .install_or_upgrade(&ReleaseSpec::new("web", "stable/web", "default"), None)
        .await
        .unwrap();
    let other = h
        .deployer
        .install_or_upgrade(&ReleaseSpec::new("web", "stable/web", "staging"), None)
        .await
        .unwrap();

    // Matching is exact on (name, namespace): no redirect to upgrade
    assert_eq!(other.revision, 1);
}

#[tokio::test]
async fn upgrade_failure_with_default_policy_rolls_back() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    let deployed = h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    let prior_manifest = deployed.manifest.clone();

    h.renderer.fail.store(true, Ordering::SeqCst);
    let policy = PreviousRevisionRollback::new(h.deployer.store());

    let err = h
        .deployer
        .install_or_upgrade(&spec, Some(&policy))
        .await
        .unwrap_err();

    // The composed error names both the failure and the recovery, keeping
    // the original cause
    let text = err.to_string();
    assert!(text.contains("rollback succeeded"), "got: {}", text);
    assert!(text.contains("template exploded"), "got: {}", text);

    // Final state is the prior revision's content, re-deployed
    let latest = h.store.get_latest("default", "web").await.unwrap();
    assert_eq!(latest.status, ReleaseStatus::Deployed);
    assert_eq!(latest.manifest, prior_manifest);
}

#[tokio::test]
async fn upgrade_failure_without_policy_returns_cause() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    h.renderer.fail.store(true, Ordering::SeqCst);

    let err = h
        .deployer
        .install_or_upgrade(&spec, None)
        .await
        .unwrap_err();

    assert!(matches!(err, KubeError::Render { .. }));
    // The deployed release is untouched
    let latest = h.store.get_latest("default", "web").await.unwrap();
    assert_eq!(latest.revision, 1);
    assert_eq!(latest.status, ReleaseStatus::Deployed);
}

#[tokio::test]
async fn failed_rollback_preserves_both_causes() {
    struct BrokenPolicy;

    #[async_trait]
    impl RollbackPolicy for BrokenPolicy {
        async fn rollback_release(&self, _spec: &ReleaseSpec) -> Result<()> {
            Err(KubeError::Storage("history store unreachable".to_string()))
        }
    }

    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    h.renderer.fail.store(true, Ordering::SeqCst);

    let err = h
        .deployer
        .install_or_upgrade(&spec, Some(&BrokenPolicy))
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(text.contains("rollback failed"), "got: {}", text);
    assert!(text.contains("template exploded"), "got: {}", text);
    assert!(text.contains("history store unreachable"), "got: {}", text);
}

#[tokio::test]
async fn library_chart_rejected_before_rendering() {
    let h = harness(chart(
        "apiVersion: capstan/v1\nkind: library\nmetadata:\n  name: helpers\n  version: \"0.1.0\"\n  description: helpers\n",
        "",
        vec![],
    ));
    let spec = ReleaseSpec::new("helpers", "stable/helpers", "default");

    let err = h.deployer.install(&spec).await.unwrap_err();

    assert!(err.to_string().contains("not installable"));
    assert_eq!(h.renderer.call_count(), 0);
    assert_eq!(h.store.release_count(), 0);
}

#[tokio::test]
async fn lint_violations_abort_before_rendering() {
    // "Web-App" is not a valid DNS-1123 chart name
    let h = harness(chart(
        "apiVersion: capstan/v1\nmetadata:\n  name: Web-App\n  version: \"1.0.0\"\n",
        "replicas: 1\n",
        vec![],
    ));
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    let err = h.deployer.install(&spec).await.unwrap_err();

    assert!(err.to_string().contains("linting failed"));
    assert_eq!(h.renderer.call_count(), 0);
    assert_eq!(h.store.release_count(), 0);
}

#[tokio::test]
async fn malformed_values_text_is_a_validation_error() {
    let h = harness(chart(
        "apiVersion: capstan/v1\nmetadata:\n  name: web\n  version: \"1.0.0\"\n",
        "- not\n- a\n- mapping\n",
        vec![],
    ));
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    let err = h.deployer.install(&spec).await.unwrap_err();

    assert!(matches!(err, KubeError::Chart(_)));
    assert!(err.to_string().contains("Invalid values text"));
    assert_eq!(h.renderer.call_count(), 0);
}

const WIDGET_CRD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
  versions:
    - name: v1
      served: true
      storage: true
"#;

#[tokio::test]
async fn upgrade_runs_schema_migration_only_when_requested() {
    let crds = vec![CrdDocument {
        filename: "crds/widgets.yaml".to_string(),
        data: WIDGET_CRD.to_string(),
    }];
    let h = harness(chart(
        "apiVersion: capstan/v1\nmetadata:\n  name: web\n  version: \"1.0.0\"\n  description: a web thing\n",
        "replicas: 1\n",
        crds,
    ));

    let mut spec = ReleaseSpec::new("web", "stable/web", "default");
    h.deployer.install_or_upgrade(&spec, None).await.unwrap();

    // Upgrade without the flag: migration does not run
    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    assert_eq!(h.schema.write_count(), 0);

    // Requested: the bundled definition is created in the store
    spec.run_schema_migration = true;
    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    assert_eq!(h.schema.write_count(), 1);
    assert!(
        h.schema
            .stored_versions(ApiEncoding::V1, "widgets.example.com")
            .is_some()
    );

    // Skip wins over run
    spec.skip_schema_migration = true;
    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    assert_eq!(h.schema.write_count(), 1);
}

#[tokio::test]
async fn uninstall_is_terminal() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("web", "stable/web", "default");

    h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    h.deployer.uninstall(&spec).await.unwrap();

    let latest = h.store.get_latest("default", "web").await.unwrap();
    assert_eq!(latest.status, ReleaseStatus::Uninstalled);

    // Nothing active anymore: the next install_or_upgrade is an install,
    // and the revision sequence keeps increasing
    let reinstalled = h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    assert_eq!(reinstalled.revision, 2);
}

#[tokio::test]
async fn upgrade_of_unknown_release_is_not_found() {
    let h = harness(app_chart());
    let spec = ReleaseSpec::new("ghost", "stable/ghost", "default");

    let err = h.deployer.upgrade(&spec, None).await.unwrap_err();
    assert!(matches!(err, KubeError::ReleaseNotFound { .. }));
}

#[tokio::test]
async fn generated_release_name_from_chart() {
    let h = harness(app_chart());
    let mut spec = ReleaseSpec::new("", "stable/web", "default");
    spec.generate_name = true;

    let release = h.deployer.install(&spec).await.unwrap();
    assert!(release.name.starts_with("web-"), "got: {}", release.name);
    assert_eq!(release.name.len(), "web-".len() + 5);
}

#[tokio::test]
async fn name_template_expansion() {
    let h = harness(app_chart());
    let mut spec = ReleaseSpec::new("", "stable/web", "default");
    spec.name_template = Some("edge-{random}".to_string());

    let release = h.deployer.install(&spec).await.unwrap();
    assert!(release.name.starts_with("edge-"));
    assert_eq!(release.name.len(), "edge-".len() + 5);
}

#[tokio::test]
async fn reuse_values_folds_previous_composition() {
    let h = harness(app_chart());

    let mut spec = ReleaseSpec::new("web", "stable/web", "default");
    spec.set_values = vec![Values(serde_json::json!({"replicas": 5}))];
    h.deployer.install_or_upgrade(&spec, None).await.unwrap();

    // Upgrade with no overrides but reuse: the previous replicas survive
    let mut upgrade = ReleaseSpec::new("web", "stable/web", "default");
    upgrade.reuse_values = true;
    let release = h
        .deployer
        .install_or_upgrade(&upgrade, None)
        .await
        .unwrap();
    assert_eq!(release.values.get("replicas").unwrap(), 5);

    // Reset wins over reuse: back to the chart default
    let mut reset = upgrade.clone();
    reset.reset_values = true;
    let release = h.deployer.install_or_upgrade(&reset, None).await.unwrap();
    assert_eq!(release.values.get("replicas").unwrap(), 1);
}

#[tokio::test]
async fn max_history_prunes_old_terminal_revisions() {
    let h = harness(app_chart());
    let mut spec = ReleaseSpec::new("web", "stable/web", "default");
    spec.max_history = 2;

    for _ in 0..5 {
        h.deployer.install_or_upgrade(&spec, None).await.unwrap();
    }

    let history = h.store.history("default", "web").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.last().unwrap().revision, 5);
}

#[tokio::test]
async fn metadata_passthrough_lands_under_reserved_key() {
    let h = harness(app_chart());
    let mut spec = ReleaseSpec::new("web", "stable/web", "default");
    spec.metadata = Some(Values(serde_json::json!({"owner": "platform-team"})));

    let release = h.deployer.install(&spec).await.unwrap();
    assert_eq!(release.values.get("capstan.owner").unwrap(), "platform-team");
}
