//! Schema-definition store access
//!
//! The migration engine talks to the cluster through the `SchemaClient`
//! capability: typed get/create/update over schema-definition objects, with
//! dry-run and concurrency-token support on the update path. The cluster
//! implementation uses the dynamic API so both wire encodings go through
//! one code path; tests use the in-memory mock.

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::object::{API_GROUP, ApiEncoding, SchemaDefinition, SchemaVersion, parse_versions};
use crate::error::{KubeError, Result};

/// Default per-operation timeout for schema store calls
pub const DEFAULT_SCHEMA_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A schema definition as currently stored in the cluster
#[derive(Debug, Clone)]
pub struct ExistingSchema {
    /// Declared versions of the stored object
    pub versions: Vec<SchemaVersion>,

    /// The stored spec.versions array, for semantic comparison
    pub raw_versions: JsonValue,

    /// Opaque concurrency token of the stored object
    pub resource_version: Option<String>,
}

/// Typed CRUD over schema-definition objects
#[async_trait]
pub trait SchemaClient: Send + Sync {
    /// Fetch the stored object, or None when it does not exist
    async fn get(&self, encoding: ApiEncoding, name: &str) -> Result<Option<ExistingSchema>>;

    /// Create a new schema definition
    async fn create(&self, definition: &SchemaDefinition) -> Result<()>;

    /// Update an existing schema definition.
    ///
    /// `dry_run` exercises all server-side validation without persisting.
    /// A `resource_version` makes the write conditional on the stored
    /// object being unchanged.
    async fn update(
        &self,
        definition: &SchemaDefinition,
        resource_version: Option<&str>,
        dry_run: bool,
    ) -> Result<()>;
}

/// Cluster-backed schema client
///
/// Each call is bounded by a per-operation timeout; callers needing an
/// overall deadline wrap the whole migration themselves. Cancellation is
/// honored between calls, never mid-write.
pub struct ClusterSchemaClient {
    client: Client,
    timeout: Duration,
}

impl ClusterSchemaClient {
    /// Create with the default per-operation timeout
    pub fn new(client: Client) -> Self {
        Self::with_timeout(client, DEFAULT_SCHEMA_CALL_TIMEOUT)
    }

    /// Create with an explicit per-operation timeout
    pub fn with_timeout(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api(&self, encoding: ApiEncoding) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(API_GROUP, encoding.version(), "CustomResourceDefinition");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "customresourcedefinitions");
        Api::all_with(self.client.clone(), &resource)
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| KubeError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl SchemaClient for ClusterSchemaClient {
    async fn get(&self, encoding: ApiEncoding, name: &str) -> Result<Option<ExistingSchema>> {
        let api = self.api(encoding);
        let existing = self
            .bounded(async { api.get_opt(name).await.map_err(KubeError::Api) })
            .await?;

        Ok(existing.map(|obj| {
            let versions = parse_versions(&obj.data);
            let raw_versions = obj
                .data
                .pointer("/spec/versions")
                .cloned()
                .unwrap_or(JsonValue::Array(vec![]));
            ExistingSchema {
                versions,
                raw_versions,
                resource_version: obj.metadata.resource_version.clone(),
            }
        }))
    }

    async fn create(&self, definition: &SchemaDefinition) -> Result<()> {
        let api = self.api(definition.encoding);
        let obj: DynamicObject = serde_json::from_value(definition.raw().clone())?;

        self.bounded(async {
            api.create(&PostParams::default(), &obj)
                .await
                .map_err(KubeError::Api)
        })
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        definition: &SchemaDefinition,
        resource_version: Option<&str>,
        dry_run: bool,
    ) -> Result<()> {
        let api = self.api(definition.encoding);

        let doc = match resource_version {
            Some(rv) => definition.raw_with_resource_version(rv),
            None => definition.raw().clone(),
        };
        let obj: DynamicObject = serde_json::from_value(doc)?;

        let params = PostParams {
            dry_run,
            ..Default::default()
        };

        self.bounded(async {
            api.replace(&definition.name, &params, &obj)
                .await
                .map_err(KubeError::Api)
        })
        .await?;

        Ok(())
    }
}

pub mod mock {
    //! In-memory schema client for tests

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Counts of store operations, for test assertions
    #[derive(Debug, Default, Clone)]
    pub struct SchemaOps {
        pub gets: usize,
        pub creates: usize,
        pub dry_run_updates: usize,
        pub updates: usize,
    }

    #[derive(Debug, Clone)]
    struct StoredDefinition {
        raw_versions: JsonValue,
        versions: Vec<SchemaVersion>,
        resource_version: u64,
    }

    /// In-memory schema store with operation counters
    #[derive(Clone, Default)]
    pub struct MockSchemaClient {
        store: Arc<Mutex<HashMap<(ApiEncoding, String), StoredDefinition>>>,
        ops: Arc<Mutex<SchemaOps>>,
        fail_dry_run: Arc<Mutex<bool>>,
    }

    impl MockSchemaClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populate the store from an existing definition
        pub fn with_definition(self, definition: &SchemaDefinition) -> Self {
            {
                let mut store = self.store.lock().unwrap();
                store.insert(
                    (definition.encoding, definition.name.clone()),
                    StoredDefinition {
                        raw_versions: definition.raw_versions(),
                        versions: definition.versions.clone(),
                        resource_version: 1,
                    },
                );
            }
            self
        }

        /// Make every dry-run update fail, simulating server-side rejection
        pub fn reject_dry_runs(self) -> Self {
            *self.fail_dry_run.lock().unwrap() = true;
            self
        }

        pub fn operations(&self) -> SchemaOps {
            self.ops.lock().unwrap().clone()
        }

        /// Total writes that reached the store (dry-runs excluded)
        pub fn write_count(&self) -> usize {
            let ops = self.ops.lock().unwrap();
            ops.creates + ops.updates
        }

        /// The stored versions array for a definition, if present
        pub fn stored_versions(&self, encoding: ApiEncoding, name: &str) -> Option<JsonValue> {
            let store = self.store.lock().unwrap();
            store
                .get(&(encoding, name.to_string()))
                .map(|d| d.raw_versions.clone())
        }
    }

    #[async_trait]
    impl SchemaClient for MockSchemaClient {
        async fn get(&self, encoding: ApiEncoding, name: &str) -> Result<Option<ExistingSchema>> {
            self.ops.lock().unwrap().gets += 1;
            let store = self.store.lock().unwrap();
            Ok(store
                .get(&(encoding, name.to_string()))
                .map(|d| ExistingSchema {
                    versions: d.versions.clone(),
                    raw_versions: d.raw_versions.clone(),
                    resource_version: Some(d.resource_version.to_string()),
                }))
        }

        async fn create(&self, definition: &SchemaDefinition) -> Result<()> {
            self.ops.lock().unwrap().creates += 1;
            let mut store = self.store.lock().unwrap();
            store.insert(
                (definition.encoding, definition.name.clone()),
                StoredDefinition {
                    raw_versions: definition.raw_versions(),
                    versions: definition.versions.clone(),
                    resource_version: 1,
                },
            );
            Ok(())
        }

        async fn update(
            &self,
            definition: &SchemaDefinition,
            resource_version: Option<&str>,
            dry_run: bool,
        ) -> Result<()> {
            if dry_run {
                self.ops.lock().unwrap().dry_run_updates += 1;
                if *self.fail_dry_run.lock().unwrap() {
                    return Err(KubeError::InvalidConfig(
                        "dry-run rejected by server".to_string(),
                    ));
                }
                return Ok(());
            }

            self.ops.lock().unwrap().updates += 1;
            let mut store = self.store.lock().unwrap();
            let key = (definition.encoding, definition.name.clone());
            let stored = store.get_mut(&key).ok_or_else(|| {
                KubeError::Storage(format!("update of missing definition '{}'", definition.name))
            })?;

            if let Some(rv) = resource_version
                && rv != stored.resource_version.to_string()
            {
                return Err(KubeError::Storage(format!(
                    "conflict: stale resourceVersion {} for '{}'",
                    rv, definition.name
                )));
            }

            stored.raw_versions = definition.raw_versions();
            stored.versions = definition.versions.clone();
            stored.resource_version += 1;
            Ok(())
        }
    }
}
