//! Kubernetes Secrets storage driver
//!
//! The default in-cluster driver: one Secret per release revision, holding
//! the gzip-compressed JSON record, labeled so history and status filters
//! work with label selectors alone.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;

use capstan_core::{Release, StatusMask};

use super::{StorageDriver, decode_release, encode_release, validate_create};
use crate::error::{KubeError, Result};

const SECRET_TYPE: &str = "capstan.io/release.v1";
const LABEL_NAME: &str = "capstan.io/release-name";
const LABEL_REVISION: &str = "capstan.io/release-revision";
const LABEL_STATUS: &str = "capstan.io/release-status";
const DATA_KEY: &str = "release";

/// Kubernetes Secrets storage driver
pub struct SecretsDriver {
    client: Client,
}

impl SecretsDriver {
    /// Create a driver from the default in-cluster or kubeconfig client
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn build_secret(&self, release: &Release) -> Result<Secret> {
        let encoded = encode_release(release)?;

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_NAME.to_string(), release.name.clone());
        labels.insert(LABEL_REVISION.to_string(), release.revision.to_string());
        labels.insert(LABEL_STATUS.to_string(), release.status.to_string());

        let mut data = BTreeMap::new();
        data.insert(DATA_KEY.to_string(), ByteString(encoded));

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(release.storage_key()),
                namespace: Some(release.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            type_: Some(SECRET_TYPE.to_string()),
            data: Some(data),
            ..Default::default()
        })
    }

    fn parse_secret(secret: &Secret) -> Result<Release> {
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(DATA_KEY))
            .ok_or_else(|| KubeError::Storage("release Secret has no payload".to_string()))?;
        decode_release(&data.0)
    }

    async fn list_secrets(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<Secret>> {
        let params = ListParams::default().labels(selector);
        let list = match namespace {
            Some(ns) => self.api(ns).list(&params).await?,
            None => Api::<Secret>::all(self.client.clone()).list(&params).await?,
        };
        Ok(list.items)
    }
}

#[async_trait]
impl StorageDriver for SecretsDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        let key = format!("capstan.release.v1.{}.v{}", name, revision);
        match self.api(namespace).get_opt(&key).await? {
            Some(secret) => Self::parse_secret(&secret),
            None => Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
        }
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release> {
        self.history(namespace, name)
            .await?
            .pop()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn list(&self, namespace: Option<&str>, mask: StatusMask) -> Result<Vec<Release>> {
        let secrets = self.list_secrets(namespace, LABEL_NAME).await?;

        let mut latest: BTreeMap<(String, String), Release> = BTreeMap::new();
        for secret in &secrets {
            let release = Self::parse_secret(secret)?;
            let key = (release.namespace.clone(), release.name.clone());
            match latest.get(&key) {
                Some(seen) if seen.revision >= release.revision => {}
                _ => {
                    latest.insert(key, release);
                }
            }
        }

        Ok(latest
            .into_values()
            .filter(|r| mask.matches(r.status))
            .collect())
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        let selector = format!("{}={}", LABEL_NAME, name);
        let secrets = self.list_secrets(Some(namespace), &selector).await?;

        let mut releases = secrets
            .iter()
            .map(Self::parse_secret)
            .collect::<Result<Vec<_>>>()?;
        releases.sort_by_key(|r| r.revision);
        Ok(releases)
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let history = self.history(&release.namespace, &release.name).await?;
        validate_create(&history, release)?;

        let secret = self.build_secret(release)?;
        self.api(&release.namespace)
            .create(&PostParams::default(), &secret)
            .await?;
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let secret = self.build_secret(release)?;
        self.api(&release.namespace)
            .replace(&release.storage_key(), &PostParams::default(), &secret)
            .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        let release = self.get(namespace, name, revision).await?;
        let key = format!("capstan.release.v1.{}.v{}", name, revision);
        self.api(namespace)
            .delete(&key, &DeleteParams::default())
            .await?;
        Ok(release)
    }
}
