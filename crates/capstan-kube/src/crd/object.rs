//! Schema-definition object model
//!
//! CustomResourceDefinitions arrive as YAML documents in one of two wire
//! encodings, selected by the document's apiVersion. The encoding is probed
//! once at parse time and carried as a tag on the object; nothing downstream
//! re-inspects the raw document to decide how to treat it.

use serde_json::Value as JsonValue;

use crate::error::{KubeError, Result};

/// API group of schema-definition objects
pub const API_GROUP: &str = "apiextensions.k8s.io";

/// The two supported wire encodings, mutually exclusive per object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiEncoding {
    /// apiextensions.k8s.io/v1
    V1,
    /// apiextensions.k8s.io/v1beta1
    V1Beta1,
}

impl ApiEncoding {
    /// Probe an apiVersion string
    pub fn probe(api_version: &str) -> Option<Self> {
        match api_version {
            "apiextensions.k8s.io/v1" => Some(Self::V1),
            "apiextensions.k8s.io/v1beta1" => Some(Self::V1Beta1),
            _ => None,
        }
    }

    /// Version component of the encoding
    pub fn version(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V1Beta1 => "v1beta1",
        }
    }

    /// Full apiVersion string
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::V1 => "apiextensions.k8s.io/v1",
            Self::V1Beta1 => "apiextensions.k8s.io/v1beta1",
        }
    }
}

impl std::fmt::Display for ApiEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_version())
    }
}

/// One declared version within a schema definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion {
    /// Version name (e.g. "v1alpha1")
    pub name: String,

    /// Whether the API serves this version
    pub served: bool,

    /// Whether persisted objects are stored in this version's encoding
    pub storage: bool,
}

/// A parsed schema definition, tagged with its wire encoding
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    /// Object name (e.g. "certificates.cert-manager.io")
    pub name: String,

    /// Wire encoding, probed once at parse time
    pub encoding: ApiEncoding,

    /// Declared versions, in document order
    pub versions: Vec<SchemaVersion>,

    /// The full document, kept for wire-faithful writes
    raw: JsonValue,
}

impl SchemaDefinition {
    /// Parse a schema definition from YAML text, probing the encoding.
    ///
    /// An unknown apiVersion is fatal: the caller must not guess at an
    /// encoding it does not understand.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    /// Parse from an already-decoded document
    pub fn from_raw(raw: JsonValue) -> Result<Self> {
        let name = raw
            .pointer("/metadata/name")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        let api_version = raw
            .get("apiVersion")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();

        let encoding = ApiEncoding::probe(api_version).ok_or_else(|| {
            KubeError::UnsupportedSchemaVersion {
                name: name.clone(),
                api_version: api_version.to_string(),
            }
        })?;

        if name.is_empty() {
            return Err(KubeError::InvalidConfig(
                "schema definition missing metadata.name".to_string(),
            ));
        }

        let versions = parse_versions(&raw);

        Ok(Self {
            name,
            encoding,
            versions,
            raw,
        })
    }

    /// The raw spec.versions array, for semantic comparison and wire writes
    pub fn raw_versions(&self) -> JsonValue {
        self.raw
            .pointer("/spec/versions")
            .cloned()
            .unwrap_or(JsonValue::Array(vec![]))
    }

    /// The full document
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    /// The full document with a concurrency token spliced into metadata.
    ///
    /// Carrying the token forward makes the write conditional: a concurrent
    /// writer bumps the token and this update is rejected instead of
    /// silently clobbering.
    pub fn raw_with_resource_version(&self, resource_version: &str) -> JsonValue {
        let mut doc = self.raw.clone();
        if let Some(metadata) = doc.get_mut("metadata").and_then(JsonValue::as_object_mut) {
            metadata.insert(
                "resourceVersion".to_string(),
                JsonValue::String(resource_version.to_string()),
            );
        }
        doc
    }

    /// Names of versions flagged as storage version
    pub fn storage_version_names(&self) -> Vec<&str> {
        self.versions
            .iter()
            .filter(|v| v.storage)
            .map(|v| v.name.as_str())
            .collect()
    }
}

/// Extract the declared version list out of a document
pub(crate) fn parse_versions(raw: &JsonValue) -> Vec<SchemaVersion> {
    raw.pointer("/spec/versions")
        .and_then(JsonValue::as_array)
        .map(|versions| {
            versions
                .iter()
                .map(|v| SchemaVersion {
                    name: v
                        .get("name")
                        .and_then(JsonValue::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    served: v.get("served").and_then(JsonValue::as_bool).unwrap_or(false),
                    storage: v
                        .get("storage")
                        .and_then(JsonValue::as_bool)
                        .unwrap_or(false),
                })
                .collect()
        })
        .unwrap_or_default()
}
