//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Top-level key reserved for caller metadata passthrough.
///
/// Anything the user placed under this key in their own values is
/// overwritten by [`Values::inject_metadata`], not merged.
pub const RESERVED_VALUES_KEY: &str = "capstan";

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse values from YAML text.
    ///
    /// Empty (or whitespace-only) text parses to the empty mapping. A
    /// non-mapping document is rejected as malformed values text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }

        let value: JsonValue =
            serde_yaml::from_str(yaml).map_err(|e| CoreError::InvalidValues {
                message: e.to_string(),
            })?;

        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::InvalidValues {
                message: format!("expected a mapping at the document root, got {}", kind_of(&other)),
            }),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Mappings: recursive merge
    /// - Anything else (scalars, lists): overlay replaces base outright
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Compose base values text with structured overrides, in order
    pub fn compose(base_yaml: &str, overrides: &[Values]) -> Result<Self> {
        let mut result = Self::from_yaml(base_yaml)?;
        for overlay in overrides {
            result.merge(overlay);
        }
        Ok(result)
    }

    /// Inject caller metadata under the reserved `capstan` key.
    ///
    /// This runs AFTER the main merge: an existing user-supplied value at
    /// that key is overwritten wholesale, never merged. Callers relying on
    /// the reserved namespace should treat it as owned by the tool.
    pub fn inject_metadata(&mut self, metadata: Values) {
        if let JsonValue::Object(map) = &mut self.0 {
            map.insert(RESERVED_VALUES_KEY.to_string(), metadata.0);
        }
    }

    /// Set a value by dotted path (e.g. "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    if path.is_empty() {
        *value = new_value;
        return;
    }

    let key = path[0];
    let remaining = &path[1..];

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    let map = value
        .as_object_mut()
        .expect("value is an object after initialization");

    if remaining.is_empty() {
        map.insert(key.to_string(), new_value);
    } else {
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        set_nested(entry, remaining, new_value);
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }

    match value {
        JsonValue::Object(map) => map
            .get(path[0])
            .and_then(|v| get_nested(v, &path[1..])),
        _ => None,
    }
}
