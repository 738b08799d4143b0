//! Canonicalized build configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Build configuration with canonicalized keys.
///
/// Keys are folded to one consistent form on every assignment, recursively
/// through nested objects and arrays: surrounding whitespace is trimmed and
/// `-` or interior whitespace becomes `_`. Writing the same logical keys a
/// second time never changes their representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildConfig(BTreeMap<String, Value>);

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a raw JSON value. Anything other than an object yields an
    /// empty configuration.
    pub fn from_value(value: Value) -> Self {
        match canonicalize_value(value) {
            Value::Object(map) => Self(map.into_iter().collect()),
            _ => Self::default(),
        }
    }

    /// Assign one entry, canonicalizing the key and the value's nested keys.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(canonical_key(key), canonicalize_value(value));
    }

    /// Look up an entry. The probe key is canonicalized the same way keys
    /// were on assignment.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&canonical_key(key))
    }

    /// The routing target, when configured as a string.
    pub fn target(&self) -> Option<&str> {
        self.get("target").and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The configuration as a JSON object, e.g. for persistence or job
    /// payloads.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

fn canonical_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (canonical_key(&k), canonicalize_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_canonicalized_recursively() {
        let config = BuildConfig::from_value(json!({
            "build-target": "macos",
            "env": { "global-vars": ["A=1"], "matrix vars": { "nested-key": true } },
        }));

        assert!(config.get("build_target").is_some());
        let env = config.get("env").unwrap();
        assert!(env.get("global_vars").is_some());
        assert!(env.get("matrix_vars").unwrap().get("nested_key").is_some());
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let raw = json!({ "build-target": "x", "env": { "some-key": 1 } });
        let once = BuildConfig::from_value(raw.clone());
        let twice = BuildConfig::from_value(once.to_value());

        assert_eq!(once, twice);

        // Re-inserting the same logical key leaves one entry.
        let mut config = once.clone();
        config.insert("build target", json!("x"));
        assert_eq!(config.len(), once.len());
    }

    #[test]
    fn test_lookup_canonicalizes_probe_key() {
        let config = BuildConfig::from_value(json!({ "target": "gpu" }));
        assert_eq!(config.get(" target ").and_then(Value::as_str), Some("gpu"));
        assert_eq!(config.target(), Some("gpu"));
    }

    #[test]
    fn test_non_object_value_yields_empty_config() {
        assert!(BuildConfig::from_value(json!(null)).is_empty());
        assert!(BuildConfig::from_value(json!([1, 2])).is_empty());
        assert!(BuildConfig::from_value(json!("str")).is_empty());
    }
}
