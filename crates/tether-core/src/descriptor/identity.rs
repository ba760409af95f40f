//! Structural identity of a descriptor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparable identity of a versioned artifact.
///
/// A sorted string map with a mandatory `type` key. Two descriptors refer
/// to the same artifact exactly when their identities are equal; local
/// paths never take part in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("type".to_string(), kind.into());
        Self(fields)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        self.0.get("type").map(String::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Stable key for the bundle cache: blake3 over the canonical JSON form.
    pub fn cache_key(&self) -> String {
        // BTreeMap serialization is ordered, so the JSON form is canonical.
        let canonical = serde_json::to_string(&self.0).unwrap_or_default();
        blake3::hash(canonical.as_bytes()).to_hex()[..32].to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        let mut first = true;
        for (key, value) in &self.0 {
            if key == "type" {
                continue;
            }
            f.write_str(if first { "?" } else { "&" })?;
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
