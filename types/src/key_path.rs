//! Dotted key paths into JSON records.

use serde_json::{Map, Value};
use std::fmt;

use crate::{Key, SchemaError};

/// A validated dotted property path such as `name` or `address.city`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath(String);

impl KeyPath {
    /// Parse a key path, rejecting empty paths and empty segments.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SchemaError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SchemaError::InvalidKeyPath {
                path: raw,
                reason: "key path is empty".to_string(),
            });
        }
        if raw.split('.').any(|segment| segment.trim().is_empty()) {
            return Err(SchemaError::InvalidKeyPath {
                path: raw,
                reason: "key path has an empty segment".to_string(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Evaluate the path against a record and convert the leaf into a key.
    pub fn extract(&self, record: &Value) -> Option<Key> {
        let mut current = record;
        for segment in self.segments() {
            current = current.as_object()?.get(segment)?;
        }
        Key::from_value(current)
    }

    /// Write `key` at this path, creating intermediate objects as needed.
    ///
    /// Returns `false` when the record (or an intermediate value on the
    /// path) is not an object.
    pub fn inject(&self, record: &mut Value, key: &Key) -> bool {
        let segments: Vec<&str> = self.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        let mut current = record;
        for segment in parents {
            let Some(object) = current.as_object_mut() else {
                return false;
            };
            current = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match current.as_object_mut() {
            Some(object) => {
                object.insert(last.to_string(), key.to_value());
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
