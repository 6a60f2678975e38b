//! Database schema: a name, a version, and the object stores to create.
//!
//! The on-disk shape mirrors the declaration format used by IndexedDB
//! wrappers:
//!
//! ```json
//! {
//!   "name": "example",
//!   "version": 1,
//!   "stores": {
//!     "fruit": {
//!       "options": { "keyPath": "name" },
//!       "indexes": { "color": { "keyPath": "color", "options": { "unique": false } } }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{KeyPath, SchemaError};

/// A versioned database declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Database name. Required; `None` only so a missing name can be
    /// reported as a [`SchemaError`] rather than a parse failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub stores: BTreeMap<String, StoreSchema>,
}

/// One object store declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSchema {
    #[serde(default)]
    pub options: StoreOptions,

    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSchema>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Primary key path.
    #[serde(rename = "keyPath", default)]
    pub key_path: String,

    /// Generate integer keys for records written without one.
    #[serde(rename = "autoIncrement", default)]
    pub auto_increment: bool,
}

/// One secondary index declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Indexed property path. Defaults to the index name when omitted.
    #[serde(rename = "keyPath", default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,

    #[serde(default)]
    pub options: IndexOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub unique: bool,
}

fn default_version() -> u32 {
    1
}

impl Schema {
    /// Start a schema with no stores.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: Some(name.into()),
            version,
            stores: BTreeMap::new(),
        }
    }

    /// Add (or replace) a store declaration.
    pub fn with_store(mut self, name: impl Into<String>, store: StoreSchema) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Parse a schema from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(s).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    /// Parse a schema from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, SchemaError> {
        toml::from_str(s).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    /// Load a schema file. `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| SchemaError::Io(e.to_string()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// The database name, or [`SchemaError::MissingName`].
    pub fn name(&self) -> Result<&str, SchemaError> {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(SchemaError::MissingName),
        }
    }

    /// Look up a store declaration.
    pub fn store(&self, name: &str) -> Result<&StoreSchema, SchemaError> {
        self.stores
            .get(name)
            .ok_or_else(|| SchemaError::UnknownStore(name.to_string()))
    }

    /// Check the schema is complete enough to open a database with.
    pub fn validate(&self) -> Result<(), SchemaError> {
        self.name()?;
        if self.version == 0 {
            return Err(SchemaError::InvalidVersion(self.version));
        }
        if self.stores.is_empty() {
            return Err(SchemaError::NoStores);
        }
        for (store_name, store) in &self.stores {
            store.key_path()?;
            for index_name in store.indexes.keys() {
                store.index_key_path(store_name, index_name)?;
            }
        }
        Ok(())
    }
}

impl StoreSchema {
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            options: StoreOptions {
                key_path: key_path.into(),
                auto_increment: false,
            },
            indexes: BTreeMap::new(),
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.options.auto_increment = true;
        self
    }

    pub fn with_index(
        mut self,
        name: impl Into<String>,
        key_path: impl Into<String>,
        unique: bool,
    ) -> Self {
        self.indexes.insert(
            name.into(),
            IndexSchema {
                key_path: Some(key_path.into()),
                options: IndexOptions { unique },
            },
        );
        self
    }

    /// The parsed primary key path.
    pub fn key_path(&self) -> Result<KeyPath, SchemaError> {
        KeyPath::parse(self.options.key_path.as_str())
    }

    /// The parsed key path of a declared index.
    pub fn index_key_path(&self, store: &str, index: &str) -> Result<KeyPath, SchemaError> {
        let declared = self.indexes.get(index).ok_or_else(|| SchemaError::InvalidKeyPath {
            path: index.to_string(),
            reason: format!("index '{index}' is not declared on store '{store}'"),
        })?;
        KeyPath::parse(declared.key_path_or(index))
    }
}

impl IndexSchema {
    /// The declared key path, falling back to the index name.
    pub fn key_path_or<'a>(&'a self, index_name: &'a str) -> &'a str {
        self.key_path.as_deref().unwrap_or(index_name)
    }
}
