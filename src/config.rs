use crate::catalog::{Catalog, CollectionIds};
use crate::storage::{operator_from_uri, OpendalStore};
use anyhow::{Context, Result};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

const DEFAULT_STORAGE_URI: &str = "memory://";

fn default_uri() -> String {
    DEFAULT_STORAGE_URI.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Path below the storage root holding the collections.
    #[serde(default)]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            prefix: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collections: CollectionIds,
    /// When set, references are stored as full record URLs under this base.
    #[serde(default)]
    pub record_base_url: Option<Url>,
}

impl AppConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).context("Invalid application config")
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid application config")
    }

    pub fn operator(&self) -> Result<Operator> {
        operator_from_uri(&self.storage.uri)
            .with_context(|| format!("Cannot open storage at {}", self.storage.uri))
    }

    /// Store restricted to the configured collections.
    pub fn store(&self) -> Result<OpendalStore> {
        Ok(OpendalStore::new(self.operator()?)
            .with_prefix(&self.storage.prefix)
            .with_collections(self.collections.all()))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.collections.clone()).with_record_base(self.record_base_url.clone())
    }
}
