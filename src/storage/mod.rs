use crate::error::StoreError;
use crate::record::Record;
use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::services::Memory;
use opendal::Operator;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

mod opendal_store;

pub use opendal_store::OpendalStore;

/// Remote record storage as seen by collection controllers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All live records of a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    async fn create(&self, collection: &str, fields: Map<String, Value>)
        -> Result<Record, StoreError>;

    /// Merge `fields` into the stored record. Keys not present are left
    /// untouched; explicit nulls are stored as null.
    async fn update(
        &self,
        collection: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError>;

    async fn delete(&self, collection: &str, record_id: &str) -> Result<(), StoreError>;
}

static MEMORY_OPERATORS: OnceLock<Mutex<HashMap<String, Operator>>> = OnceLock::new();

/// Build an operator from a storage URI (`memory://`, `fs://`, `s3://`...).
///
/// Every `memory://` URI names one in-process store; callers opening the
/// same URI see the same records.
pub fn operator_from_uri(uri: &str) -> Result<Operator> {
    if !uri.starts_with("memory://") {
        return Operator::from_uri(uri).with_context(|| format!("Unsupported storage URI: {}", uri));
    }

    let mut shared = MEMORY_OPERATORS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(op) = shared.get(uri) {
        return Ok(op.clone());
    }
    let op = Operator::new(Memory::default())?.finish();
    debug!(uri, "opened memory storage");
    shared.insert(uri.to_string(), op.clone());
    Ok(op)
}
