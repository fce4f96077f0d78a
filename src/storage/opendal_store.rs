use super::RecordStore;
use crate::error::StoreError;
use crate::record::Record;
use async_trait::async_trait;
use chrono::Utc;
use opendal::{EntryMode, ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone)]
struct RecordRow {
    record_id: String,
    #[serde(default)]
    fields: Map<String, Value>,
    created_at: f64,
    updated_at: f64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    deleted_at: Option<f64>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            record_id: row.record_id,
            fields: row.fields,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Record store persisting one JSON document per record at
/// `{prefix}{collection}/{record_id}.json`. Deletes leave a tombstone.
#[derive(Clone)]
pub struct OpendalStore {
    op: Operator,
    prefix: String,
    collections: Option<HashSet<String>>,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            prefix: String::new(),
            collections: None,
        }
    }

    /// Place all collections below `prefix`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        self
    }

    /// Reject any collection id outside `collections`.
    pub fn with_collections<I>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.collections = Some(collections.into_iter().collect());
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn check_collection(&self, collection: &str) -> Result<(), StoreError> {
        let known = match &self.collections {
            Some(set) => set.contains(collection),
            None => !collection.is_empty() && !collection.contains('/'),
        };
        if known {
            Ok(())
        } else {
            Err(StoreError::UnknownCollection(collection.to_string()))
        }
    }

    fn collection_dir(&self, collection: &str) -> String {
        format!("{}{}/", self.prefix, collection)
    }

    fn record_path(&self, collection: &str, record_id: &str) -> String {
        format!("{}{}.json", self.collection_dir(collection), record_id)
    }

    async fn read_row(&self, collection: &str, record_id: &str) -> Result<RecordRow, StoreError> {
        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            record_id: record_id.to_string(),
        };
        if record_id.is_empty() || record_id.contains('/') {
            return Err(not_found());
        }
        let bytes = match self.op.read(&self.record_path(collection, record_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let row: RecordRow = serde_json::from_slice(&bytes.to_vec())?;
        if row.deleted {
            return Err(not_found());
        }
        Ok(row)
    }

    async fn write_row(&self, collection: &str, row: &RecordRow) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(row)?;
        self.op
            .write(&self.record_path(collection, &row.record_id), json)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for OpendalStore {
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.check_collection(collection)?;
        let dir = self.collection_dir(collection);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            if entry.metadata().mode() != EntryMode::FILE || !entry.name().ends_with(".json") {
                continue;
            }
            let bytes = self.op.read(entry.path()).await?;
            let row: RecordRow = serde_json::from_slice(&bytes.to_vec())?;
            if row.deleted {
                continue;
            }
            records.push(Record::from(row));
        }
        records.sort_by(|a, b| {
            a.created_at
                .total_cmp(&b.created_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        debug!(collection, count = records.len(), "listed records");
        Ok(records)
    }

    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.check_collection(collection)?;
        self.op.create_dir(&self.collection_dir(collection)).await?;

        let now = now_ts();
        let row = RecordRow {
            record_id: Uuid::new_v4().simple().to_string(),
            fields,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        };
        self.write_row(collection, &row).await?;
        debug!(collection, record_id = %row.record_id, "created record");
        Ok(row.into())
    }

    async fn update(
        &self,
        collection: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.check_collection(collection)?;
        let mut row = self.read_row(collection, record_id).await?;
        for (key, value) in fields {
            row.fields.insert(key, value);
        }
        row.updated_at = now_ts();
        self.write_row(collection, &row).await?;
        debug!(collection, record_id, "updated record");
        Ok(row.into())
    }

    async fn delete(&self, collection: &str, record_id: &str) -> Result<(), StoreError> {
        self.check_collection(collection)?;
        let mut row = self.read_row(collection, record_id).await?;
        let now = now_ts();
        row.deleted = true;
        row.deleted_at = Some(now);
        row.updated_at = now;
        self.write_row(collection, &row).await?;
        debug!(collection, record_id, "deleted record");
        Ok(())
    }
}
