/// Errors returned by a `RecordStore`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The collection id is not one the store serves.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// No live record with this id; tombstoned records count as missing.
    #[error("record not found: {collection}/{record_id}")]
    NotFound {
        collection: String,
        record_id: String,
    },

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(#[from] opendal::Error),
}
