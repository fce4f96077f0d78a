use anyhow::Result;
use async_trait::async_trait;
use kurs_core::{OpendalStore, Record, RecordStore, StoreError};
use opendal::services::Memory;
use opendal::Operator;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[allow(dead_code)]
pub fn setup_operator() -> Result<Operator> {
    let builder = Memory::default();
    let op = Operator::new(builder)?.finish();
    Ok(op)
}

#[allow(dead_code)]
pub fn setup_store() -> Result<OpendalStore> {
    init_tracing();
    Ok(OpendalStore::new(setup_operator()?))
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Store wrapper whose calls can be made to fail on demand.
#[allow(dead_code)]
pub struct FlakyStore {
    inner: OpendalStore,
    failing: AtomicBool,
    pub updates: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: OpendalStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(false),
            updates: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::UnknownCollection(collection.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.check(collection)?;
        self.inner.list(collection).await
    }

    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.check(collection)?;
        self.inner.create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.check(collection)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(collection, record_id, fields).await
    }

    async fn delete(&self, collection: &str, record_id: &str) -> Result<(), StoreError> {
        self.check(collection)?;
        self.inner.delete(collection, record_id).await
    }
}

/// Store wrapper that holds updates back while armed, until `release`.
#[allow(dead_code)]
pub struct GatedStore {
    inner: OpendalStore,
    armed: AtomicBool,
    gate: Notify,
}

#[allow(dead_code)]
impl GatedStore {
    pub fn new(inner: OpendalStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            armed: AtomicBool::new(false),
            gate: Notify::new(),
        })
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Let the held update through; later updates run straight away.
    pub fn release(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.list(collection).await
    }

    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.inner.create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        if self.armed.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.update(collection, record_id, fields).await
    }

    async fn delete(&self, collection: &str, record_id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, record_id).await
    }
}

#[allow(dead_code)]
pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
