use crate::form::{EntityForm, SubmitOutcome, NO_SELECTION};
use crate::record::Record;
use crate::reference;
use crate::schema::{FieldDescriptor, FieldSchema, SelectOption};
use crate::storage::RecordStore;
use crate::value::{from_json_map, to_json_map, FieldMap, FieldValue};
use anyhow::{anyhow, Result};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};
use url::Url;

/// Shown wherever a reference cannot be resolved.
pub const UNRESOLVED: &str = "-";
/// Option label for a referenced record without a display name.
pub const UNKNOWN_LABEL: &str = "Unbekannt";

/// Label of a record when another entity points at it.
pub type DisplayFn = fn(&Record) -> String;

/// Called with the collection id after every successful mutation.
pub type DataChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Static description of one entity type.
#[derive(Clone)]
pub struct EntityDef {
    pub collection: String,
    pub fields: Vec<FieldDescriptor>,
    pub display: DisplayFn,
}

impl EntityDef {
    pub fn new(collection: impl Into<String>, fields: Vec<FieldDescriptor>, display: DisplayFn) -> Self {
        Self {
            collection: collection.into(),
            fields,
            display,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Fields that point into another collection.
    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.reference.is_some())
    }
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDef")
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct CollectionState {
    records: Vec<Record>,
    companions: HashMap<String, Vec<Record>>,
    loaded: bool,
    selected: Option<String>,
    pending_delete: Option<String>,
    deleting: bool,
}

/// Owns the loaded records of one entity type and runs every mutation
/// through the store, reloading afterwards.
pub struct CollectionController {
    def: EntityDef,
    companions: Vec<EntityDef>,
    store: Arc<dyn RecordStore>,
    record_base: Option<Url>,
    listener: Option<DataChangeListener>,
    form: EntityForm,
    state: RwLock<CollectionState>,
}

impl CollectionController {
    pub fn new(def: EntityDef, store: Arc<dyn RecordStore>) -> Self {
        Self {
            def,
            companions: Vec::new(),
            store,
            record_base: None,
            listener: None,
            form: EntityForm::new(),
            state: RwLock::new(CollectionState::default()),
        }
    }

    /// Load `companion` alongside this collection, for select options,
    /// reference labels and reverse lookups.
    pub fn with_companion(mut self, companion: EntityDef) -> Self {
        self.companions.push(companion);
        self
    }

    /// Persist references as full record URLs under `base` instead of
    /// `<collection>/<record_id>`.
    pub fn with_record_base(mut self, base: Url) -> Self {
        self.record_base = Some(base);
        self
    }

    pub fn on_data_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn def(&self) -> &EntityDef {
        &self.def
    }

    pub fn collection(&self) -> &str {
        &self.def.collection
    }

    pub fn form(&self) -> &EntityForm {
        &self.form
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Loading ---

    /// Reload this collection and its companions, replacing local state.
    /// Failures are logged and the previous state is kept.
    pub async fn load(&self) {
        if let Err(e) = self.try_load().await {
            warn!(collection = %self.def.collection, error = %e, "failed to load records");
            self.write_state().loaded = true;
        }
    }

    pub async fn try_load(&self) -> Result<()> {
        let mut collections = vec![self.def.collection.as_str()];
        collections.extend(self.companions.iter().map(|c| c.collection.as_str()));
        let lists = try_join_all(collections.iter().map(|c| self.store.list(c))).await?;

        let mut lists = lists.into_iter();
        let records = lists.next().unwrap_or_default();
        let companions: HashMap<String, Vec<Record>> = collections[1..]
            .iter()
            .map(|c| c.to_string())
            .zip(lists)
            .collect();

        debug!(
            collection = %self.def.collection,
            count = records.len(),
            "loaded records"
        );
        let mut state = self.write_state();
        state.records = records;
        state.companions = companions;
        state.loaded = true;
        Ok(())
    }

    /// True until the first load attempt has finished.
    pub fn is_loading(&self) -> bool {
        !self.read_state().loaded
    }

    pub fn records(&self) -> Vec<Record> {
        self.read_state().records.clone()
    }

    pub fn record(&self, record_id: &str) -> Option<Record> {
        self.read_state()
            .records
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn companion_records(&self, collection: &str) -> Vec<Record> {
        self.read_state()
            .companions
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    // --- Schema and boundary mapping ---

    fn companion_def(&self, collection: &str) -> Option<&EntityDef> {
        self.companions.iter().find(|c| c.collection == collection)
    }

    /// Field schema with reference options filled from loaded companions.
    pub fn schema(&self) -> FieldSchema {
        let state = self.read_state();
        let fields = self
            .def
            .fields
            .iter()
            .map(|field| {
                let mut field = field.clone();
                if let Some(target) = field.reference.clone() {
                    let display = self.companion_def(&target).map(|c| c.display);
                    let options = state
                        .companions
                        .get(&target)
                        .map(|records| {
                            records
                                .iter()
                                .map(|r| {
                                    let label = display.map(|f| f(r)).unwrap_or_default();
                                    SelectOption::new(
                                        r.record_id.clone(),
                                        if label.is_empty() {
                                            UNKNOWN_LABEL.to_string()
                                        } else {
                                            label
                                        },
                                    )
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    field.options = Some(options);
                }
                field
            })
            .collect();
        FieldSchema::new(fields)
    }

    /// Form values for editing `record`, with references decoded to bare ids.
    pub fn initial_data(&self, record: &Record) -> FieldMap {
        let mut data = from_json_map(&record.fields);
        for field in self.def.reference_fields() {
            let id = reference::decode(record.get(&field.key).and_then(Value::as_str));
            data.insert(field.key.clone(), FieldValue::Text(id));
        }
        data
    }

    fn encode_reference(&self, collection: &str, record_id: &str) -> Result<String> {
        match &self.record_base {
            Some(base) => Ok(reference::record_url(base, collection, record_id)?.to_string()),
            None => Ok(reference::encode(collection, record_id)),
        }
    }

    /// Rewrite reference fields of a draft for storage: a selected id becomes
    /// a reference string, anything else an explicit null.
    pub fn encode_references(&self, draft: &FieldMap) -> Result<Map<String, Value>> {
        let mut processed = draft.clone();
        for field in &self.def.fields {
            let Some(target) = &field.reference else {
                continue;
            };
            let encoded = match draft.get(&field.key) {
                Some(FieldValue::Text(id)) if !id.is_empty() && id != NO_SELECTION => {
                    FieldValue::Text(self.encode_reference(target, id)?)
                }
                _ => FieldValue::Null,
            };
            processed.insert(field.key.clone(), encoded);
        }
        Ok(to_json_map(&processed))
    }

    /// Label of the record a stored reference points at, or `-`.
    pub fn resolve_reference(&self, key: &str, stored: Option<&Value>) -> String {
        let Some(target) = self.def.field(key).and_then(|f| f.reference.as_deref()) else {
            return UNRESOLVED.to_string();
        };
        let id = reference::decode(stored.and_then(Value::as_str));
        if id.is_empty() {
            return UNRESOLVED.to_string();
        }
        let Some(display) = self.companion_def(target).map(|c| c.display) else {
            return UNRESOLVED.to_string();
        };
        let state = self.read_state();
        let label = state
            .companions
            .get(target)
            .and_then(|records| records.iter().find(|r| r.record_id == id))
            .map(display)
            .unwrap_or_default();
        if label.is_empty() {
            UNRESOLVED.to_string()
        } else {
            label
        }
    }

    /// `resolve_reference` for a field of one of this collection's records.
    pub fn display_reference(&self, record: &Record, key: &str) -> String {
        self.resolve_reference(key, record.get(key))
    }

    /// How many records of companion `collection` point at `record_id`
    /// through their `key` field.
    pub fn referencing_count(&self, collection: &str, key: &str, record_id: &str) -> usize {
        self.read_state()
            .companions
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| reference::decode(r.get(key).and_then(Value::as_str)) == record_id)
                    .count()
            })
            .unwrap_or(0)
    }

    // --- Mutations ---

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener(&self.def.collection);
        }
    }

    async fn after_mutation(&self) {
        self.load().await;
        self.notify();
    }

    pub async fn create(&self, draft: FieldMap) -> Result<Record> {
        let fields = self.encode_references(&draft)?;
        let record = self
            .store
            .create(&self.def.collection, fields)
            .await
            .inspect_err(|e| {
                warn!(collection = %self.def.collection, error = %e, "failed to create record");
            })?;
        self.after_mutation().await;
        Ok(record)
    }

    pub async fn update(&self, record_id: &str, draft: FieldMap) -> Result<Record> {
        let fields = self.encode_references(&draft)?;
        let record = self
            .store
            .update(&self.def.collection, record_id, fields)
            .await
            .inspect_err(|e| {
                warn!(collection = %self.def.collection, record_id, error = %e, "failed to update record");
            })?;
        self.after_mutation().await;
        Ok(record)
    }

    pub async fn remove(&self, record_id: &str) -> Result<()> {
        self.store
            .delete(&self.def.collection, record_id)
            .await
            .inspect_err(|e| {
                warn!(collection = %self.def.collection, record_id, error = %e, "failed to delete record");
            })?;
        self.after_mutation().await;
        Ok(())
    }

    /// Flip a checkbox field with a single-key update. Failures are logged.
    pub async fn toggle_flag(&self, record_id: &str, key: &str) {
        let current = self
            .record(record_id)
            .map(|r| r.flag(key))
            .unwrap_or(false);
        let mut patch = Map::new();
        patch.insert(key.to_string(), Value::Bool(!current));
        match self.store.update(&self.def.collection, record_id, patch).await {
            Ok(_) => self.after_mutation().await,
            Err(e) => {
                warn!(collection = %self.def.collection, record_id, key, error = %e, "failed to toggle field");
            }
        }
    }

    // --- Dialogs ---

    pub fn open_create(&self) {
        self.write_state().selected = None;
        self.form.open(self.schema(), None);
    }

    pub fn open_edit(&self, record_id: &str) -> Result<()> {
        let record = self
            .record(record_id)
            .ok_or_else(|| anyhow!("Record not found: {}", record_id))?;
        self.write_state().selected = Some(record.record_id.clone());
        self.form
            .open(self.schema(), Some(&self.initial_data(&record)));
        Ok(())
    }

    pub fn selected(&self) -> Option<String> {
        self.read_state().selected.clone()
    }

    /// Submit the open dialog as a create or an update of the selected record.
    pub async fn save(&self) -> Result<SubmitOutcome> {
        let selected = self.selected();
        let target = selected.clone();
        let outcome = self
            .form
            .submit(|draft| async move {
                match target {
                    Some(record_id) => self.update(&record_id, draft).await.map(|_| ()),
                    None => self.create(draft).await.map(|_| ()),
                }
            })
            .await?;
        // A dialog reopened while saving keeps its own selection.
        if outcome == SubmitOutcome::Completed && !self.form.is_open() {
            let mut state = self.write_state();
            if state.selected == selected {
                state.selected = None;
            }
        }
        Ok(outcome)
    }

    pub fn request_delete(&self, record_id: &str) {
        let mut state = self.write_state();
        state.selected = Some(record_id.to_string());
        state.pending_delete = Some(record_id.to_string());
    }

    pub fn pending_delete(&self) -> Option<String> {
        self.read_state().pending_delete.clone()
    }

    pub fn is_deleting(&self) -> bool {
        self.read_state().deleting
    }

    pub fn cancel_delete(&self) {
        self.write_state().pending_delete = None;
    }

    /// Delete the record awaiting confirmation. On failure the confirmation
    /// stays pending so the user can retry or cancel.
    pub async fn confirm_delete(&self) -> Result<SubmitOutcome> {
        let record_id = {
            let mut state = self.write_state();
            if state.deleting {
                return Ok(SubmitOutcome::Suppressed);
            }
            let Some(record_id) = state.pending_delete.clone() else {
                return Ok(SubmitOutcome::Suppressed);
            };
            state.deleting = true;
            record_id
        };

        let result = self.remove(&record_id).await;

        let mut state = self.write_state();
        state.deleting = false;
        result?;
        if state.pending_delete.as_deref() == Some(record_id.as_str()) {
            state.pending_delete = None;
        }
        state.selected = None;
        Ok(SubmitOutcome::Completed)
    }
}
