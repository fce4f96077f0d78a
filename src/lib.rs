#![warn(warnings)]
#![deny(clippy::all)]

pub mod catalog;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod form;
pub mod record;
pub mod reference;
pub mod schema;
pub mod storage;
pub mod value;

pub use catalog::{Catalog, CollectionIds, EntityKind};
pub use config::AppConfig;
pub use controller::{CollectionController, EntityDef};
pub use dashboard::{Dashboard, Stats};
pub use error::StoreError;
pub use form::{EntityForm, FieldInput, SubmitOutcome};
pub use record::Record;
pub use reference::RecordRef;
pub use schema::{FieldDescriptor, FieldKind, FieldSchema, SelectOption};
pub use storage::{OpendalStore, RecordStore};
pub use value::{FieldMap, FieldValue};
