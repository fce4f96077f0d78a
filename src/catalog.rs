//! The five entity types of the course administration.

use crate::controller::{CollectionController, EntityDef, UNKNOWN_LABEL};
use crate::record::Record;
use crate::schema::{FieldDescriptor, FieldKind};
use crate::storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Storage collection ids, one per entity type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionIds {
    pub kurse: String,
    pub dozenten: String,
    pub teilnehmer: String,
    pub raeume: String,
    pub anmeldungen: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            kurse: "kurse".to_string(),
            dozenten: "dozenten".to_string(),
            teilnehmer: "teilnehmer".to_string(),
            raeume: "raeume".to_string(),
            anmeldungen: "anmeldungen".to_string(),
        }
    }
}

impl CollectionIds {
    pub fn all(&self) -> Vec<String> {
        vec![
            self.kurse.clone(),
            self.dozenten.clone(),
            self.teilnehmer.clone(),
            self.raeume.clone(),
            self.anmeldungen.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Kurse,
    Dozenten,
    Teilnehmer,
    Raeume,
    Anmeldungen,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Kurse,
        EntityKind::Dozenten,
        EntityKind::Teilnehmer,
        EntityKind::Raeume,
        EntityKind::Anmeldungen,
    ];
}

fn person_name(record: &Record) -> String {
    record.text("name").to_string()
}

fn course_title(record: &Record) -> String {
    record.text("titel").to_string()
}

/// `raumname (gebaeude)`; a room with only a building shows as
/// `Unbekannt (gebaeude)`.
fn room_label(record: &Record) -> String {
    match (record.text("raumname"), record.text("gebaeude")) {
        ("", "") => String::new(),
        ("", building) => format!("{} ({})", UNKNOWN_LABEL, building),
        (name, "") => name.to_string(),
        (name, building) => format!("{} ({})", name, building),
    }
}

fn record_id_label(record: &Record) -> String {
    record.record_id.clone()
}

#[derive(Debug, Clone)]
pub struct Catalog {
    ids: CollectionIds,
    record_base: Option<Url>,
}

impl Catalog {
    pub fn new(ids: CollectionIds) -> Self {
        Self {
            ids,
            record_base: None,
        }
    }

    /// Controllers built from this catalog store references as record URLs.
    pub fn with_record_base(mut self, base: Option<Url>) -> Self {
        self.record_base = base;
        self
    }

    pub fn ids(&self) -> &CollectionIds {
        &self.ids
    }

    pub fn kurse(&self) -> EntityDef {
        EntityDef::new(
            &self.ids.kurse,
            vec![
                FieldDescriptor::new("titel", "Titel", FieldKind::Text)
                    .required()
                    .placeholder("Einführung in Python"),
                FieldDescriptor::new("beschreibung", "Beschreibung", FieldKind::Textarea)
                    .placeholder("Kursbeschreibung..."),
                FieldDescriptor::new("startdatum", "Startdatum", FieldKind::Date).required(),
                FieldDescriptor::new("enddatum", "Enddatum", FieldKind::Date).required(),
                FieldDescriptor::new("max_teilnehmer", "Max. Teilnehmer", FieldKind::Number)
                    .required()
                    .placeholder("20"),
                FieldDescriptor::new("preis", "Preis (€)", FieldKind::Number).placeholder("299"),
                FieldDescriptor::new("dozent", "Dozent", FieldKind::Select)
                    .required()
                    .reference(&self.ids.dozenten),
                FieldDescriptor::new("raum", "Raum", FieldKind::Select).reference(&self.ids.raeume),
            ],
            course_title,
        )
    }

    pub fn dozenten(&self) -> EntityDef {
        EntityDef::new(
            &self.ids.dozenten,
            vec![
                FieldDescriptor::new("name", "Name", FieldKind::Text)
                    .required()
                    .placeholder("Max Mustermann"),
                FieldDescriptor::new("email", "E-Mail", FieldKind::Email)
                    .required()
                    .placeholder("max@example.de"),
                FieldDescriptor::new("phone", "Telefon", FieldKind::Text).placeholder("+49 123 456789"),
                FieldDescriptor::new("fachgebiet", "Fachgebiet", FieldKind::Text)
                    .placeholder("Informatik"),
            ],
            person_name,
        )
    }

    pub fn teilnehmer(&self) -> EntityDef {
        EntityDef::new(
            &self.ids.teilnehmer,
            vec![
                FieldDescriptor::new("name", "Name", FieldKind::Text)
                    .required()
                    .placeholder("Max Mustermann"),
                FieldDescriptor::new("email", "E-Mail", FieldKind::Email)
                    .required()
                    .placeholder("max@example.de"),
                FieldDescriptor::new("phone", "Telefon", FieldKind::Text).placeholder("+49 123 456789"),
                FieldDescriptor::new("geburtsdatum", "Geburtsdatum", FieldKind::Date),
            ],
            person_name,
        )
    }

    pub fn raeume(&self) -> EntityDef {
        EntityDef::new(
            &self.ids.raeume,
            vec![
                FieldDescriptor::new("raumname", "Raumname", FieldKind::Text)
                    .required()
                    .placeholder("Seminarraum 1"),
                FieldDescriptor::new("gebaeude", "Gebäude", FieldKind::Text).placeholder("Hauptgebäude"),
                FieldDescriptor::new("kapazitaet", "Kapazität", FieldKind::Number)
                    .required()
                    .placeholder("20"),
            ],
            room_label,
        )
    }

    pub fn anmeldungen(&self) -> EntityDef {
        EntityDef::new(
            &self.ids.anmeldungen,
            vec![
                FieldDescriptor::new("teilnehmer", "Teilnehmer", FieldKind::Select)
                    .required()
                    .reference(&self.ids.teilnehmer),
                FieldDescriptor::new("kurs", "Kurs", FieldKind::Select)
                    .required()
                    .reference(&self.ids.kurse),
                FieldDescriptor::new("anmeldedatum", "Anmeldedatum", FieldKind::Date).required(),
                FieldDescriptor::new("bezahlt", "Bezahlt", FieldKind::Checkbox),
            ],
            record_id_label,
        )
    }

    pub fn def(&self, kind: EntityKind) -> EntityDef {
        match kind {
            EntityKind::Kurse => self.kurse(),
            EntityKind::Dozenten => self.dozenten(),
            EntityKind::Teilnehmer => self.teilnehmer(),
            EntityKind::Raeume => self.raeume(),
            EntityKind::Anmeldungen => self.anmeldungen(),
        }
    }

    /// Controller for `kind`, loading the collections its views read from.
    pub fn controller(&self, kind: EntityKind, store: Arc<dyn RecordStore>) -> CollectionController {
        let mut controller = CollectionController::new(self.def(kind), store);
        if let Some(base) = &self.record_base {
            controller = controller.with_record_base(base.clone());
        }
        match kind {
            EntityKind::Kurse => controller
                .with_companion(self.dozenten())
                .with_companion(self.raeume())
                .with_companion(self.anmeldungen()),
            EntityKind::Anmeldungen => controller
                .with_companion(self.teilnehmer())
                .with_companion(self.kurse()),
            EntityKind::Dozenten | EntityKind::Teilnehmer | EntityKind::Raeume => controller,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CollectionIds::default())
    }
}
