use crate::schema::{FieldDescriptor, FieldKind, FieldSchema, SelectOption};
use crate::value::{FieldMap, FieldValue};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Menu value standing for "nothing selected". Never reaches a draft.
pub const NO_SELECTION: &str = "none";
pub const NO_SELECTION_LABEL: &str = "Keine Auswahl";
pub const SELECT_PLACEHOLDER: &str = "Auswählen...";
pub const TEXTAREA_ROWS: u32 = 3;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw value delivered by an input widget.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    Text(String),
    Checked(bool),
}

impl From<&str> for FieldInput {
    fn from(value: &str) -> Self {
        FieldInput::Text(value.to_string())
    }
}

impl From<bool> for FieldInput {
    fn from(value: bool) -> Self {
        FieldInput::Checked(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The save operation ran and succeeded.
    Completed,
    /// Nothing ran: the dialog was closed or a save was already in flight.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Input {
        input_type: &'static str,
        value: String,
        placeholder: Option<String>,
    },
    TextArea {
        value: String,
        placeholder: Option<String>,
        rows: u32,
    },
    Checkbox {
        checked: bool,
    },
    Select {
        value: String,
        options: Vec<SelectOption>,
        placeholder: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedField {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub widget: Widget,
}

struct FormState {
    schema: FieldSchema,
    // None while the dialog is closed.
    draft: Option<FieldMap>,
    session: u64,
    saving: bool,
}

/// Dialog-scoped draft editor driven by a `FieldSchema`.
///
/// Cloning yields another handle to the same dialog.
#[derive(Clone)]
pub struct EntityForm {
    inner: Arc<Mutex<FormState>>,
}

impl Default for EntityForm {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityForm {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FormState {
                schema: FieldSchema::default(),
                draft: None,
                session: 0,
                saving: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FormState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, schema: FieldSchema, initial: Option<&FieldMap>) {
        self.open_on(schema, initial, Local::now().date_naive());
    }

    /// Open with `today` used for date defaults.
    pub fn open_on(&self, schema: FieldSchema, initial: Option<&FieldMap>, today: NaiveDate) {
        let draft = initial_draft(&schema, initial, today);
        let mut state = self.state();
        state.schema = schema;
        state.draft = Some(draft);
        state.session += 1;
    }

    pub fn is_open(&self) -> bool {
        self.state().draft.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.state().saving
    }

    pub fn draft(&self) -> Option<FieldMap> {
        self.state().draft.clone()
    }

    pub fn value(&self, key: &str) -> Option<FieldValue> {
        self.state()
            .draft
            .as_ref()
            .and_then(|draft| draft.get(key).cloned())
    }

    /// Apply one edit. Returns false when closed or the key is not in the
    /// schema.
    pub fn edit(&self, key: &str, input: impl Into<FieldInput>) -> bool {
        let mut state = self.state();
        let Some(kind) = state.schema.get(key).map(|f| f.kind) else {
            return false;
        };
        let Some(draft) = state.draft.as_mut() else {
            return false;
        };
        draft.insert(key.to_string(), coerce(kind, input.into()));
        true
    }

    /// Close and drop the draft. An in-flight save keeps running.
    pub fn cancel(&self) {
        self.state().draft = None;
    }

    /// Hand the full draft to `save`. The dialog closes once `save`
    /// succeeds; on failure it stays open and the error is returned.
    pub async fn submit<F, Fut>(&self, save: F) -> Result<SubmitOutcome>
    where
        F: FnOnce(FieldMap) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (draft, session) = {
            let mut state = self.state();
            if state.saving {
                return Ok(SubmitOutcome::Suppressed);
            }
            let Some(draft) = state.draft.clone() else {
                return Ok(SubmitOutcome::Suppressed);
            };
            state.saving = true;
            (draft, state.session)
        };

        let result = save(draft).await;

        let mut state = self.state();
        state.saving = false;
        result?;
        // A cancel-and-reopen during the save started a new session; leave it alone.
        if state.session == session {
            state.draft = None;
        }
        Ok(SubmitOutcome::Completed)
    }

    pub fn render(&self) -> Option<Vec<RenderedField>> {
        let state = self.state();
        let draft = state.draft.as_ref()?;
        Some(
            state
                .schema
                .fields()
                .iter()
                .map(|field| render_field(field, draft.get(&field.key)))
                .collect(),
        )
    }
}

fn initial_draft(schema: &FieldSchema, initial: Option<&FieldMap>, today: NaiveDate) -> FieldMap {
    let mut draft = FieldMap::new();
    for field in schema.fields() {
        let value = match initial.and_then(|data| data.get(&field.key)) {
            Some(value) => value.clone(),
            None => match field.kind {
                FieldKind::Checkbox => FieldValue::Bool(false),
                FieldKind::Date => FieldValue::Text(today.format(DATE_FORMAT).to_string()),
                _ => FieldValue::empty(),
            },
        };
        draft.insert(field.key.clone(), value);
    }
    draft
}

/// Convert raw widget input into the value stored for a field of `kind`.
pub fn coerce(kind: FieldKind, input: FieldInput) -> FieldValue {
    let raw = match input {
        FieldInput::Checked(checked) => return FieldValue::Bool(checked),
        FieldInput::Text(raw) => raw,
    };
    match kind {
        FieldKind::Checkbox => FieldValue::Bool(raw == "true" || raw == "on"),
        FieldKind::Number => {
            if raw.trim().is_empty() {
                return FieldValue::empty();
            }
            match raw.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => FieldValue::Number(n),
                _ => FieldValue::Text(raw),
            }
        }
        FieldKind::Select if raw == NO_SELECTION => FieldValue::empty(),
        _ => FieldValue::Text(raw),
    }
}

fn render_field(field: &FieldDescriptor, value: Option<&FieldValue>) -> RenderedField {
    let text = value.map(FieldValue::display_text).unwrap_or_default();
    let widget = match field.kind {
        FieldKind::Text | FieldKind::Email | FieldKind::Number | FieldKind::Date => Widget::Input {
            input_type: field.kind.as_str(),
            value: text,
            // Date inputs have no placeholder.
            placeholder: match field.kind {
                FieldKind::Date => None,
                _ => field.placeholder.clone(),
            },
        },
        FieldKind::Textarea => Widget::TextArea {
            value: text,
            placeholder: field.placeholder.clone(),
            rows: TEXTAREA_ROWS,
        },
        FieldKind::Checkbox => Widget::Checkbox {
            checked: value.and_then(FieldValue::as_bool).unwrap_or(false),
        },
        FieldKind::Select => {
            let mut options = Vec::new();
            if !field.required {
                options.push(SelectOption::new(NO_SELECTION, NO_SELECTION_LABEL));
            }
            options.extend(field.options.iter().flatten().cloned());
            Widget::Select {
                value: if text.is_empty() {
                    NO_SELECTION.to_string()
                } else {
                    text
                },
                options,
                placeholder: field
                    .placeholder
                    .clone()
                    .unwrap_or_else(|| SELECT_PLACEHOLDER.to_string()),
            }
        }
    };
    RenderedField {
        key: field.key.clone(),
        label: field.label.clone(),
        required: field.required && field.kind != FieldKind::Checkbox,
        widget,
    }
}
