use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Number,
    Date,
    Textarea,
    Checkbox,
    Select,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Textarea => "textarea",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select => "select",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// One slot of a form.
///
/// `reference` names the collection a select field points into; controllers
/// use it to encode the selected id as a record reference before storage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FieldDescriptor {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            required: false,
            options: None,
            placeholder: None,
            reference: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = Some(options);
        self
    }

    /// Select field whose value is a record id in `collection`.
    pub fn reference(mut self, collection: impl Into<String>) -> Self {
        self.reference = Some(collection.into());
        if self.options.is_none() {
            self.options = Some(Vec::new());
        }
        self
    }
}

/// Ordered list of field descriptors.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Accepts either a bare array of descriptors or an object carrying a
    /// `fields` array.
    pub fn from_value(value: &Value) -> Result<Self> {
        let fields = match value {
            Value::Array(_) => value,
            Value::Object(map) => map
                .get("fields")
                .context("Form definition missing 'fields'")?,
            _ => return Err(anyhow!("Form definition must be an array or object")),
        };
        Ok(serde_json::from_value(fields.clone())?)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.reference.is_some())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Structural check for callers that want one. Forms never run it.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.key.is_empty() {
                return Err(anyhow!("Field with label '{}' has an empty key", field.label));
            }
            if !seen.insert(field.key.as_str()) {
                return Err(anyhow!("Duplicate field key: {}", field.key));
            }
            match (field.kind, &field.options) {
                (FieldKind::Select, None) => {
                    return Err(anyhow!("Select field '{}' requires options", field.key));
                }
                (kind, Some(_)) if kind != FieldKind::Select => {
                    return Err(anyhow!(
                        "Field '{}' of type {} cannot carry options",
                        field.key,
                        kind.as_str()
                    ));
                }
                _ => {}
            }
            if field.reference.is_some() && field.kind != FieldKind::Select {
                return Err(anyhow!(
                    "Reference field '{}' must be a select",
                    field.key
                ));
            }
        }
        Ok(())
    }
}
