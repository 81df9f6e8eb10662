use serde::{Deserialize, Serialize};

use crate::domain::upload::FileUpload;
use crate::flows::definition::FieldKey;

/// Raw input handed to the engine for the current step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepInput {
    Text(String),
    File(FileUpload),
}

impl StepInput {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::File(upload) => upload.file_name.trim().is_empty() && upload.bytes.is_empty(),
        }
    }
}

impl From<&str> for StepInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StepInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<FileUpload> for StepInput {
    fn from(value: FileUpload) -> Self {
        Self::File(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FieldValue {
    Text(String),
    Choice(Vec<String>),
    File(FileUpload),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Choice(options) if options.len() == 1 => options.first().map(String::as_str),
            _ => None,
        }
    }

    /// Text shown in the transcript and sent to the relay.
    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Choice(options) => options.join(", "),
            Self::File(upload) => format!("Attached {}", upload.file_name),
        }
    }
}

/// Field values accepted so far, in the order their steps were completed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRecord {
    entries: Vec<(FieldKey, FieldValue)>,
}

impl PartialRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(key, _)| key.as_str() == field).map(|(_, value)| value)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub(crate) fn insert(&mut self, field: FieldKey, value: FieldValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == field) {
            slot.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
