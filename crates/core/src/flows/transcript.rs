use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Prompt,
    Answer,
    Error,
    Notice,
    Confirmation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    pub text: String,
    pub originated_from_system: bool,
    pub kind: EntryKind,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn system(kind: EntryKind, text: impl Into<String>) -> Self {
        Self::new(kind, text, true)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Answer, text, false)
    }

    fn new(kind: EntryKind, text: impl Into<String>, originated_from_system: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            originated_from_system,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only log of every message shown during one widget session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn append(&mut self, entry: TranscriptEntry) -> &TranscriptEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Entries appended after the first `offset` entries.
    pub fn since(&self, offset: usize) -> &[TranscriptEntry] {
        &self.entries[offset.min(self.entries.len())..]
    }

    /// Plain-text rendering used for the submitted record.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let speaker = if entry.originated_from_system { "Assistant" } else { "Visitor" };
                format!("{speaker}: {}", entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
