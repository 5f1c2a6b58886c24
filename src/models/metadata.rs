//! Per-file metadata supplied by an extraction step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field holding the positive prompt.
pub const POSITIVE_PROMPT: &str = "positive_prompt";
/// Field holding the negative prompt.
pub const NEGATIVE_PROMPT: &str = "negative_prompt";
/// Field holding companion tag text.
pub const TAGS: &str = "tags";
/// Field holding raw generation parameters.
pub const PARAMETERS: &str = "parameters";

/// Fields that are never treated as "other" text.
const RESERVED_FIELDS: &[&str] = &[POSITIVE_PROMPT, NEGATIVE_PROMPT, PARAMETERS, TAGS];

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Missing value.
    Null,
    /// Boolean value.
    Flag(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
    /// List of values.
    List(Vec<MetadataValue>),
    /// Nested mapping.
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Returns the text if this is a string value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Flat field mapping for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMetadata {
    fields: BTreeMap<String, MetadataValue>,
}

impl FileMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns a field's text, if it is a string.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(MetadataValue::as_text)
    }

    /// Returns the positive prompt, or an empty string.
    #[must_use]
    pub fn positive_prompt(&self) -> &str {
        self.text(POSITIVE_PROMPT).unwrap_or_default()
    }

    /// Returns the negative prompt, or an empty string.
    #[must_use]
    pub fn negative_prompt(&self) -> &str {
        self.text(NEGATIVE_PROMPT).unwrap_or_default()
    }

    /// Returns the companion tag text, or an empty string.
    #[must_use]
    pub fn tags(&self) -> &str {
        self.text(TAGS).unwrap_or_default()
    }

    /// Iterates string fields other than prompts, parameters and tags.
    pub fn other_text(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .filter_map(|(_, value)| value.as_text())
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
