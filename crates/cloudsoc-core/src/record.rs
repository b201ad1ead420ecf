//! Raw upstream log records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::category::LogCategory;

/// Why a record could not take part in deduplication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has no usable {0:?} field")]
    MissingId(String),
    #[error("record has no usable {0:?} field")]
    MissingTimestamp(String),
    #[error("record timestamp {0:?} is not parseable")]
    BadTimestamp(String),
}

/// An opaque key-value log record as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The record identifier. Numeric ids are rendered as strings.
    pub fn id(&self, field: &str) -> Result<String, RecordError> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(RecordError::MissingId(field.to_string())),
        }
    }

    /// The raw timestamp text.
    pub fn timestamp(&self, field: &str) -> Result<&str, RecordError> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
            _ => Err(RecordError::MissingTimestamp(field.to_string())),
        }
    }

    /// Add the `_time` and `type` fields consumers index on.
    pub fn enrich(&mut self, category: &LogCategory) {
        if let Some(ts) = self.0.get(&category.timestamp_field).cloned() {
            self.0.insert("_time".into(), ts);
        }
        if let Some(label) = &category.event_label {
            self.0.insert("type".into(), Value::String(label.clone()));
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawRecord(map),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                RawRecord(map)
            }
        }
    }
}

/// A record tagged with the category it was collected from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedRecord {
    pub category: String,
    pub record: RawRecord,
}
