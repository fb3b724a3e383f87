//! Cached detail records and their identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name → value pairs sent to or received from the record store.
pub type FieldValues = Map<String, Value>;

/// Identifier of a host record (voice call or experience).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A fetched snapshot of one record, keyed by bare field API name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: FieldValues,
}

impl Record {
    pub fn new(id: RecordId, fields: FieldValues) -> Self {
        Self { id, fields }
    }

    /// Raw value of a field, `None` when missing or JSON `null`.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// String value of a field, `""` when missing, null, or not a string.
    pub fn text(&self, field: &str) -> &str {
        self.value(field).and_then(Value::as_str).unwrap_or_default()
    }

    /// Non-empty string value of a field.
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        Some(self.text(field)).filter(|s| !s.is_empty())
    }

    /// Numeric value of a field. Numeric strings are accepted as well since
    /// some stores serialise decimals that way.
    pub fn confidence(&self, field: &str) -> Option<f64> {
        match self.value(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
