//! Change-notification filtering.
//!
//! Decides whether a change event makes a panel's cached record stale. The
//! decision is a pure predicate over the notification, the record in scope,
//! and the panel's [`RelevantFieldSet`]:
//!
//! 1. the record must be among the notification's record ids;
//! 2. an empty changed-field list means "unknown", so the record is stale;
//! 3. otherwise it is stale iff a changed field is in the relevant set.
//!
//! Raw feed messages that cannot be decoded are never an error: they are
//! simply not relevant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::record::RecordId;

/// Field names whose change should refresh one panel instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevantFieldSet(BTreeSet<String>);

impl RelevantFieldSet {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeSet<String>> for RelevantFieldSet {
    fn from(set: BTreeSet<String>) -> Self {
        Self(set)
    }
}

/// A decoded change event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    #[serde(default)]
    pub record_ids: Vec<String>,
    /// Empty when the sender did not say which fields changed.
    #[serde(default)]
    pub changed_fields: Vec<String>,
    /// Everything else the header carried (change type, entity, commit info).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ChangeNotification {
    /// Decode a raw feed message.
    ///
    /// The header is read from `data.payload.ChangeEventHeader`, falling back
    /// to `data.changeEventHeader` when that is missing or null. Changed fields come from the header, or
    /// from `data.payload.changedFields` when the header has none. Returns
    /// `None` when there is no header object or a list has the wrong shape.
    pub fn from_message(message: &Value) -> Option<Self> {
        let payload = message.pointer("/data/payload");
        let header = payload
            .and_then(|p| p.get("ChangeEventHeader"))
            .filter(|h| !h.is_null())
            .or_else(|| message.pointer("/data/changeEventHeader"))?
            .as_object()?;

        let record_ids = string_list(header.get("recordIds"))?;
        let changed_fields = match header.get("changedFields") {
            Some(v) if !v.is_null() => string_list(Some(v))?,
            _ => string_list(payload.and_then(|p| p.get("changedFields")))?,
        };
        let metadata = header
            .iter()
            .filter(|(k, _)| k.as_str() != "recordIds" && k.as_str() != "changedFields")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            record_ids,
            changed_fields,
            metadata,
        })
    }

    pub fn mentions(&self, record_id: &RecordId) -> bool {
        self.record_ids.iter().any(|id| id == record_id.as_str())
    }
}

/// Absent or null lists are empty; anything other than an array of strings is
/// malformed. Non-string entries inside an array are skipped.
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Some(_) => None,
    }
}

/// Whether `notification` makes the cached copy of `record_id` stale.
pub fn is_relevant(
    notification: &ChangeNotification,
    record_id: &RecordId,
    relevant_fields: &RelevantFieldSet,
) -> bool {
    if !notification.mentions(record_id) {
        return false;
    }
    if notification.changed_fields.is_empty() {
        return true;
    }
    notification
        .changed_fields
        .iter()
        .any(|f| relevant_fields.contains(f))
}

/// [`is_relevant`] over an undecoded feed message. Malformed messages are not
/// relevant.
pub fn is_relevant_message(
    message: &Value,
    record_id: &RecordId,
    relevant_fields: &RelevantFieldSet,
) -> bool {
    match ChangeNotification::from_message(message) {
        Some(notification) => is_relevant(&notification, record_id, relevant_fields),
        None => {
            debug!(record_id = %record_id, "ignoring malformed change message");
            false
        }
    }
}
