//! Collaborators the panel core calls into. The host supplies the
//! implementations; `wrapup-sync` provides HTTP-backed ones.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::record::{FieldValues, Record, RecordId};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the named fields of a record. `fields` are `Object.Field` names.
    async fn fetch(&self, record_id: &RecordId, fields: &[String]) -> Result<Record, StoreError>;

    /// Write field values to a record.
    async fn persist(&self, record_id: &RecordId, fields: &FieldValues) -> Result<(), StoreError>;
}

/// A stream of raw change messages. Dropping it unsubscribes.
pub type ChangeStream = BoxStream<'static, Value>;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to a channel. Delivery is at-least-once; messages may
    /// repeat or arrive out of order.
    async fn subscribe(&self, channel: &str) -> Result<ChangeStream, StoreError>;
}

/// Parameters of a wrap-up code update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapUpRequest {
    pub interaction_id: Option<String>,
    pub wrap_up_code_id: String,
    pub participant_id: Option<String>,
    pub communication_id: Option<String>,
}

#[async_trait]
pub trait RemoteAction: Send + Sync {
    async fn update_wrap_up_code(&self, request: &WrapUpRequest) -> Result<(), StoreError>;
}

/// Toast variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget operator feedback.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Presentation-layer hook, invoked once the rendered content may have
/// changed height (after mount and after a refresh has settled).
pub trait LayoutHook: Send + Sync {
    fn relayout(&self);
}

/// A [`LayoutHook`] for hosts with nothing to recalculate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLayout;

impl LayoutHook for NoLayout {
    fn relayout(&self) {}
}
