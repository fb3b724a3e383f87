//! In-memory collaborators for exercising the runtime without a backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde_json::{Value, json};
use tokio::sync::Notify;

use wrapup_core::{
    ChangeFeed, ChangeStream, FieldValues, LayoutHook, NotificationSink, Record, RecordId,
    RecordStore, RemoteAction, Severity, StoreError, WrapUpRequest,
};

pub const RECORD_ID: &str = "0LQ000000000042";

/// A voice-call record with all copilot fields populated.
pub fn voice_call_record() -> Record {
    let Value::Object(fields) = json!({
        "GC_Copilot_wrap_up_1_name__c": "Billing question",
        "GC_Copilot_wrap_up_1_confidence__c": 0.92,
        "GC_Copilot_wrap_up_1_id__c": "wu-billing",
        "GC_Copilot_wrap_up_2_name__c": "Refund issued",
        "GC_Copilot_wrap_up_2_confidence__c": 0.55,
        "GC_Copilot_wrap_up_2_id__c": "wu-refund",
        "GC_Copilot_wrap_up_3_name__c": "Escalated",
        "GC_Copilot_wrap_up_3_confidence__c": null,
        "GC_Copilot_wrap_up_3_id__c": null,
        "GC_Copilot_summary_text__c": "Customer asked about a double charge.",
        "GC_Copilot_summary_confidence__c": 0.81,
        "GC_Copilot_resolution_text__c": "Refund raised.",
        "GC_Copilot_resolution_confidence__c": 0.42,
        "GC_Copilot_reason_text__c": "Billing",
        "GC_Copilot_reason_confidence__c": 0.7,
        "GC_Copilot_followup_text__c": "",
        "GC_Copilot_followup_confidence__c": null,
        "GC_Interaction_Id__c": "conv-123",
        "GC_Copilot_participant_id__c": "cust-participant",
        "GC_agent_participant_id__c": "agent-participant",
        "GC_Copilot_communication_id__c": "comm-9"
    }) else {
        unreachable!("fixture is an object");
    };
    Record::new(RecordId::new(RECORD_ID), fields)
}

/// A change message in the shape the feed delivers.
pub fn change_message(record_ids: &[&str], changed_fields: &[&str]) -> Value {
    json!({
        "data": {
            "payload": {
                "ChangeEventHeader": {
                    "entityName": "VoiceCall",
                    "changeType": "UPDATE",
                    "recordIds": record_ids,
                    "changedFields": changed_fields
                }
            }
        }
    })
}

#[derive(Default)]
pub struct FakeStore {
    record: Mutex<Option<Record>>,
    persisted: Mutex<Vec<FieldValues>>,
    persist_failures: Mutex<VecDeque<StoreError>>,
    fetch_failures: Mutex<VecDeque<StoreError>>,
    fetches: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeStore {
    pub fn with_record(record: Record) -> Arc<Self> {
        let store = Self::default();
        *store.record.lock().unwrap() = Some(record);
        Arc::new(store)
    }

    pub fn fail_next_persist(&self, err: StoreError) {
        self.persist_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_fetch(&self, err: StoreError) {
        self.fetch_failures.lock().unwrap().push_back(err);
    }

    /// Make every persist wait for a permit on the returned gate.
    pub fn gate_persists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Simulate a backend-side change to the stored record.
    pub fn set_field(&self, field: &str, value: Value) {
        if let Some(record) = self.record.lock().unwrap().as_mut() {
            record.fields.insert(field.to_string(), value);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// String values written to `field`, in attempt order (failures included).
    pub fn persisted_values(&self, field: &str) -> Vec<String> {
        self.persisted
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| f.get(field).and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn fetch(&self, record_id: &RecordId, _fields: &[String]) -> Result<Record, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.record
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StoreError::NotFound(record_id.clone()))
    }

    async fn persist(&self, _record_id: &RecordId, fields: &FieldValues) -> Result<(), StoreError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.persisted.lock().unwrap().push(fields.clone());
        if let Some(err) = self.persist_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(record) = self.record.lock().unwrap().as_mut() {
            record.fields.extend(fields.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRemote {
    requests: Mutex<Vec<WrapUpRequest>>,
    failures: Mutex<VecDeque<StoreError>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, err: StoreError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<WrapUpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteAction for FakeRemote {
    async fn update_wrap_up_code(&self, request: &WrapUpRequest) -> Result<(), StoreError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.requests.lock().unwrap().push(request.clone());
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    toasts: Mutex<Vec<(String, String, Severity)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.toasts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message, severity)| (*severity, message.clone()))
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.toasts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), severity));
    }
}

#[derive(Default)]
pub struct CountingLayout {
    calls: AtomicUsize,
}

impl CountingLayout {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LayoutHook for CountingLayout {
    fn relayout(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A feed backed by an unbounded channel; only one subscription is allowed.
pub struct FakeFeed {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    pub channels: Mutex<Vec<String>>,
}

impl FakeFeed {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<Value>) {
        let (tx, rx) = mpsc::unbounded();
        let feed = Self {
            receiver: Mutex::new(Some(rx)),
            channels: Mutex::new(Vec::new()),
        };
        (Arc::new(feed), tx)
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(&self, channel: &str) -> Result<ChangeStream, StoreError> {
        self.channels.lock().unwrap().push(channel.to_string());
        self.receiver
            .lock()
            .unwrap()
            .take()
            .map(|rx| rx.boxed())
            .ok_or_else(|| StoreError::Transport("already subscribed".into()))
    }
}
