//! Panel view: composes the cached record, the summary auto-save, wrap-up
//! selection, and confidence styling into what the host renders.
//!
//! Only the refresh pathway writes the cached record. Reads of the summary go
//! through the auto-save controller so an in-progress edit always wins over a
//! refresh that lands mid-edit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use wrapup_core::variant::WRAP_UP_SLOTS;
use wrapup_core::{
    LayoutHook, NotificationSink, PanelConfig, PanelKind, PanelVariant, Record, RecordId,
    RecordStore, RelevantFieldSet, RemoteAction, Rgb, Severity, StoreError, TextField,
    UnsetPolicy, WrapUpFields, color_for, is_relevant_message, style_for,
};

use crate::autosave::{AutoSaveController, SaveOutcome};
use crate::selector::{SelectionOutcome, WrapUpSelector};

/// Host-provided collaborators for one panel.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub remote: Arc<dyn RemoteAction>,
    pub sink: Arc<dyn NotificationSink>,
    pub layout: Arc<dyn LayoutHook>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrapUpSuggestion {
    pub slot: u8,
    pub name: String,
    pub code_id: Option<String>,
    pub confidence: Option<f64>,
    pub color: Rgb,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSection {
    pub field: TextField,
    pub text: String,
    pub confidence: Option<f64>,
    pub color: Rgb,
    pub style: String,
    /// True while the text shown is an unsaved local edit.
    pub editing: bool,
}

/// Everything the host needs to render the panel at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSnapshot {
    pub record_id: RecordId,
    pub kind: PanelKind,
    pub loaded: bool,
    pub wrap_ups: Vec<WrapUpSuggestion>,
    pub sections: Vec<TextSection>,
    pub box_class: String,
    pub processing: bool,
}

impl PanelSnapshot {
    pub fn section(&self, field: TextField) -> Option<&TextSection> {
        self.sections.iter().find(|s| s.field == field)
    }
}

pub struct PanelView {
    record_id: RecordId,
    variant: PanelVariant,
    policy: UnsetPolicy,
    channel: String,
    relevant: RelevantFieldSet,
    settle_delay: Duration,
    initial_layout_delay: Duration,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn NotificationSink>,
    layout: Arc<dyn LayoutHook>,
    cache: RwLock<Option<Record>>,
    /// Set after a failed fetch has been toasted, cleared by the next success.
    load_failed: AtomicBool,
    pending_layout: Mutex<Option<JoinHandle<()>>>,
    summary: AutoSaveController,
    selector: WrapUpSelector,
}

impl PanelView {
    pub fn new(
        record_id: RecordId,
        variant: PanelVariant,
        config: &PanelConfig,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            store,
            remote,
            sink,
            layout,
        } = collaborators;
        let summary = AutoSaveController::new(
            record_id.clone(),
            TextField::Summary,
            config,
            store.clone(),
            sink.clone(),
        );
        let selector = WrapUpSelector::new(variant, remote, sink.clone());
        Self {
            policy: config.unset_policy.unwrap_or(variant.default_unset_policy),
            channel: config
                .channel
                .clone()
                .unwrap_or_else(|| variant.channel.to_string()),
            relevant: RelevantFieldSet::from(variant.relevant_fields()),
            settle_delay: config.settle_delay(),
            initial_layout_delay: config.initial_layout_delay(),
            record_id,
            variant,
            store,
            sink,
            layout,
            cache: RwLock::new(None),
            load_failed: AtomicBool::new(false),
            pending_layout: Mutex::new(None),
            summary,
            selector,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn variant(&self) -> PanelVariant {
        self.variant
    }

    /// Change-feed channel this panel listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn relevant_fields(&self) -> &RelevantFieldSet {
        &self.relevant
    }

    pub fn summary_editor(&self) -> &AutoSaveController {
        &self.summary
    }

    /// Load the record and schedule the first layout pass.
    pub async fn mount(&self) -> Result<(), StoreError> {
        info!(record_id = %self.record_id, kind = %self.variant.kind, "mounting panel");
        let loaded = self.refresh().await;
        self.schedule_layout(self.initial_layout_delay);
        loaded
    }

    /// Refetch the record into the cache. A failure leaves the previous cache
    /// in place and is shown to the operator once per outage: later failures
    /// are only logged until a fetch succeeds again.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let fields = self.variant.qualified_fields();
        match self.store.fetch(&self.record_id, &fields).await {
            Ok(record) => {
                debug!(
                    record_id = %self.record_id,
                    wrap_up_ids = ?self.wrap_up_ids(&record),
                    "record loaded"
                );
                *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
                if self.load_failed.swap(false, Ordering::AcqRel) {
                    info!(record_id = %self.record_id, "record data available again");
                }
                Ok(())
            }
            Err(err) => {
                if self.load_failed.swap(true, Ordering::AcqRel) {
                    debug!(record_id = %self.record_id, error = %err, "record still unavailable");
                } else {
                    error!(record_id = %self.record_id, error = %err, "failed to load record");
                    self.sink
                        .notify("Error", "Failed to load record data", Severity::Error);
                }
                Err(err)
            }
        }
    }

    pub fn is_relevant(&self, message: &Value) -> bool {
        is_relevant_message(message, &self.record_id, &self.relevant)
    }

    /// Feed one change message to the panel. Returns whether it triggered a
    /// refresh.
    pub async fn handle_change(&self, message: &Value) -> bool {
        if !self.is_relevant(message) {
            return false;
        }
        self.refresh_and_settle().await;
        true
    }

    /// Refresh, then recalculate layout once the new content has settled.
    pub async fn refresh_and_settle(&self) {
        info!(record_id = %self.record_id, "relevant change received, refreshing record");
        if let Err(err) = self.refresh().await {
            debug!(error = %err, "refresh after change failed");
        }
        self.schedule_layout(self.settle_delay);
    }

    /// Run the layout hook after `delay`, replacing any pass still pending.
    fn schedule_layout(&self, delay: Duration) {
        let layout = self.layout.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            layout.relayout();
        });
        let previous = self
            .pending_layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cached(&self) -> Option<Record> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn on_summary_input(&self, value: impl Into<String>) {
        self.summary.on_input(value);
    }

    pub async fn on_summary_blur(&self) -> Option<SaveOutcome> {
        self.summary.on_blur().await
    }

    pub async fn select_wrap_up(&self, slot: u8) -> SelectionOutcome {
        self.selector.select(self.cached(), slot).await
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let record = cache.as_ref();

        let wrap_ups = (1..=WRAP_UP_SLOTS)
            .filter_map(|slot| WrapUpFields::for_slot(slot).map(|f| (slot, f)))
            .map(|(slot, fields)| {
                let confidence = record.and_then(|r| r.confidence(&fields.confidence));
                WrapUpSuggestion {
                    slot,
                    name: record.map(|r| r.text(&fields.name)).unwrap_or_default().to_string(),
                    code_id: record.and_then(|r| r.non_empty(&fields.code_id)).map(str::to_string),
                    confidence,
                    color: color_for(confidence, self.policy),
                    style: style_for(confidence, self.policy),
                }
            })
            .collect();

        let sections = TextField::ALL
            .into_iter()
            .map(|field| {
                let persisted = record.map(|r| r.text(&field.text_field())).unwrap_or_default();
                let confidence = record.and_then(|r| r.confidence(&field.confidence_field()));
                let (text, editing) = if field == self.summary.field() {
                    let pending = self.summary.pending_value();
                    let editing = pending.is_some();
                    (pending.unwrap_or_else(|| persisted.to_string()), editing)
                } else {
                    (persisted.to_string(), false)
                };
                TextSection {
                    field,
                    text,
                    confidence,
                    color: color_for(confidence, self.policy),
                    style: style_for(confidence, self.policy),
                    editing,
                }
            })
            .collect();

        PanelSnapshot {
            record_id: self.record_id.clone(),
            kind: self.variant.kind,
            loaded: record.is_some(),
            wrap_ups,
            sections,
            box_class: self.selector.box_class(),
            processing: self.selector.is_processing(),
        }
    }

    /// Cancel the summary timer and any pending layout pass.
    pub fn dispose(&self) {
        self.summary.dispose();
        if let Some(handle) = self
            .pending_layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        info!(record_id = %self.record_id, "panel disposed");
    }

    fn wrap_up_ids<'a>(&self, record: &'a Record) -> Vec<Option<&'a str>> {
        (1..=WRAP_UP_SLOTS)
            .filter_map(WrapUpFields::for_slot)
            .map(|f| record.non_empty(&f.code_id))
            .collect()
    }
}

impl Drop for PanelView {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pending_layout
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
