//! Debounced, focus-aware auto-save for one editable text field.
//!
//! Each controller owns exactly one edit session:
//!
//! ```text
//!   Clean --input--> Editing --timer / blur--> Saving --done--> Clean
//!                     ^   |                      |
//!                     +---+ input (restart)      +--input--> Editing
//! ```
//!
//! Every keystroke replaces the pending debounce timer, so at most one timer
//! is alive per session. While Editing or Saving the local value is what the
//! panel shows, which keeps a concurrent record refresh from clobbering it.
//! A failed save discards the edit unless a [`RetryPolicy`] allows retries.
//! A save that starts while an earlier one is still in flight waits for it,
//! so the store always ends with the newest value.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use wrapup_core::{
    FieldValues, NotificationSink, PanelConfig, RecordId, RecordStore, RetryPolicy, Severity,
    StoreError, TextField,
};

/// Externally visible phase of the edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Clean,
    Editing,
    Saving,
}

/// Result of one save attempt, always reported to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed { message: String },
}

/// Handle to one field's edit session. Cloning shares the session.
#[derive(Clone)]
pub struct AutoSaveController {
    shared: Arc<Shared>,
}

struct Shared {
    record_id: RecordId,
    field: TextField,
    debounce: Duration,
    retry: RetryPolicy,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn NotificationSink>,
    session: Mutex<Session>,
    /// Held across each persist so saves reach the store one at a time, in
    /// the order they began.
    persist_lane: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Session {
    phase: Phase,
    next_ticket: u64,
    disposed: bool,
}

#[derive(Default)]
enum Phase {
    #[default]
    Clean,
    Editing {
        value: String,
        timer: PendingTimer,
    },
    Saving {
        value: String,
        ticket: u64,
    },
}

struct PendingTimer {
    ticket: u64,
    handle: JoinHandle<()>,
}

enum Trigger {
    /// The debounce timer with this ticket expired.
    Timer(u64),
    /// Blur or an explicit save request.
    Explicit,
}

impl Session {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn is_saving(&self, ticket: u64) -> bool {
        matches!(self.phase, Phase::Saving { ticket: t, .. } if t == ticket)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Phase::Editing { timer, .. } = &session.phase {
            timer.handle.abort();
        }
    }
}

impl AutoSaveController {
    pub fn new(
        record_id: RecordId,
        field: TextField,
        config: &PanelConfig,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                record_id,
                field,
                debounce: config.debounce(),
                retry: config.retry,
                store,
                sink,
                session: Mutex::new(Session::default()),
                persist_lane: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn field(&self) -> TextField {
        self.shared.field
    }

    pub fn state(&self) -> EditState {
        match self.shared.lock().phase {
            Phase::Clean => EditState::Clean,
            Phase::Editing { .. } => EditState::Editing,
            Phase::Saving { .. } => EditState::Saving,
        }
    }

    /// The unsaved local value, if any.
    pub fn pending_value(&self) -> Option<String> {
        match &self.shared.lock().phase {
            Phase::Editing { value, .. } | Phase::Saving { value, .. } => Some(value.clone()),
            Phase::Clean => None,
        }
    }

    /// What the panel should show: the local edit while one is pending,
    /// otherwise the persisted value.
    pub fn display_value(&self, persisted: &str) -> String {
        self.pending_value()
            .unwrap_or_else(|| persisted.to_string())
    }

    /// Record a keystroke and restart the debounce timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_input(&self, value: impl Into<String>) {
        let value = value.into();
        let mut session = self.shared.lock();
        if session.disposed {
            debug!(field = ?self.shared.field, "input after dispose ignored");
            return;
        }

        let ticket = session.ticket();
        let timer = PendingTimer {
            ticket,
            handle: self.spawn_timer(ticket),
        };
        match std::mem::replace(&mut session.phase, Phase::Editing { value, timer }) {
            Phase::Editing { timer, .. } => timer.handle.abort(),
            Phase::Saving { .. } => {
                debug!(field = ?self.shared.field, "new edit started while a save is in flight")
            }
            Phase::Clean => debug!(
                record_id = %self.shared.record_id,
                field = ?self.shared.field,
                "edit session started"
            ),
        }
    }

    /// Focus left the field: save right away if there is an unsaved edit.
    pub async fn on_blur(&self) -> Option<SaveOutcome> {
        self.save().await
    }

    /// Save the pending edit now, cancelling the debounce timer.
    ///
    /// Returns `None` when there is nothing to save, so racing a blur against
    /// the timer never persists twice.
    pub async fn save(&self) -> Option<SaveOutcome> {
        self.save_with(Trigger::Explicit).await
    }

    /// Cancel the timer and drop any unsaved edit. An in-flight persist is
    /// left to complete. Further input is ignored.
    pub fn dispose(&self) {
        let mut session = self.shared.lock();
        session.disposed = true;
        match std::mem::take(&mut session.phase) {
            Phase::Editing { value, timer } => {
                timer.handle.abort();
                warn!(
                    record_id = %self.shared.record_id,
                    field = ?self.shared.field,
                    chars = value.chars().count(),
                    "discarding unsaved edit on dispose"
                );
            }
            saving @ Phase::Saving { .. } => session.phase = saving,
            Phase::Clean => {}
        }
    }

    fn spawn_timer(&self, ticket: u64) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let delay = self.shared.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                AutoSaveController { shared }
                    .save_with(Trigger::Timer(ticket))
                    .await;
            }
        })
    }

    async fn save_with(&self, trigger: Trigger) -> Option<SaveOutcome> {
        let (value, ticket) = self.begin_save(trigger)?;
        let _lane = self.shared.persist_lane.lock().await;
        info!(
            record_id = %self.shared.record_id,
            field = ?self.shared.field,
            chars = value.chars().count(),
            "saving edit"
        );
        let result = self.persist(value, ticket).await;
        self.finish(ticket);
        Some(self.report(result))
    }

    /// Editing -> Saving. The timer is aborted unless it is the one firing.
    fn begin_save(&self, trigger: Trigger) -> Option<(String, u64)> {
        let mut session = self.shared.lock();
        let (value, timer) = match std::mem::take(&mut session.phase) {
            Phase::Editing { value, timer } => (value, timer),
            other => {
                session.phase = other;
                return None;
            }
        };
        match trigger {
            Trigger::Timer(ticket) if ticket != timer.ticket => {
                // Superseded by a later keystroke.
                session.phase = Phase::Editing { value, timer };
                return None;
            }
            Trigger::Timer(_) => {}
            Trigger::Explicit => timer.handle.abort(),
        }
        let ticket = session.ticket();
        session.phase = Phase::Saving {
            value: value.clone(),
            ticket,
        };
        Some((value, ticket))
    }

    async fn persist(&self, value: String, ticket: u64) -> Result<(), StoreError> {
        let shared = &self.shared;
        let mut fields = FieldValues::new();
        fields.insert(shared.field.text_field(), Value::String(value));

        let mut attempt = 0;
        loop {
            let err = match shared.store.persist(&shared.record_id, &fields).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if attempt >= shared.retry.max_retries || !shared.lock().is_saving(ticket) {
                return Err(err);
            }
            let backoff = shared.retry.backoff(attempt);
            warn!(
                record_id = %shared.record_id,
                error = %err,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                "save failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            if !shared.lock().is_saving(ticket) {
                debug!("retry superseded by a newer edit");
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Saving -> Clean, unless new input already opened another session.
    fn finish(&self, ticket: u64) {
        let mut session = self.shared.lock();
        if session.is_saving(ticket) {
            session.phase = Phase::Clean;
        }
    }

    fn report(&self, result: Result<(), StoreError>) -> SaveOutcome {
        let label = self.shared.field.label();
        match result {
            Ok(()) => {
                info!(record_id = %self.shared.record_id, field = ?self.shared.field, "edit saved");
                self.shared
                    .sink
                    .notify("Success", &format!("{label} update sent"), Severity::Success);
                SaveOutcome::Saved
            }
            Err(err) => {
                error!(
                    record_id = %self.shared.record_id,
                    field = ?self.shared.field,
                    error = %err,
                    "failed to save edit, discarding it"
                );
                let message = err
                    .user_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Failed to save {}", label.to_lowercase()));
                self.shared.sink.notify("Error", &message, Severity::Error);
                SaveOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, RECORD_ID, RecordingSink, voice_call_record};

    const SUMMARY: &str = "GC_Copilot_summary_text__c";

    fn controller(store: Arc<FakeStore>, sink: Arc<RecordingSink>) -> AutoSaveController {
        controller_with(store, sink, PanelConfig::default())
    }

    fn controller_with(
        store: Arc<FakeStore>,
        sink: Arc<RecordingSink>,
        config: PanelConfig,
    ) -> AutoSaveController {
        AutoSaveController::new(
            RecordId::new(RECORD_ID),
            TextField::Summary,
            &config,
            store,
            sink,
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_saves_only_the_last_value() {
        let store = FakeStore::with_record(voice_call_record());
        let sink = RecordingSink::new();
        let c = controller(store.clone(), sink.clone());

        c.on_input("A");
        tokio::time::sleep(ms(1000)).await;
        c.on_input("AB");
        tokio::time::sleep(ms(1500)).await;
        assert!(store.persisted_values(SUMMARY).is_empty());
        assert_eq!(c.state(), EditState::Editing);

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(store.persisted_values(SUMMARY), vec!["AB"]);
        assert_eq!(c.state(), EditState::Clean);
        assert_eq!(
            sink.messages(),
            vec![(Severity::Success, "Summary update sent".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blur_saves_immediately_and_cancels_timer() {
        let store = FakeStore::with_record(voice_call_record());
        let c = controller(store.clone(), RecordingSink::new());

        c.on_input("hello");
        tokio::time::sleep(ms(500)).await;
        assert_eq!(c.on_blur().await, Some(SaveOutcome::Saved));
        assert_eq!(store.persisted_values(SUMMARY), vec!["hello"]);

        tokio::time::sleep(ms(5000)).await;
        assert_eq!(store.persisted_values(SUMMARY), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn blur_without_edit_is_a_no_op() {
        let store = FakeStore::with_record(voice_call_record());
        let sink = RecordingSink::new();
        let c = controller(store.clone(), sink.clone());

        assert_eq!(c.on_blur().await, None);
        assert_eq!(c.save().await, None);
        assert!(store.persisted_values(SUMMARY).is_empty());
        assert!(sink.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_discards_edit_and_next_input_starts_fresh() {
        let store = FakeStore::with_record(voice_call_record());
        let sink = RecordingSink::new();
        let c = controller(store.clone(), sink.clone());
        store.fail_next_persist(StoreError::Transport("connection reset".into()));

        c.on_input("lost");
        tokio::time::sleep(ms(2100)).await;
        assert_eq!(c.state(), EditState::Clean);
        assert_eq!(c.pending_value(), None);
        assert_eq!(
            sink.messages(),
            vec![(Severity::Error, "Failed to save summary".to_string())]
        );

        c.on_input("kept");
        tokio::time::sleep(ms(2100)).await;
        assert_eq!(store.persisted_values(SUMMARY), vec!["lost", "kept"]);
        assert_eq!(c.state(), EditState::Clean);
        assert_eq!(sink.messages().last().unwrap().0, Severity::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_message_is_surfaced_on_failure() {
        let store = FakeStore::with_record(voice_call_record());
        let c = controller(store.clone(), RecordingSink::new());
        store.fail_next_persist(StoreError::Rejected {
            status: Some(400),
            message: Some("Field is read-only".into()),
        });

        c.on_input("x");
        assert_eq!(
            c.save().await,
            Some(SaveOutcome::Failed {
                message: "Field is read-only".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn local_edit_wins_over_persisted_value() {
        let store = FakeStore::with_record(voice_call_record());
        let c = controller(store.clone(), RecordingSink::new());

        assert_eq!(c.display_value("from server"), "from server");
        c.on_input("draft");
        assert_eq!(c.display_value("refreshed from server"), "draft");
        tokio::time::sleep(ms(2100)).await;
        assert_eq!(c.display_value("after save"), "after save");
    }

    #[tokio::test(start_paused = true)]
    async fn input_during_save_opens_a_new_session() {
        let store = FakeStore::with_record(voice_call_record());
        let gate = store.gate_persists();
        let c = controller(store.clone(), RecordingSink::new());

        c.on_input("first");
        let saver = {
            let c = c.clone();
            tokio::spawn(async move { c.on_blur().await })
        };
        tokio::time::sleep(ms(1)).await;
        assert_eq!(c.state(), EditState::Saving);
        assert_eq!(c.display_value("server"), "first");

        c.on_input("second");
        assert_eq!(c.state(), EditState::Editing);
        gate.notify_one();
        assert_eq!(saver.await.unwrap(), Some(SaveOutcome::Saved));
        assert_eq!(c.state(), EditState::Editing);
        assert_eq!(c.display_value("server"), "second");

        gate.notify_one();
        tokio::time::sleep(ms(2100)).await;
        assert_eq!(store.persisted_values(SUMMARY), vec!["first", "second"]);
        assert_eq!(c.state(), EditState::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn second_save_waits_for_the_first_persist() {
        let store = FakeStore::with_record(voice_call_record());
        let gate = store.gate_persists();
        let c = controller(store.clone(), RecordingSink::new());

        c.on_input("first");
        let first = {
            let c = c.clone();
            tokio::spawn(async move { c.on_blur().await })
        };
        tokio::time::sleep(ms(1)).await;
        c.on_input("second");
        let second = {
            let c = c.clone();
            tokio::spawn(async move { c.on_blur().await })
        };
        tokio::time::sleep(ms(1)).await;
        assert_eq!(c.state(), EditState::Saving);
        assert_eq!(c.display_value("server"), "second");

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Some(SaveOutcome::Saved));
        assert_eq!(store.persisted_values(SUMMARY), vec!["first"]);
        assert_eq!(c.state(), EditState::Saving);

        gate.notify_one();
        assert_eq!(second.await.unwrap(), Some(SaveOutcome::Saved));
        assert_eq!(store.persisted_values(SUMMARY), vec!["first", "second"]);
        assert_eq!(
            store
                .fetch(&RecordId::new(RECORD_ID), &[])
                .await
                .unwrap()
                .text(SUMMARY),
            "second"
        );
        assert_eq!(c.state(), EditState::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_abandoned_when_a_newer_edit_takes_over() {
        let store = FakeStore::with_record(voice_call_record());
        let sink = RecordingSink::new();
        let config = PanelConfig {
            retry: RetryPolicy {
                max_retries: 3,
                initial_backoff_ms: 500,
            },
            ..PanelConfig::default()
        };
        let c = controller_with(store.clone(), sink.clone(), config);
        store.fail_next_persist(StoreError::Transport("timeout".into()));

        c.on_input("stale");
        let saver = {
            let c = c.clone();
            tokio::spawn(async move { c.on_blur().await })
        };
        tokio::time::sleep(ms(100)).await;
        assert_eq!(store.persisted_values(SUMMARY), vec!["stale"]);

        c.on_input("fresh");
        assert_eq!(
            saver.await.unwrap(),
            Some(SaveOutcome::Failed {
                message: "Failed to save summary".into()
            })
        );
        assert_eq!(store.persisted_values(SUMMARY), vec!["stale"]);
        assert_eq!(c.state(), EditState::Editing);

        assert_eq!(c.on_blur().await, Some(SaveOutcome::Saved));
        assert_eq!(store.persisted_values(SUMMARY), vec!["stale", "fresh"]);
        assert_eq!(sink.messages().last().unwrap().0, Severity::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_policy_retries_with_backoff() {
        let store = FakeStore::with_record(voice_call_record());
        let config = PanelConfig {
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff_ms: 100,
            },
            ..PanelConfig::default()
        };
        let c = controller_with(store.clone(), RecordingSink::new(), config);
        store.fail_next_persist(StoreError::Transport("timeout".into()));
        store.fail_next_persist(StoreError::Transport("timeout".into()));

        c.on_input("durable");
        assert_eq!(c.save().await, Some(SaveOutcome::Saved));
        assert_eq!(
            store.persisted_values(SUMMARY),
            vec!["durable", "durable", "durable"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_timer() {
        let store = FakeStore::with_record(voice_call_record());
        let c = controller(store.clone(), RecordingSink::new());

        c.on_input("never saved");
        c.dispose();
        tokio::time::sleep(ms(3000)).await;
        assert!(store.persisted_values(SUMMARY).is_empty());
        assert_eq!(c.state(), EditState::Clean);

        c.on_input("ignored");
        assert_eq!(c.state(), EditState::Clean);
    }
}
