//! Wrap-up code selection with a single in-flight guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use wrapup_core::variant::{AGENT_PARTICIPANT_ID_FIELD, COMMUNICATION_ID_FIELD};
use wrapup_core::{
    NotificationSink, PanelVariant, Record, RemoteAction, Severity, WrapUpFields, WrapUpRequest,
};

const BOX_CLASS: &str = "summary-box custom-summary-box wrap-up-box";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The update was accepted by the remote.
    Sent,
    Failed { message: String },
    /// The slot has no wrap-up code id to send.
    MissingCode,
    /// Another selection was still in flight.
    Ignored,
}

pub struct WrapUpSelector {
    variant: PanelVariant,
    remote: Arc<dyn RemoteAction>,
    sink: Arc<dyn NotificationSink>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WrapUpSelector {
    pub fn new(
        variant: PanelVariant,
        remote: Arc<dyn RemoteAction>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            variant,
            remote,
            sink,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// CSS class list for the wrap-up box, dimmed while a selection is sent.
    pub fn box_class(&self) -> String {
        if self.is_processing() {
            format!("{BOX_CLASS} processing")
        } else {
            BOX_CLASS.to_string()
        }
    }

    /// Build the update for `slot`, or `None` when the slot has no code id.
    pub fn request_for(&self, record: Option<&Record>, slot: u8) -> Option<WrapUpRequest> {
        let record = record?;
        let fields = WrapUpFields::for_slot(slot)?;
        let owned = |field: &str| record.non_empty(field).map(str::to_string);
        Some(WrapUpRequest {
            wrap_up_code_id: owned(&fields.code_id)?,
            interaction_id: owned(self.variant.interaction_id_field),
            participant_id: owned(AGENT_PARTICIPANT_ID_FIELD),
            communication_id: owned(COMMUNICATION_ID_FIELD),
        })
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Send the wrap-up code suggested in `slot` (1-based).
    pub async fn select(&self, record: Option<Record>, slot: u8) -> SelectionOutcome {
        if self.is_processing() {
            debug!(slot, "selection ignored, another update is in flight");
            return SelectionOutcome::Ignored;
        }

        let Some(request) = self.request_for(record.as_ref(), slot) else {
            error!(slot, "no wrap-up code id for slot");
            self.sink
                .notify("Error", "No wrap-up code ID available", Severity::Error);
            return SelectionOutcome::MissingCode;
        };

        let Some(_guard) = self.try_begin() else {
            debug!(slot, "selection ignored, another update is in flight");
            return SelectionOutcome::Ignored;
        };

        info!(slot, wrap_up_code_id = %request.wrap_up_code_id, "sending wrap-up code update");
        match self.remote.update_wrap_up_code(&request).await {
            Ok(()) => {
                info!(wrap_up_code_id = %request.wrap_up_code_id, "wrap-up code update sent");
                self.sink
                    .notify("Success", "Wrap-up code update sent", Severity::Success);
                SelectionOutcome::Sent
            }
            Err(err) => {
                error!(error = %err, "wrap-up code update failed");
                let message = err
                    .user_message()
                    .unwrap_or("Error updating wrap-up code")
                    .to_string();
                self.sink.notify("Error", &message, Severity::Error);
                SelectionOutcome::Failed { message }
            }
        }
    }
}
