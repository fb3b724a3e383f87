//! Panel runtime: the debounced auto-save state machine, refresh drivers, and
//! the view that composes them over a cached record.

pub mod autosave;
pub mod listener;
pub mod panel;
pub mod selector;

#[cfg(test)]
mod testing;

pub use autosave::{AutoSaveController, EditState, SaveOutcome};
pub use listener::{ChangeListener, PollingRefresher, RefreshDriver};
pub use panel::{Collaborators, PanelSnapshot, PanelView, TextSection, WrapUpSuggestion};
pub use selector::{SelectionOutcome, WrapUpSelector};
