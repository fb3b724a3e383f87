//! Core of the copilot wrap-up panels: confidence colors, change filtering,
//! record and variant schemas, configuration, and collaborator traits.

pub mod change;
pub mod confidence;
pub mod config;
mod error;
pub mod layout;
pub mod ports;
pub mod record;
pub mod variant;

pub use change::{ChangeNotification, RelevantFieldSet, is_relevant, is_relevant_message};
pub use confidence::{Rgb, UnsetPolicy, color_for, style_for};
pub use config::{PanelConfig, RefreshMode, RetryPolicy};
pub use error::{ConfigError, StoreError};
pub use ports::{
    ChangeFeed, ChangeStream, LayoutHook, NoLayout, NotificationSink, RecordStore, RemoteAction,
    Severity, WrapUpRequest,
};
pub use record::{FieldValues, Record, RecordId};
pub use variant::{PanelKind, PanelVariant, TextField, WrapUpFields};
