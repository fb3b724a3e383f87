//! Sync layer: HTTP implementations of the panel collaborators.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{RecordClient, SyncError};
