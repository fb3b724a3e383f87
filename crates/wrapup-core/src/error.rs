use std::path::PathBuf;

use thiserror::Error;

use crate::record::RecordId;

/// Failure reported by a record store, remote action, or change feed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("remote rejected the request{}", describe_rejection(.status, .message))]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Message safe to show an operator, when the remote supplied one.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref().filter(|m| !m.is_empty()),
            _ => None,
        }
    }
}

fn describe_rejection(status: &Option<u16>, message: &Option<String>) -> String {
    let status = status.map(|s| format!(" ({s})")).unwrap_or_default();
    let message = message.as_deref().unwrap_or("no message");
    format!("{status}: {message}")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
