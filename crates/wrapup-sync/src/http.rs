//! HTTP client for the record backend: field fetch/patch, the wrap-up action,
//! and a polled change feed.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use wrapup_core::{
    ChangeFeed, ChangeStream, FieldValues, Record, RecordId, RecordStore, RemoteAction,
    StoreError, WrapUpRequest,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Map onto the collaborator error, turning a 404 for a known record into
    /// [`StoreError::NotFound`].
    pub fn into_store_error(self, record_id: Option<&RecordId>) -> StoreError {
        match (self, record_id) {
            (SyncError::Server { status: 404, .. }, Some(id)) => StoreError::NotFound(id.clone()),
            (SyncError::Server { status, body }, _) => StoreError::Rejected {
                status: Some(status),
                message: server_message(&body),
            },
            (SyncError::Http(err), _) => StoreError::Transport(err.to_string()),
            (SyncError::Json(err), _) => StoreError::Malformed(err.to_string()),
        }
    }
}

impl From<SyncError> for StoreError {
    fn from(err: SyncError) -> Self {
        err.into_store_error(None)
    }
}

/// Operator-facing message from an error body, either `{"message": ".."}` or
/// the list form `[{"message": "..", "errorCode": ".."}]`.
pub fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = match &value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    error
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Decode a record body: a flat field object, or one nested under `fields`.
pub fn parse_record(record_id: &RecordId, body: &str) -> Result<Record, SyncError> {
    let mut fields: FieldValues = serde_json::from_str(body)?;
    if let Some(Value::Object(nested)) = fields.remove("fields") {
        fields = nested;
    }
    Ok(Record::new(record_id.clone(), fields))
}

/// HTTP client for the record backend's REST endpoints.
#[derive(Clone)]
pub struct RecordClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl RecordClient {
    /// Create a client for the given backend base URL.
    ///
    /// `base_url` should be like `http://localhost:4000` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often the change feed polls the backend.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn record_url(&self, record_id: &RecordId) -> String {
        format!("{}/api/records/{}", self.base_url, record_id)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Fetch the named fields of one record.
    pub async fn get_record(
        &self,
        record_id: &RecordId,
        fields: &[String],
    ) -> Result<Record, SyncError> {
        let url = self.record_url(record_id);
        info!(url = %url, fields = fields.len(), "fetching record");
        let resp = self
            .client
            .get(&url)
            .query(&[("fields", fields.join(","))])
            .send()
            .await?;
        let body = Self::check(resp).await?.text().await?;
        parse_record(record_id, &body)
    }

    /// Write field values to one record.
    pub async fn patch_record(
        &self,
        record_id: &RecordId,
        fields: &FieldValues,
    ) -> Result<(), SyncError> {
        let url = self.record_url(record_id);
        info!(url = %url, fields = fields.len(), "patching record");
        let resp = self.client.patch(&url).json(fields).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Ask the backend to apply a wrap-up code to the interaction.
    pub async fn post_wrap_up(&self, request: &WrapUpRequest) -> Result<(), SyncError> {
        let url = format!("{}/api/wrap-up", self.base_url);
        info!(url = %url, wrap_up_code_id = %request.wrap_up_code_id, "posting wrap-up code");
        let resp = self.client.post(&url).json(request).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Pull change messages published on `channel`.
    ///
    /// If `since` is provided, only messages committed after that timestamp
    /// are returned.
    pub async fn pull_changes(
        &self,
        channel: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/api/changes", self.base_url);
        let mut query = vec![("channel", channel.to_string())];
        if let Some(ts) = since {
            query.push(("since", ts.to_rfc3339()));
        }
        let resp = self.client.get(&url).query(&query).send().await?;
        let body = Self::check(resp).await?.text().await?;
        let messages: Vec<Value> = serde_json::from_str(&body)?;
        if !messages.is_empty() {
            debug!(channel, count = messages.len(), "pulled change messages");
        }
        Ok(messages)
    }

    /// An endless stream of messages on `channel`, starting from now.
    fn change_stream(self, channel: String) -> ChangeStream {
        poll_stream(PollState {
            cursor: Some(Utc::now()),
            buffered: VecDeque::new(),
            client: self,
            channel,
        })
    }
}

struct PollState {
    client: RecordClient,
    channel: String,
    cursor: Option<DateTime<Utc>>,
    buffered: VecDeque<Value>,
}

impl PollState {
    /// Take in one poll's result. The cursor only moves past a successful
    /// poll, so a failed one is retried from the same point.
    fn absorb(&mut self, polled_at: DateTime<Utc>, result: Result<Vec<Value>, SyncError>) {
        match result {
            Ok(messages) => {
                self.cursor = Some(polled_at);
                self.buffered.extend(messages);
            }
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "change poll failed");
            }
        }
    }
}

/// Drain buffered messages in order, polling the backend only once the
/// buffer is empty.
fn poll_stream(state: PollState) -> ChangeStream {
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(message) = state.buffered.pop_front() {
                return Some((message, state));
            }
            tokio::time::sleep(state.client.poll_interval).await;
            let polled_at = Utc::now();
            let result = state.client.pull_changes(&state.channel, state.cursor).await;
            state.absorb(polled_at, result);
        }
    })
    .boxed()
}

#[async_trait]
impl RecordStore for RecordClient {
    async fn fetch(&self, record_id: &RecordId, fields: &[String]) -> Result<Record, StoreError> {
        self.get_record(record_id, fields)
            .await
            .map_err(|e| e.into_store_error(Some(record_id)))
    }

    async fn persist(&self, record_id: &RecordId, fields: &FieldValues) -> Result<(), StoreError> {
        self.patch_record(record_id, fields)
            .await
            .map_err(|e| e.into_store_error(Some(record_id)))
    }
}

#[async_trait]
impl RemoteAction for RecordClient {
    async fn update_wrap_up_code(&self, request: &WrapUpRequest) -> Result<(), StoreError> {
        Ok(self.post_wrap_up(request).await?)
    }
}

#[async_trait]
impl ChangeFeed for RecordClient {
    async fn subscribe(&self, channel: &str) -> Result<ChangeStream, StoreError> {
        info!(channel, interval_ms = self.poll_interval.as_millis() as u64, "polling change feed");
        Ok(self.clone().change_stream(channel.to_string()))
    }
}
