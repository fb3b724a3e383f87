//! Refresh drivers: the push-based change listener and the polling fallback.
//!
//! Both own a background task and abort it on `dispose()` or drop, so a
//! torn-down panel never keeps a subscription or interval alive.

use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use wrapup_core::{ChangeFeed, PanelConfig, RefreshMode, StoreError};

use crate::panel::PanelView;

/// Subscription to a change feed that refreshes a panel on relevant events.
pub struct ChangeListener {
    channel: String,
    task: JoinHandle<()>,
}

impl ChangeListener {
    /// Subscribe to the panel's channel and start dispatching messages.
    ///
    /// Messages already queued behind a relevant one are drained first, so a
    /// burst of notifications costs a single refetch.
    pub async fn spawn(view: Arc<PanelView>, feed: &dyn ChangeFeed) -> Result<Self, StoreError> {
        let channel = view.channel().to_string();
        let mut stream = feed.subscribe(&channel).await?;
        info!(channel = %channel, record_id = %view.record_id(), "subscribed to change feed");

        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let mut relevant = view.is_relevant(&message);
                let mut coalesced = 0usize;
                while let Some(Some(next)) = stream.next().now_or_never() {
                    relevant |= view.is_relevant(&next);
                    coalesced += 1;
                }
                if coalesced > 0 {
                    debug!(coalesced, "drained queued change messages");
                }
                if relevant {
                    view.refresh_and_settle().await;
                }
            }
            warn!("change feed closed");
        });

        Ok(Self { channel, task })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Unsubscribe. Dropping the listener has the same effect.
    pub fn dispose(&self) {
        if !self.task.is_finished() {
            info!(channel = %self.channel, "unsubscribing from change feed");
        }
        self.task.abort();
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Degraded-mode refresher for hosts without a push channel.
pub struct PollingRefresher {
    task: JoinHandle<()>,
}

impl PollingRefresher {
    pub fn spawn(view: Arc<PanelView>, interval: Duration) -> Self {
        info!(
            record_id = %view.record_id(),
            interval_ms = interval.as_millis() as u64,
            "no push channel, polling for changes"
        );
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the panel was just loaded.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                view.refresh_and_settle().await;
            }
        });
        Self { task }
    }

    pub fn dispose(&self) {
        self.task.abort();
    }
}

impl Drop for PollingRefresher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Whichever refresh driver the configuration selected.
pub enum RefreshDriver {
    Push(ChangeListener),
    Poll(PollingRefresher),
}

impl RefreshDriver {
    pub async fn start(
        view: Arc<PanelView>,
        feed: &dyn ChangeFeed,
        config: &PanelConfig,
    ) -> Result<Self, StoreError> {
        match config.refresh {
            RefreshMode::Push => Ok(Self::Push(ChangeListener::spawn(view, feed).await?)),
            RefreshMode::Poll { interval_ms } => Ok(Self::Poll(PollingRefresher::spawn(
                view,
                Duration::from_millis(interval_ms),
            ))),
        }
    }

    pub fn dispose(&self) {
        match self {
            Self::Push(listener) => listener.dispose(),
            Self::Poll(poller) => poller.dispose(),
        }
    }
}
