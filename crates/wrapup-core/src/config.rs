//! Panel runtime configuration.
//!
//! Loaded from an optional JSON file; every key has a default so an empty
//! object (or no file at all) yields the behaviour the panels ship with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::confidence::UnsetPolicy;
use crate::error::ConfigError;
use crate::layout::DEFAULT_SCROLL_TOLERANCE_PX;

/// How a panel learns that its record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshMode {
    /// Subscribe to the change feed and filter events.
    #[default]
    Push,
    /// Degraded mode: refetch on a fixed interval.
    Poll { interval_ms: u64 },
}

/// Retry behaviour for failed auto-saves.
///
/// The default makes no retries: a failed save discards the edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Quiet period after the last keystroke before an edit is saved.
    pub debounce_ms: u64,
    /// Delay between a change-driven refresh and the layout recalculation.
    pub settle_delay_ms: u64,
    /// Delay between mount and the first layout recalculation.
    pub initial_layout_delay_ms: u64,
    pub scroll_tolerance_px: f64,
    /// Overrides the panel variant's own policy when set.
    pub unset_policy: Option<UnsetPolicy>,
    pub refresh: RefreshMode,
    /// Overrides the panel variant's change channel when set.
    pub channel: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            settle_delay_ms: 200,
            initial_layout_delay_ms: 100,
            scroll_tolerance_px: DEFAULT_SCROLL_TOLERANCE_PX,
            unset_policy: None,
            refresh: RefreshMode::Push,
            channel: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl PanelConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded panel config");
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be positive".into()));
        }
        if let RefreshMode::Poll { interval_ms: 0 } = self.refresh {
            return Err(ConfigError::Invalid(
                "poll interval_ms must be positive".into(),
            ));
        }
        if !self.scroll_tolerance_px.is_finite() || self.scroll_tolerance_px < 0.0 {
            return Err(ConfigError::Invalid(
                "scroll_tolerance_px must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn initial_layout_delay(&self) -> Duration {
        Duration::from_millis(self.initial_layout_delay_ms)
    }
}
