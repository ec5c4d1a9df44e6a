//! Collector configuration
//!
//! Every tunable of the engine, loadable from JSON. Missing fields fall back to
//! the defaults the portal ships with.

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Default storage key of the bounded snapshot
pub const DEFAULT_SNAPSHOT_KEY: &str = "portal_analytics";

/// Default storage key of the heatmap batch log
pub const DEFAULT_HEATMAP_KEY: &str = "portal_heatmap";

/// Default scroll-depth milestones, in percent
pub const DEFAULT_SCROLL_MILESTONES: [u8; 5] = [25, 50, 75, 90, 100];

/// Retention caps applied to persisted views (never to in-memory logs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Most recent generic events kept in the snapshot
    pub max_events: usize,
    /// Most recent journey steps kept in the snapshot
    pub max_journey_steps: usize,
    /// Most recent click records kept in the snapshot
    pub max_click_events: usize,
    /// Most recent points kept per heatmap batch
    pub max_heatmap_points: usize,
    /// Most recent batches kept in the heatmap log
    pub max_heatmap_batches: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events: 100,
            max_journey_steps: 50,
            max_click_events: 200,
            max_heatmap_points: 1000,
            max_heatmap_batches: 10,
        }
    }
}

/// Collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub snapshot_key: String,
    pub heatmap_key: String,
    pub retention: RetentionPolicy,
    /// Record every n-th pointer move as a heatmap point
    pub mousemove_sample_rate: u32,
    pub scroll_milestones: Vec<u8>,
    /// Characters of element text kept on click records
    pub click_text_max_chars: usize,
    /// Persist the heatmap log on every n-th click; 1 writes on each click
    pub heatmap_flush_every: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            heatmap_key: DEFAULT_HEATMAP_KEY.to_string(),
            retention: RetentionPolicy::default(),
            mousemove_sample_rate: 10,
            scroll_milestones: DEFAULT_SCROLL_MILESTONES.to_vec(),
            click_text_max_chars: 50,
            heatmap_flush_every: 1,
        }
    }
}

impl CollectorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_keys(
        mut self,
        snapshot_key: impl Into<String>,
        heatmap_key: impl Into<String>,
    ) -> Self {
        self.snapshot_key = snapshot_key.into();
        self.heatmap_key = heatmap_key.into();
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_mousemove_sample_rate(mut self, rate: u32) -> Self {
        self.mousemove_sample_rate = rate;
        self
    }

    pub fn with_scroll_milestones(mut self, milestones: Vec<u8>) -> Self {
        self.scroll_milestones = milestones;
        self
    }

    pub fn with_heatmap_flush_every(mut self, clicks: u32) -> Self {
        self.heatmap_flush_every = clicks;
        self
    }

    /// Reject settings the collector cannot honor
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.snapshot_key.is_empty() || self.heatmap_key.is_empty() {
            return Err(TelemetryError::Config("storage keys must not be empty".to_string()));
        }
        if self.snapshot_key == self.heatmap_key {
            return Err(TelemetryError::Config(
                "snapshot and heatmap keys must differ".to_string(),
            ));
        }
        if self.mousemove_sample_rate == 0 {
            return Err(TelemetryError::Config(
                "mousemove_sample_rate must be at least 1".to_string(),
            ));
        }
        if self.heatmap_flush_every == 0 {
            return Err(TelemetryError::Config(
                "heatmap_flush_every must be at least 1".to_string(),
            ));
        }
        if let Some(bad) = self
            .scroll_milestones
            .iter()
            .find(|&&m| m == 0 || m > 100)
        {
            return Err(TelemetryError::Config(format!(
                "scroll milestone {} outside 1..=100",
                bad
            )));
        }

        let r = &self.retention;
        let caps = [
            ("max_events", r.max_events),
            ("max_journey_steps", r.max_journey_steps),
            ("max_click_events", r.max_click_events),
            ("max_heatmap_points", r.max_heatmap_points),
            ("max_heatmap_batches", r.max_heatmap_batches),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, cap)| *cap == 0) {
            return Err(TelemetryError::Config(format!("{} must be at least 1", name)));
        }

        Ok(())
    }
}
