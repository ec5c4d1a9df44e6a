//! Scroll-depth milestone detection

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Raw scroll position reported by the host, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMeasurement {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMeasurement {
    /// Percentage of the scrollable distance covered, rounded and clamped to 0..=100.
    ///
    /// Documents that do not scroll and non-finite readings are rejected.
    pub fn depth_percent(&self) -> Result<u8, TelemetryError> {
        let values = [self.scroll_top, self.scroll_height, self.viewport_height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TelemetryError::InvalidSignal(format!(
                "non-finite scroll measurement {:?}",
                self
            )));
        }

        let scrollable = self.scroll_height - self.viewport_height;
        if scrollable <= 0.0 {
            return Err(TelemetryError::InvalidSignal(format!(
                "document not scrollable (scroll_height {} <= viewport_height {})",
                self.scroll_height, self.viewport_height
            )));
        }

        let percent = (self.scroll_top / scrollable * 100.0).round();
        Ok(percent.clamp(0.0, 100.0) as u8)
    }
}

/// Tracks scroll depth per page and which milestones each page has passed.
///
/// Milestones compare against the page's high-water mark rather than the
/// previous reading, so each fires at most once per page for the session:
/// scrolling back up and down again, or leaving and returning to a page, never
/// re-fires one. The session-wide maximum is kept separately.
#[derive(Debug, Clone)]
pub struct ScrollDepthTracker {
    milestones: Vec<u8>,
    page_max: HashMap<String, u8>,
    max_depth: u8,
}

impl ScrollDepthTracker {
    pub fn new(milestones: &[u8]) -> Self {
        let mut milestones = milestones.to_vec();
        milestones.sort_unstable();
        milestones.dedup();
        Self {
            milestones,
            page_max: HashMap::new(),
            max_depth: 0,
        }
    }

    /// Record a depth reading on `page` and return the milestones it newly
    /// crossed there, ascending
    pub fn observe(&mut self, page: &str, depth: u8) -> Vec<u8> {
        let previous = self.page_max.get(page).copied().unwrap_or(0);
        let crossed = self
            .milestones
            .iter()
            .copied()
            .filter(|&m| depth >= m && previous < m)
            .collect();
        if depth > previous {
            self.page_max.insert(page.to_string(), depth);
        }
        self.max_depth = self.max_depth.max(depth);
        crossed
    }

    /// Deepest depth seen on `page`
    pub fn page_depth(&self, page: &str) -> u8 {
        self.page_max.get(page).copied().unwrap_or(0)
    }

    /// Deepest depth seen this session, across pages
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }
}
