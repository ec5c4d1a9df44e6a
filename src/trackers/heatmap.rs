//! Heatmap sampling
//!
//! Clicks are always recorded. Pointer moves go through a modulo counter and
//! only every n-th one becomes a point. The counter runs on event count, not on
//! wall-clock time, so point density follows the host's pointer-event rate:
//! a device that reports moves twice as often yields twice the points for the
//! same gesture.

use chrono::{DateTime, Utc};

use crate::types::{HeatmapPoint, HeatmapPointKind};

#[derive(Debug, Clone)]
pub struct HeatmapSampler {
    points: Vec<HeatmapPoint>,
    sample_rate: u32,
    move_count: u64,
}

impl HeatmapSampler {
    /// Sampler recording every `sample_rate`-th pointer move (minimum 1)
    pub fn new(sample_rate: u32) -> Self {
        Self {
            points: Vec::new(),
            sample_rate: sample_rate.max(1),
            move_count: 0,
        }
    }

    /// Record a click position
    pub fn record_click(
        &mut self,
        x: f64,
        y: f64,
        page: &str,
        now: DateTime<Utc>,
    ) -> &HeatmapPoint {
        self.push(x, y, page, now, HeatmapPointKind::Click)
    }

    /// Count a pointer move; returns the point when this move was sampled
    pub fn record_move(
        &mut self,
        x: f64,
        y: f64,
        page: &str,
        now: DateTime<Utc>,
    ) -> Option<&HeatmapPoint> {
        self.move_count += 1;
        if self.move_count % u64::from(self.sample_rate) != 0 {
            return None;
        }
        Some(self.push(x, y, page, now, HeatmapPointKind::Mousemove))
    }

    fn push(
        &mut self,
        x: f64,
        y: f64,
        page: &str,
        now: DateTime<Utc>,
        kind: HeatmapPointKind,
    ) -> &HeatmapPoint {
        self.points.push(HeatmapPoint {
            x,
            y,
            timestamp: now,
            page: page.to_string(),
            kind,
        });
        // Just pushed, so the list is not empty
        &self.points[self.points.len() - 1]
    }

    pub fn points(&self) -> &[HeatmapPoint] {
        &self.points
    }

    /// Pointer moves seen so far, sampled or not
    pub fn move_count(&self) -> u64 {
        self.move_count
    }
}
