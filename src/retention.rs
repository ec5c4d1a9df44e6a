//! Retention windows for persisted views
//!
//! In-memory logs are unbounded; everything written to storage is cut down to
//! the most recent entries first. Eviction is always oldest-first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::RetentionPolicy;
use crate::session::SessionId;
use crate::types::{
    ClickRecord, FunnelMap, GenericEvent, HeatmapBatch, HeatmapPoint, JourneyStep,
    PersistedSnapshot,
};

/// The last `cap` items of `items`, in original order
pub fn tail<T: Clone>(items: &[T], cap: usize) -> Vec<T> {
    let start = items.len().saturating_sub(cap);
    items[start..].to_vec()
}

/// Borrowed view of the collector state a snapshot is cut from
pub struct SnapshotSource<'a> {
    pub session_id: &'a SessionId,
    pub events: &'a [GenericEvent],
    pub journey_steps: &'a [JourneyStep],
    pub click_events: &'a [ClickRecord],
    pub scroll_depth: u8,
    pub funnels: &'a FunnelMap,
}

/// Build the bounded snapshot written under the snapshot key
pub fn build_snapshot(
    source: SnapshotSource<'_>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> PersistedSnapshot {
    PersistedSnapshot {
        session_id: source.session_id.clone(),
        events: tail(source.events, policy.max_events),
        journey_steps: tail(source.journey_steps, policy.max_journey_steps),
        click_events: tail(source.click_events, policy.max_click_events),
        scroll_depth: source.scroll_depth,
        conversion_funnels: source.funnels.clone(),
        last_updated: now,
    }
}

/// Build one heatmap batch from the most recent points recorded on `page`
pub fn build_heatmap_batch(
    points: &[HeatmapPoint],
    page: &str,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> HeatmapBatch {
    let mut data: Vec<HeatmapPoint> = points
        .iter()
        .rev()
        .filter(|p| p.page == page)
        .take(policy.max_heatmap_points)
        .cloned()
        .collect();
    data.reverse();

    HeatmapBatch {
        data,
        page: page.to_string(),
        timestamp: now,
    }
}

/// Parse a stored heatmap log; missing or malformed values read as empty
pub fn parse_heatmap_log(raw: Option<&str>) -> Vec<HeatmapBatch> {
    match raw {
        None => Vec::new(),
        Some(json) => match serde_json::from_str(json) {
            Ok(log) => log,
            Err(e) => {
                debug!(error = %e, "discarding malformed heatmap log");
                Vec::new()
            }
        },
    }
}

/// Append a batch to the log, evicting the oldest beyond the batch cap
pub fn append_batch(
    log: Vec<HeatmapBatch>,
    batch: HeatmapBatch,
    policy: &RetentionPolicy,
) -> Vec<HeatmapBatch> {
    let mut window: VecDeque<HeatmapBatch> = log.into();
    window.push_back(batch);
    while window.len() > policy.max_heatmap_batches {
        window.pop_front();
    }
    window.into()
}
