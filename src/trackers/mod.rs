//! Derived-metric trackers
//!
//! Small state machines the collector feeds from raw signals: scroll-depth
//! milestones, conversion funnels and the heatmap sampler. None of them touch
//! storage or the host; the collector owns persistence.

mod funnel;
mod heatmap;
mod scroll;

pub use funnel::FunnelTracker;
pub use heatmap::HeatmapSampler;
pub use scroll::{ScrollDepthTracker, ScrollMeasurement};
