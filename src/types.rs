//! Telemetry record types
//!
//! Every record appended by the collector lives here. Records are immutable once
//! created and serialize in camelCase, the shape the dashboard layer reads from
//! the persisted snapshot and from exports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionId;

/// Open key-value payload supplied by callers
pub type Payload = serde_json::Map<String, Value>;

/// Funnel name to funnel progress, ordered by name for stable output
pub type FunnelMap = BTreeMap<String, FunnelState>;

/// Width and height in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewRecord {
    /// Full URL, empty when the host did not provide one
    pub url: String,
    /// Path component, empty when unavailable
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub referrer: Option<String>,
    /// Physical screen size
    pub screen: Option<Dimensions>,
    /// Browser viewport size
    pub viewport: Option<Dimensions>,
    pub session_id: SessionId,
}

/// Description of the element a pointer or focus signal targeted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// Lower-case tag name ("button", "a", "input", ...)
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Space-separated class list
    #[serde(default)]
    pub class_name: Option<String>,
    /// Name attribute (form controls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Text content; truncated when stored on a click record
    #[serde(default)]
    pub text: Option<String>,
    /// Link target for anchors
    #[serde(default)]
    pub href: Option<String>,
}

impl ElementDescriptor {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Whether this element is a text-entry form control
    pub fn is_text_input(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("input")
            || self.tag_name.eq_ignore_ascii_case("textarea")
    }

    /// Best identifier for journey steps: id, then name
    pub fn identifier(&self) -> Option<String> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.name.as_deref().filter(|name| !name.is_empty()))
            .map(str::to_string)
    }

    /// Copy of this descriptor with text cut to at most `max_chars` characters
    pub fn truncated(&self, max_chars: usize) -> Self {
        let mut copy = self.clone();
        copy.text = self
            .text
            .as_ref()
            .map(|text| text.chars().take(max_chars).collect());
        copy
    }
}

/// One pointer click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRecord {
    pub element: ElementDescriptor,
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
    pub page: String,
    pub session_id: SessionId,
}

/// Heatmap sample origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapPointKind {
    Click,
    Mousemove,
}

/// One sampled pointer position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
    pub page: String,
    #[serde(rename = "type")]
    pub kind: HeatmapPointKind,
}

/// Semantic action recorded on the journey trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyAction {
    #[serde(rename = "pageview")]
    PageView,
    Navigation,
    FormFocus,
    FormSubmit,
}

/// History navigation direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    /// History pop events cannot tell direction, so they record as back
    #[default]
    Back,
    Forward,
}

/// One semantically meaningful user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStep {
    pub action: JourneyAction,
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub navigation_type: Option<NavigationType>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of a "scroll_depth" milestone event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrollDepthData {
    pub depth: u8,
    pub page: String,
}

/// Payload of a "funnel_step" event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunnelStepData {
    pub funnel: String,
    pub step: String,
    pub data: Payload,
}

/// Generic event payload.
///
/// Built-in event kinds carry typed payloads; everything a caller tracks falls
/// back to an open map. Serialized untagged, so the JSON stays the plain payload
/// object. Reading back is keyed on the event name (see [`EventData::from_named`]),
/// never on the payload's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    FunnelStep(FunnelStepData),
    ScrollDepth(ScrollDepthData),
    Custom(Payload),
}

impl EventData {
    /// Rebuild a payload from its stored JSON, choosing the variant by event name.
    ///
    /// A built-in name whose payload does not fit the typed shape (a caller
    /// reusing the name) is kept as a custom map.
    pub fn from_named(event: &str, data: Value) -> Result<Self, serde_json::Error> {
        let typed = match event {
            SCROLL_DEPTH_EVENT => serde_json::from_value(data.clone()).map(EventData::ScrollDepth),
            FUNNEL_STEP_EVENT => serde_json::from_value(data.clone()).map(EventData::FunnelStep),
            _ => return serde_json::from_value(data).map(EventData::Custom),
        };
        typed.or_else(|_| serde_json::from_value(data).map(EventData::Custom))
    }

    pub fn as_custom(&self) -> Option<&Payload> {
        match self {
            EventData::Custom(map) => Some(map),
            _ => None,
        }
    }
}

/// Event name emitted by the scroll-depth tracker
pub const SCROLL_DEPTH_EVENT: &str = "scroll_depth";

/// Event name emitted by the funnel tracker
pub const FUNNEL_STEP_EVENT: &str = "funnel_step";

/// A named event with payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericEvent {
    pub event: String,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub page: String,
}

/// Stored shape of a [`GenericEvent`] before its payload is typed
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEvent {
    event: String,
    data: Value,
    timestamp: DateTime<Utc>,
    session_id: SessionId,
    page: String,
}

impl<'de> Deserialize<'de> for GenericEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = StoredEvent::deserialize(deserializer)?;
        let data = EventData::from_named(&stored.event, stored.data).map_err(de::Error::custom)?;
        Ok(GenericEvent {
            event: stored.event,
            data,
            timestamp: stored.timestamp,
            session_id: stored.session_id,
            page: stored.page,
        })
    }
}

/// One recorded funnel step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStepRecord {
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub data: Payload,
}

/// Progress through one named funnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelState {
    pub steps: Vec<FunnelStepRecord>,
    pub start_time: DateTime<Utc>,
}

/// Bounded view written under the snapshot key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub session_id: SessionId,
    pub events: Vec<GenericEvent>,
    pub journey_steps: Vec<JourneyStep>,
    pub click_events: Vec<ClickRecord>,
    /// Maximum scroll depth reached, in percent
    pub scroll_depth: u8,
    pub conversion_funnels: FunnelMap,
    pub last_updated: DateTime<Utc>,
}

/// One per-page entry of the persisted heatmap log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapBatch {
    pub data: Vec<HeatmapPoint>,
    pub page: String,
    pub timestamp: DateTime<Utc>,
}

/// Complete, untruncated in-memory state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub session_id: SessionId,
    pub session_start: DateTime<Utc>,
    pub page_views: Vec<PageViewRecord>,
    pub events: Vec<GenericEvent>,
    pub journey_steps: Vec<JourneyStep>,
    pub click_events: Vec<ClickRecord>,
    pub scroll_depth: u8,
    pub conversion_funnels: FunnelMap,
    pub heatmap_data: Vec<HeatmapPoint>,
}

/// Cheap projection for lightweight display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub session_id: SessionId,
    pub page_views: usize,
    pub events: usize,
    pub journey_steps: usize,
    pub clicks: usize,
    pub heatmap_points: usize,
    pub funnels: usize,
    pub max_scroll_depth: u8,
}
