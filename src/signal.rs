//! Host signals
//!
//! The boundary between the host environment and the collector. Whatever
//! subscribes to the host's navigation, pointer, scroll, focus and history
//! notifications converts each one into a [`HostSignal`] and hands it to
//! [`Collector::handle_signal`](crate::Collector::handle_signal). Signals are
//! plain serde values, so a host can also ship them across FFI or record them
//! as NDJSON for replay.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TelemetryError;
use crate::trackers::ScrollMeasurement;
use crate::types::{Dimensions, ElementDescriptor, NavigationType};

/// Navigation context of a page load. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationContext {
    pub url: Option<String>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub screen: Option<Dimensions>,
    pub viewport: Option<Dimensions>,
}

impl NavigationContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = Some(Dimensions { width, height });
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Some(Dimensions { width, height });
        self
    }

    /// Page path: the explicit path, else the path of the URL, else empty
    pub fn resolved_path(&self) -> String {
        if let Some(path) = &self.path {
            return path.clone();
        }
        self.url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .map(|url| url.path().to_string())
            .unwrap_or_default()
    }
}

/// A click on an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickSignal {
    pub target: ElementDescriptor,
    pub x: f64,
    pub y: f64,
}

/// One notification from the host environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum HostSignal {
    /// Page loaded or client-side route changed
    PageLoad(NavigationContext),
    Click(ClickSignal),
    Scroll(ScrollMeasurement),
    PointerMove { x: f64, y: f64 },
    /// Focus entered an element; only text inputs are recorded
    FocusIn { element: ElementDescriptor },
    FormSubmit { form: ElementDescriptor },
    /// History back/forward
    HistoryPop {
        #[serde(default)]
        direction: NavigationType,
    },
}

impl HostSignal {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            HostSignal::PageLoad(_) => "page_load",
            HostSignal::Click(_) => "click",
            HostSignal::Scroll(_) => "scroll",
            HostSignal::PointerMove { .. } => "pointer_move",
            HostSignal::FocusIn { .. } => "focus_in",
            HostSignal::FormSubmit { .. } => "form_submit",
            HostSignal::HistoryPop { .. } => "history_pop",
        }
    }

    /// Parse one signal from JSON
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Reject coordinates the heatmap cannot place
pub(crate) fn check_coordinates(x: f64, y: f64) -> Result<(), TelemetryError> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(TelemetryError::InvalidSignal(format!(
            "non-finite pointer coordinates ({}, {})",
            x, y
        )))
    }
}
