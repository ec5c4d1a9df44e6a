//! Portal Telemetry - in-process behavioral telemetry engine
//!
//! A [`Collector`] accumulates one session of user behavior inside a web
//! portal: page views, clicks, scroll-depth milestones, form interactions,
//! history navigation, conversion-funnel steps and heatmap points. After every
//! mutation a bounded snapshot is written to a pluggable key-value store; the
//! complete in-memory state is available through [`Collector::export_data`].
//!
//! ## Modules
//!
//! - **Capture**: [`HostSignal`] values from the host adapter feed [`Collector::handle_signal`]
//! - **Trackers**: scroll milestones, funnels and the heatmap sampler
//! - **Persistence**: retention windows over a [`KeyValueStore`]
//! - **Registry**: optional process-wide collector behind [`init`] / [`get_collector`]

pub mod collector;
pub mod config;
pub mod error;
pub mod registry;
pub mod retention;
pub mod session;
pub mod signal;
pub mod store;
pub mod trackers;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use collector::Collector;
pub use config::{CollectorConfig, RetentionPolicy};
pub use error::TelemetryError;
pub use registry::{
    export_data, get_collector, get_summary, init, track_event, track_funnel_step,
    CollectorHandle,
};
pub use session::{Clock, Session, SessionId, SystemClock};
pub use signal::{ClickSignal, HostSignal, NavigationContext};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use trackers::ScrollMeasurement;
pub use types::{EventData, ExportData, Payload, PersistedSnapshot, Summary};

/// Library version, reported by the CLI and the FFI
pub const TELEMETRY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported alongside the version
pub const PRODUCER_NAME: &str = "portal-telemetry";
