//! Process-wide collector
//!
//! Applications that own their [`Collector`] should construct and pass it
//! around directly. For embedders that want a single shared instance, this
//! module is a small factory: the first [`init`] builds the collector, every
//! later call (and [`get_collector`]) returns the same handle.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::error::TelemetryError;
use crate::session::SystemClock;
use crate::signal::NavigationContext;
use crate::store::{KeyValueStore, MemoryStore};
use crate::types::{ExportData, Payload, Summary};

/// Shared handle to the process-wide collector
pub type CollectorHandle = Arc<Mutex<Collector>>;

static COLLECTOR: OnceLock<CollectorHandle> = OnceLock::new();

// Serializes construction so only one collector ever writes its initial page view
static INIT_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Build the process-wide collector, or return the existing one.
///
/// The arguments are only used by the first successful call.
pub fn init(
    config: CollectorConfig,
    store: Box<dyn KeyValueStore>,
    navigation: NavigationContext,
) -> Result<CollectorHandle, TelemetryError> {
    if let Some(handle) = COLLECTOR.get() {
        return Ok(handle.clone());
    }

    let _guard = INIT_LOCK.lock();
    if let Some(handle) = COLLECTOR.get() {
        return Ok(handle.clone());
    }

    let collector = Collector::new(config, store, navigation)?;
    Ok(COLLECTOR
        .get_or_init(|| Arc::new(Mutex::new(collector)))
        .clone())
}

/// The process-wide collector, built with defaults if [`init`] never ran
pub fn get_collector() -> CollectorHandle {
    if let Some(handle) = COLLECTOR.get() {
        return handle.clone();
    }

    let _guard = INIT_LOCK.lock();
    COLLECTOR
        .get_or_init(|| {
            Arc::new(Mutex::new(Collector::start(
                CollectorConfig::default(),
                Box::new(MemoryStore::new()),
                NavigationContext::default(),
                Box::new(SystemClock),
            )))
        })
        .clone()
}

pub fn track_event(name: &str, payload: Payload) {
    get_collector().lock().track_event(name, payload);
}

pub fn track_funnel_step(funnel: &str, step: &str, payload: Payload) {
    get_collector().lock().track_funnel_step(funnel, step, payload);
}

pub fn export_data() -> ExportData {
    get_collector().lock().export_data()
}

pub fn get_summary() -> Summary {
    get_collector().lock().summary()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // One test owns the global so ordering between tests cannot matter
    #[test]
    fn test_process_wide_collector() {
        let first = init(
            CollectorConfig::default(),
            Box::new(MemoryStore::new()),
            NavigationContext::new("https://portal.example.com/dashboard"),
        )
        .unwrap();
        let second = init(
            CollectorConfig::default().with_mousemove_sample_rate(0),
            Box::new(MemoryStore::new()),
            NavigationContext::default(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &get_collector()));

        let before = get_summary();
        let payload = json!({ "widget": "revenue" }).as_object().cloned().unwrap();
        track_event("widget_opened", payload);
        track_funnel_step("onboarding", "profile_completed", Payload::new());

        let after = get_summary();
        assert_eq!(after.events, before.events + 2);
        assert_eq!(after.session_id, before.session_id);

        let export = export_data();
        assert!(export.conversion_funnels.contains_key("onboarding"));
        assert_eq!(export.session_id, *first.lock().session_id());
    }
}
