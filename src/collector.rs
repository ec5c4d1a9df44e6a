//! Telemetry collector
//!
//! The collector owns one session's worth of captured state: unbounded
//! in-memory logs, the derived-metric trackers and the heatmap sampler. Every
//! mutation is followed by a write of the bounded snapshot to the key-value
//! store; clicks also update the heatmap log.
//!
//! Tracking never fails from the caller's point of view. Invalid host signals
//! are rejected before any state changes, and storage failures are logged and
//! dropped without touching in-memory state.

use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::error::TelemetryError;
use crate::retention::{self, SnapshotSource};
use crate::session::{Clock, MonotonicClock, Session, SessionId, SystemClock};
use crate::signal::{check_coordinates, ClickSignal, HostSignal, NavigationContext};
use crate::store::KeyValueStore;
use crate::trackers::{FunnelTracker, HeatmapSampler, ScrollDepthTracker, ScrollMeasurement};
use crate::types::{
    ClickRecord, ElementDescriptor, EventData, ExportData, GenericEvent, HeatmapBatch,
    JourneyAction, JourneyStep, NavigationType, PageViewRecord, Payload, PersistedSnapshot,
    ScrollDepthData, Summary, FUNNEL_STEP_EVENT, SCROLL_DEPTH_EVENT,
};

pub struct Collector {
    config: CollectorConfig,
    session: Session,
    clock: MonotonicClock,
    store: Box<dyn KeyValueStore>,
    current_page: String,
    page_views: Vec<PageViewRecord>,
    events: Vec<GenericEvent>,
    journey: Vec<JourneyStep>,
    clicks: Vec<ClickRecord>,
    scroll: ScrollDepthTracker,
    funnels: FunnelTracker,
    heatmap: HeatmapSampler,
    clicks_since_flush: u32,
}

impl Collector {
    /// Start a session and record the initial page view
    pub fn new(
        config: CollectorConfig,
        store: Box<dyn KeyValueStore>,
        navigation: NavigationContext,
    ) -> Result<Self, TelemetryError> {
        Self::with_clock(config, store, navigation, Box::new(SystemClock))
    }

    /// Like [`Collector::new`] with an explicit time source
    pub fn with_clock(
        config: CollectorConfig,
        store: Box<dyn KeyValueStore>,
        navigation: NavigationContext,
        clock: Box<dyn Clock>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        Ok(Self::start(config, store, navigation, clock))
    }

    /// Build a collector from an already validated config
    pub(crate) fn start(
        config: CollectorConfig,
        store: Box<dyn KeyValueStore>,
        navigation: NavigationContext,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut clock = MonotonicClock::new(clock);
        let session = Session::start(clock.now());

        let mut collector = Self {
            scroll: ScrollDepthTracker::new(&config.scroll_milestones),
            heatmap: HeatmapSampler::new(config.mousemove_sample_rate),
            funnels: FunnelTracker::new(),
            config,
            session,
            clock,
            store,
            current_page: String::new(),
            page_views: Vec::new(),
            events: Vec::new(),
            journey: Vec::new(),
            clicks: Vec::new(),
            clicks_since_flush: 0,
        };

        info!(
            session_id = %collector.session.id,
            snapshot_key = %collector.config.snapshot_key,
            heatmap_key = %collector.config.heatmap_key,
            "telemetry collector started"
        );

        collector.on_page_load(&navigation);
        collector
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Path of the page the collector currently attributes records to
    pub fn current_page(&self) -> &str {
        &self.current_page
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Host signals
    // ------------------------------------------------------------------

    /// Feed one host signal through the matching capture handler.
    ///
    /// A rejected signal is logged and leaves state untouched; later signals
    /// are processed normally.
    pub fn handle_signal(&mut self, signal: HostSignal) {
        let kind = signal.kind();
        if let Err(e) = self.dispatch(signal) {
            warn!(
                session_id = %self.session.id,
                signal = kind,
                error = %e,
                "host signal rejected"
            );
        }
    }

    fn dispatch(&mut self, signal: HostSignal) -> Result<(), TelemetryError> {
        match signal {
            HostSignal::PageLoad(navigation) => {
                self.on_page_load(&navigation);
                Ok(())
            }
            HostSignal::Click(click) => self.on_click(click),
            HostSignal::Scroll(measurement) => self.on_scroll(measurement),
            HostSignal::PointerMove { x, y } => self.on_pointer_move(x, y),
            HostSignal::FocusIn { element } => {
                self.on_focus_in(&element);
                Ok(())
            }
            HostSignal::FormSubmit { form } => {
                self.on_form_submit(&form);
                Ok(())
            }
            HostSignal::HistoryPop { direction } => {
                self.on_history_pop(direction);
                Ok(())
            }
        }
    }

    fn on_page_load(&mut self, navigation: &NavigationContext) {
        let now = self.clock.now();
        let path = navigation.resolved_path();
        self.current_page = path.clone();

        self.page_views.push(PageViewRecord {
            url: navigation.url.clone().unwrap_or_default(),
            path,
            timestamp: now,
            referrer: navigation.referrer.clone(),
            screen: navigation.screen,
            viewport: navigation.viewport,
            session_id: self.session.id.clone(),
        });

        debug!(
            session_id = %self.session.id,
            page = %self.current_page,
            "page view captured"
        );

        self.push_journey_step(JourneyAction::PageView, None, None);
    }

    fn on_click(&mut self, click: ClickSignal) -> Result<(), TelemetryError> {
        check_coordinates(click.x, click.y)?;

        let now = self.clock.now();
        let element = click.target.truncated(self.config.click_text_max_chars);

        debug!(
            session_id = %self.session.id,
            page = %self.current_page,
            tag = %element.tag_name,
            x = click.x,
            y = click.y,
            "click captured"
        );

        self.clicks.push(ClickRecord {
            element,
            x: click.x,
            y: click.y,
            timestamp: now,
            page: self.current_page.clone(),
            session_id: self.session.id.clone(),
        });
        self.heatmap
            .record_click(click.x, click.y, &self.current_page, now);

        self.persist_snapshot();

        self.clicks_since_flush += 1;
        if self.clicks_since_flush >= self.config.heatmap_flush_every {
            self.flush_heatmap();
        }
        Ok(())
    }

    fn on_scroll(&mut self, measurement: ScrollMeasurement) -> Result<(), TelemetryError> {
        let depth = measurement.depth_percent()?;
        let crossed = self.scroll.observe(&self.current_page, depth);

        for milestone in crossed {
            debug!(
                session_id = %self.session.id,
                page = %self.current_page,
                depth = milestone,
                "scroll milestone reached"
            );
            let data = EventData::ScrollDepth(ScrollDepthData {
                depth: milestone,
                page: self.current_page.clone(),
            });
            self.emit(SCROLL_DEPTH_EVENT, data);
        }
        Ok(())
    }

    fn on_pointer_move(&mut self, x: f64, y: f64) -> Result<(), TelemetryError> {
        check_coordinates(x, y)?;
        let now = self.clock.now();
        self.heatmap.record_move(x, y, &self.current_page, now);
        Ok(())
    }

    fn on_focus_in(&mut self, element: &ElementDescriptor) {
        if !element.is_text_input() {
            return;
        }
        self.push_journey_step(JourneyAction::FormFocus, element.identifier(), None);
    }

    fn on_form_submit(&mut self, form: &ElementDescriptor) {
        let form_id = form.id.clone().filter(|id| !id.is_empty());
        self.push_journey_step(JourneyAction::FormSubmit, form_id, None);
    }

    fn on_history_pop(&mut self, direction: NavigationType) {
        self.push_journey_step(JourneyAction::Navigation, None, Some(direction));
    }

    fn push_journey_step(
        &mut self,
        action: JourneyAction,
        element: Option<String>,
        navigation_type: Option<NavigationType>,
    ) {
        let now = self.clock.now();
        debug!(
            session_id = %self.session.id,
            page = %self.current_page,
            action = ?action,
            "journey step captured"
        );
        self.journey.push(JourneyStep {
            action,
            page: self.current_page.clone(),
            element,
            navigation_type,
            timestamp: now,
        });
        self.persist_snapshot();
    }

    // ------------------------------------------------------------------
    // Tracking API
    // ------------------------------------------------------------------

    /// Record a caller-defined event and persist the snapshot
    pub fn track_event(&mut self, name: &str, payload: Payload) {
        self.emit(name, EventData::Custom(payload));
    }

    /// Record a funnel step and emit the matching "funnel_step" event.
    ///
    /// Steps are recorded as given; no ordering is enforced.
    pub fn track_funnel_step(&mut self, funnel: &str, step: &str, payload: Payload) {
        let now = self.clock.now();
        let data = self.funnels.record(funnel, step, payload, now);
        debug!(
            session_id = %self.session.id,
            funnel = funnel,
            step = step,
            "funnel step recorded"
        );
        self.emit(FUNNEL_STEP_EVENT, EventData::FunnelStep(data));
    }

    fn emit(&mut self, name: &str, data: EventData) {
        let now = self.clock.now();
        self.events.push(GenericEvent {
            event: name.to_string(),
            data,
            timestamp: now,
            session_id: self.session.id.clone(),
            page: self.current_page.clone(),
        });
        debug!(
            session_id = %self.session.id,
            event = name,
            total = self.events.len(),
            "event tracked"
        );
        self.persist_snapshot();
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Complete, untruncated in-memory state
    pub fn export_data(&self) -> ExportData {
        ExportData {
            session_id: self.session.id.clone(),
            session_start: self.session.started_at,
            page_views: self.page_views.clone(),
            events: self.events.clone(),
            journey_steps: self.journey.clone(),
            click_events: self.clicks.clone(),
            scroll_depth: self.scroll.max_depth(),
            conversion_funnels: self.funnels.funnels().clone(),
            heatmap_data: self.heatmap.points().to_vec(),
        }
    }

    /// Counts and max depth without copying any log
    pub fn summary(&self) -> Summary {
        Summary {
            session_id: self.session.id.clone(),
            page_views: self.page_views.len(),
            events: self.events.len(),
            journey_steps: self.journey.len(),
            clicks: self.clicks.len(),
            heatmap_points: self.heatmap.points().len(),
            funnels: self.funnels.len(),
            max_scroll_depth: self.scroll.max_depth(),
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persist_snapshot(&mut self) {
        let now = self.clock.now();
        let snapshot = retention::build_snapshot(
            SnapshotSource {
                session_id: &self.session.id,
                events: &self.events,
                journey_steps: &self.journey,
                click_events: &self.clicks,
                scroll_depth: self.scroll.max_depth(),
                funnels: self.funnels.funnels(),
            },
            &self.config.retention,
            now,
        );

        let result = serde_json::to_string(&snapshot)
            .map_err(TelemetryError::from)
            .and_then(|json| self.store.set(&self.config.snapshot_key, &json));

        if let Err(e) = result {
            warn!(
                session_id = %self.session.id,
                key = %self.config.snapshot_key,
                error = %e,
                "failed to persist telemetry snapshot"
            );
        }
    }

    /// Append the current page's heatmap batch to the stored log now
    pub fn flush_heatmap(&mut self) {
        self.clicks_since_flush = 0;

        let key = self.config.heatmap_key.clone();
        let existing = match self.store.get(&key) {
            Ok(raw) => retention::parse_heatmap_log(raw.as_deref()),
            Err(e) => {
                debug!(key = %key, error = %e, "heatmap log unreadable, starting empty");
                Vec::new()
            }
        };

        let now = self.clock.now();
        let batch = retention::build_heatmap_batch(
            self.heatmap.points(),
            &self.current_page,
            &self.config.retention,
            now,
        );
        let points = batch.data.len();
        let log = retention::append_batch(existing, batch, &self.config.retention);
        let batches = log.len();

        let result = serde_json::to_string(&log)
            .map_err(TelemetryError::from)
            .and_then(|json| self.store.set(&key, &json));

        match result {
            Ok(()) => debug!(
                session_id = %self.session.id,
                page = %self.current_page,
                points,
                batches,
                "heatmap batch persisted"
            ),
            Err(e) => warn!(
                session_id = %self.session.id,
                key = %key,
                error = %e,
                "failed to persist heatmap log"
            ),
        }
    }

    /// Remove both persisted keys; in-memory state is kept
    pub fn clear_storage(&mut self) {
        for key in [&self.config.snapshot_key, &self.config.heatmap_key] {
            if let Err(e) = self.store.remove(key) {
                warn!(key = %key, error = %e, "failed to clear telemetry storage");
            }
        }
        info!(session_id = %self.session.id, "telemetry storage cleared");
    }

    /// Read back the persisted snapshot; `None` when missing or unreadable
    pub fn load_snapshot(&self) -> Option<PersistedSnapshot> {
        let raw = self.store.get(&self.config.snapshot_key).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Read back the persisted heatmap log; empty when missing or unreadable
    pub fn load_heatmap_log(&self) -> Vec<HeatmapBatch> {
        let raw = self.store.get(&self.config.heatmap_key).ok().flatten();
        retention::parse_heatmap_log(raw.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;
    use crate::session::test_clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::types::{HeatmapPointKind, JourneyAction};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Memory store whose reads and writes can be made to fail on demand
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: Arc<Mutex<MemoryStore>>,
        fail_reads: Arc<AtomicBool>,
        fail_writes: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn raw(&self, key: &str) -> Option<String> {
            self.inner.lock().unwrap().get(key).unwrap()
        }

        fn put(&self, key: &str, value: &str) {
            self.inner.lock().unwrap().set(key, value).unwrap();
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(TelemetryError::Storage("read refused".to_string()));
            }
            self.inner.lock().unwrap().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(TelemetryError::Storage("write refused".to_string()));
            }
            self.inner.lock().unwrap().set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), TelemetryError> {
            self.inner.lock().unwrap().remove(key)
        }
    }

    fn navigation() -> NavigationContext {
        NavigationContext::new("https://portal.example.com/orders?page=2")
            .with_referrer("https://portal.example.com/")
            .with_screen(1920, 1080)
            .with_viewport(1440, 900)
    }

    fn collector() -> Collector {
        Collector::new(
            CollectorConfig::default(),
            Box::new(MemoryStore::new()),
            navigation(),
        )
        .unwrap()
    }

    fn collector_with(config: CollectorConfig, store: FlakyStore) -> Collector {
        Collector::new(config, Box::new(store), navigation()).unwrap()
    }

    fn click(x: f64, y: f64) -> HostSignal {
        HostSignal::Click(ClickSignal {
            target: ElementDescriptor::new("button")
                .with_id("submit-order")
                .with_class_name("btn btn-primary")
                .with_text("Submit order"),
            x,
            y,
        })
    }

    fn scroll_to(scroll_top: f64) -> HostSignal {
        HostSignal::Scroll(ScrollMeasurement {
            scroll_top,
            scroll_height: 3000.0,
            viewport_height: 1000.0,
        })
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_construction_records_page_view() {
        let collector = collector();
        let export = collector.export_data();

        assert_eq!(export.page_views.len(), 1);
        let view = &export.page_views[0];
        assert_eq!(view.url, "https://portal.example.com/orders?page=2");
        assert_eq!(view.path, "/orders");
        assert_eq!(view.referrer.as_deref(), Some("https://portal.example.com/"));
        assert_eq!(view.viewport.unwrap().width, 1440);

        assert_eq!(export.journey_steps.len(), 1);
        assert_eq!(export.journey_steps[0].action, JourneyAction::PageView);
        assert_eq!(export.journey_steps[0].page, "/orders");

        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.journey_steps.len(), 1);
        assert_eq!(&snapshot.session_id, collector.session_id());
    }

    #[test]
    fn test_missing_navigation_fields_recorded_empty() {
        let collector = Collector::new(
            CollectorConfig::default(),
            Box::new(MemoryStore::new()),
            NavigationContext::default(),
        )
        .unwrap();

        let view = &collector.export_data().page_views[0];
        assert_eq!(view.url, "");
        assert_eq!(view.path, "");
        assert!(view.referrer.is_none());
        assert!(view.screen.is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Collector::new(
            CollectorConfig::default().with_mousemove_sample_rate(0),
            Box::new(MemoryStore::new()),
            navigation(),
        );
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_export_is_untruncated_snapshot_is_capped() {
        let mut collector = collector();
        for i in 0..150 {
            collector.track_event("report_opened", payload(json!({ "index": i })));
        }

        let export = collector.export_data();
        assert_eq!(export.events.len(), 150);

        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.events.len(), 100);
        let first = snapshot.events[0].data.as_custom().unwrap();
        let last = snapshot.events[99].data.as_custom().unwrap();
        assert_eq!(first["index"], 50);
        assert_eq!(last["index"], 149);
    }

    #[test]
    fn test_persisted_custom_event_keeps_its_payload() {
        let mut collector = collector();
        let payload = payload(json!({ "depth": 50, "page": "/a" }));
        collector.track_event("my_event", payload.clone());
        collector.handle_signal(scroll_to(600.0));

        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.events[0].data, EventData::Custom(payload));
        assert_eq!(snapshot.events, collector.export_data().events);
    }

    #[test]
    fn test_snapshot_caps_journey_and_clicks() {
        let mut collector = collector();
        for i in 0..60 {
            collector.handle_signal(HostSignal::HistoryPop {
                direction: NavigationType::Back,
            });
            collector.handle_signal(click(i as f64, 1.0));
        }
        for i in 0..200 {
            collector.handle_signal(click(i as f64, 2.0));
        }

        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.journey_steps.len(), 50);
        assert_eq!(snapshot.click_events.len(), 200);
        assert_eq!(snapshot.click_events[0].y, 2.0);

        let summary = collector.summary();
        assert_eq!(summary.journey_steps, 61);
        assert_eq!(summary.clicks, 260);
    }

    #[test]
    fn test_funnel_steps_exported_in_call_order() {
        let mut collector = collector();
        collector.track_funnel_step("checkout", "cart_viewed", Payload::new());
        collector.track_funnel_step("checkout", "payment_entered", Payload::new());

        let export = collector.export_data();
        let steps = &export.conversion_funnels["checkout"].steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, "cart_viewed");
        assert_eq!(steps[1].step, "payment_entered");
        assert!(steps[0].timestamp <= steps[1].timestamp);

        let funnel_events: Vec<&GenericEvent> = export
            .events
            .iter()
            .filter(|e| e.event == FUNNEL_STEP_EVENT)
            .collect();
        assert_eq!(funnel_events.len(), 2);
        assert!(matches!(
            &funnel_events[1].data,
            EventData::FunnelStep(d) if d.funnel == "checkout" && d.step == "payment_entered"
        ));

        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(
            value["conversionFunnels"]["checkout"]["steps"]
                .as_array()
                .unwrap()
                .len(),
            2
        );

        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.conversion_funnels, export.conversion_funnels);
    }

    #[test]
    fn test_session_id_shared_by_all_records() {
        let mut collector = collector();
        collector.handle_signal(click(1.0, 1.0));
        collector.handle_signal(scroll_to(1000.0));
        collector.track_event("custom", Payload::new());

        let id = collector.session_id().clone();
        let export = collector.export_data();
        assert_eq!(export.session_id, id);
        assert!(export.page_views.iter().all(|r| r.session_id == id));
        assert!(export.click_events.iter().all(|r| r.session_id == id));
        assert!(export.events.iter().all(|r| r.session_id == id));

        let other = self::collector();
        assert_ne!(other.session_id(), &id);
    }

    #[test]
    fn test_failing_store_never_surfaces() {
        let store = FlakyStore::default();
        let mut collector = collector_with(CollectorConfig::default(), store.clone());

        store.fail_writes.store(true, Ordering::SeqCst);
        collector.track_event("first", Payload::new());
        collector.handle_signal(click(3.0, 4.0));
        assert_eq!(collector.summary().events, 1);

        // The snapshot on disk still reflects the last successful write
        let stale: PersistedSnapshot =
            serde_json::from_str(&store.raw("portal_analytics").unwrap()).unwrap();
        assert!(stale.events.is_empty());

        store.fail_writes.store(false, Ordering::SeqCst);
        collector.track_event("second", Payload::new());

        assert_eq!(collector.summary().events, 2);
        let snapshot = collector.load_snapshot().unwrap();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.click_events.len(), 1);
    }

    #[test]
    fn test_quota_exceeded_is_swallowed() {
        let mut collector = Collector::new(
            CollectorConfig::default(),
            Box::new(MemoryStore::with_quota(2_000)),
            navigation(),
        )
        .unwrap();

        for i in 0..50 {
            collector.track_event("filler", payload(json!({ "i": i, "pad": "x".repeat(40) })));
        }

        assert_eq!(collector.export_data().events.len(), 50);
        let persisted = collector.load_snapshot().unwrap();
        assert!(persisted.events.len() < 50);
    }

    #[test]
    fn test_mousemove_sampling_and_clicks() {
        let mut collector = collector();
        for i in 0..100 {
            collector.handle_signal(HostSignal::PointerMove {
                x: i as f64,
                y: 0.0,
            });
        }

        let points = collector.export_data().heatmap_data;
        assert_eq!(points.len(), 10);
        assert!(points.iter().all(|p| p.kind == HeatmapPointKind::Mousemove));

        collector.handle_signal(click(7.0, 8.0));
        let points = collector.export_data().heatmap_data;
        assert_eq!(points.len(), 11);
        assert_eq!(points[10].kind, HeatmapPointKind::Click);
        assert_eq!(points[10].page, "/orders");
    }

    #[test]
    fn test_heatmap_log_bounds() {
        let retention = RetentionPolicy {
            max_heatmap_points: 5,
            max_heatmap_batches: 3,
            ..Default::default()
        };
        let mut collector = Collector::new(
            CollectorConfig::default().with_retention(retention),
            Box::new(MemoryStore::new()),
            navigation(),
        )
        .unwrap();

        for i in 0..40 {
            collector.handle_signal(click(i as f64, 0.0));
            let log = collector.load_heatmap_log();
            assert!(log.len() <= 3);
            assert!(log.iter().all(|batch| batch.data.len() <= 5));
        }

        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 3);
        let newest: Vec<f64> = log[2].data.iter().map(|p| p.x).collect();
        assert_eq!(newest, vec![35.0, 36.0, 37.0, 38.0, 39.0]);
        assert_eq!(log[0].data.last().unwrap().x, 37.0);
    }

    #[test]
    fn test_heatmap_batch_default_point_cap() {
        let mut collector = Collector::new(
            CollectorConfig::default().with_heatmap_flush_every(10_000),
            Box::new(MemoryStore::new()),
            navigation(),
        )
        .unwrap();

        for i in 0..1100 {
            collector.handle_signal(click(i as f64, 0.0));
        }
        assert!(collector.load_heatmap_log().is_empty());

        collector.flush_heatmap();
        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data.len(), 1000);
        assert_eq!(log[0].data[0].x, 100.0);
        assert_eq!(collector.export_data().heatmap_data.len(), 1100);
    }

    #[test]
    fn test_heatmap_flush_every_n_clicks() {
        let store = FlakyStore::default();
        let mut collector = collector_with(
            CollectorConfig::default().with_heatmap_flush_every(3),
            store.clone(),
        );

        collector.handle_signal(click(1.0, 1.0));
        collector.handle_signal(click(2.0, 2.0));
        assert!(store.raw("portal_heatmap").is_none());

        collector.handle_signal(click(3.0, 3.0));
        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data.len(), 3);
    }

    #[test]
    fn test_malformed_heatmap_log_replaced() {
        let store = FlakyStore::default();
        store.put("portal_heatmap", "{corrupted");
        let mut collector = collector_with(CollectorConfig::default(), store.clone());

        collector.handle_signal(click(1.0, 2.0));

        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].page, "/orders");
    }

    #[test]
    fn test_heatmap_read_failure_still_writes() {
        let store = FlakyStore::default();
        let mut collector = collector_with(CollectorConfig::default(), store.clone());
        collector.handle_signal(click(1.0, 1.0));

        store.fail_reads.store(true, Ordering::SeqCst);
        collector.handle_signal(click(2.0, 2.0));
        store.fail_reads.store(false, Ordering::SeqCst);

        // The unreadable log was treated as empty, so only the new batch remains
        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data.len(), 2);
    }

    #[test]
    fn test_scroll_milestones_emit_events() {
        let mut collector = collector();
        // 0 -> 30 -> 60 percent of a 2000px scrollable range
        collector.handle_signal(scroll_to(0.0));
        collector.handle_signal(scroll_to(600.0));
        collector.handle_signal(scroll_to(1200.0));

        let depths: Vec<u8> = collector
            .export_data()
            .events
            .iter()
            .filter(|e| e.event == SCROLL_DEPTH_EVENT)
            .filter_map(|e| match &e.data {
                EventData::ScrollDepth(d) => Some(d.depth),
                _ => None,
            })
            .collect();
        assert_eq!(depths, vec![25, 50]);
        assert_eq!(collector.summary().max_scroll_depth, 60);
        assert_eq!(collector.load_snapshot().unwrap().scroll_depth, 60);
    }

    #[test]
    fn test_scroll_milestones_fire_again_on_new_page() {
        let mut collector = collector();
        collector.handle_signal(scroll_to(2000.0));
        collector.handle_signal(HostSignal::PageLoad(NavigationContext::new(
            "https://portal.example.com/invoices",
        )));
        collector.handle_signal(scroll_to(600.0));

        let milestones: Vec<(String, u8)> = collector
            .export_data()
            .events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::ScrollDepth(d) => Some((d.page.clone(), d.depth)),
                _ => None,
            })
            .collect();
        let on_invoices: Vec<u8> = milestones
            .iter()
            .filter(|(page, _)| page == "/invoices")
            .map(|(_, depth)| *depth)
            .collect();
        assert_eq!(milestones.len(), 6);
        assert_eq!(on_invoices, vec![25]);
        // Session-wide maximum is unaffected by the shallower page
        assert_eq!(collector.summary().max_scroll_depth, 100);
    }

    #[test]
    fn test_scroll_depth_non_decreasing() {
        let mut collector = collector();
        let mut previous = 0;
        for top in [400.0, 100.0, 1800.0, 0.0, 900.0, 2000.0, 50.0] {
            collector.handle_signal(scroll_to(top));
            let depth = collector.summary().max_scroll_depth;
            assert!(depth >= previous);
            previous = depth;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn test_rejected_signal_does_not_block_later_ones() {
        let mut collector = collector();
        collector.handle_signal(HostSignal::Scroll(ScrollMeasurement {
            scroll_top: 0.0,
            scroll_height: 500.0,
            viewport_height: 800.0,
        }));
        collector.handle_signal(click(f64::NAN, 1.0));
        assert_eq!(collector.summary().clicks, 0);

        collector.handle_signal(click(1.0, 1.0));
        collector.handle_signal(scroll_to(2000.0));
        let summary = collector.summary();
        assert_eq!(summary.clicks, 1);
        assert_eq!(summary.max_scroll_depth, 100);
    }

    #[test]
    fn test_form_interactions() {
        let mut collector = collector();
        collector.handle_signal(HostSignal::FocusIn {
            element: ElementDescriptor::new("INPUT").with_id("ticket-subject"),
        });
        collector.handle_signal(HostSignal::FocusIn {
            element: ElementDescriptor::new("div").with_id("sidebar"),
        });
        collector.handle_signal(HostSignal::FocusIn {
            element: ElementDescriptor::new("textarea").with_name("body"),
        });
        collector.handle_signal(HostSignal::FormSubmit {
            form: ElementDescriptor::new("form").with_id("new-ticket"),
        });

        let steps = collector.export_data().journey_steps;
        let actions: Vec<(JourneyAction, Option<&str>)> = steps
            .iter()
            .map(|s| (s.action, s.element.as_deref()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (JourneyAction::PageView, None),
                (JourneyAction::FormFocus, Some("ticket-subject")),
                (JourneyAction::FormFocus, Some("body")),
                (JourneyAction::FormSubmit, Some("new-ticket")),
            ]
        );
    }

    #[test]
    fn test_history_pop_records_back_navigation() {
        let mut collector = collector();
        collector.handle_signal(HostSignal::HistoryPop {
            direction: NavigationType::default(),
        });

        let step = collector.export_data().journey_steps.pop().unwrap();
        assert_eq!(step.action, JourneyAction::Navigation);
        assert_eq!(step.navigation_type, Some(NavigationType::Back));
        assert_eq!(step.page, "/orders");
    }

    #[test]
    fn test_click_record_descriptor() {
        let mut collector = collector();
        collector.handle_signal(HostSignal::Click(ClickSignal {
            target: ElementDescriptor::new("a")
                .with_href("https://portal.example.com/invoices/7")
                .with_text("Download the invoice for March including all line items and taxes"),
            x: 120.0,
            y: 48.5,
        }));

        let record = collector.export_data().click_events.pop().unwrap();
        assert_eq!(record.element.tag_name, "a");
        assert_eq!(
            record.element.href.as_deref(),
            Some("https://portal.example.com/invoices/7")
        );
        assert_eq!(record.element.text.as_ref().unwrap().chars().count(), 50);
        assert_eq!((record.x, record.y), (120.0, 48.5));
        assert_eq!(record.page, "/orders");
    }

    #[test]
    fn test_page_load_signal_moves_current_page() {
        let mut collector = collector();
        collector.handle_signal(HostSignal::PageLoad(NavigationContext::new(
            "https://portal.example.com/billing/invoices",
        )));
        collector.handle_signal(click(1.0, 1.0));
        collector.track_event("invoice_filter", Payload::new());

        let export = collector.export_data();
        assert_eq!(collector.current_page(), "/billing/invoices");
        assert_eq!(export.page_views.len(), 2);
        assert_eq!(export.click_events[0].page, "/billing/invoices");
        assert_eq!(export.events[0].page, "/billing/invoices");
        assert_eq!(export.journey_steps[1].action, JourneyAction::PageView);
    }

    #[test]
    fn test_heatmap_batches_are_per_page() {
        let mut collector = collector();
        collector.handle_signal(click(1.0, 1.0));
        collector.handle_signal(HostSignal::PageLoad(NavigationContext::new(
            "https://portal.example.com/tickets",
        )));
        collector.handle_signal(click(2.0, 2.0));

        let log = collector.load_heatmap_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].page, "/orders");
        assert_eq!(log[1].page, "/tickets");
        assert_eq!(log[1].data.len(), 1);
    }

    #[test]
    fn test_timestamps_non_decreasing_when_clock_steps_back() {
        let clock = ManualClock::new();
        let mut collector = Collector::with_clock(
            CollectorConfig::default(),
            Box::new(MemoryStore::new()),
            navigation(),
            Box::new(clock.clone()),
        )
        .unwrap();

        collector.track_event("a", Payload::new());
        clock.advance(-60_000);
        collector.track_event("b", Payload::new());
        clock.advance(120_000);
        collector.track_event("c", Payload::new());

        let events = collector.export_data().events;
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(events[2].timestamp > events[1].timestamp);
    }

    #[test]
    fn test_clear_storage() {
        let store = FlakyStore::default();
        let mut collector = collector_with(CollectorConfig::default(), store.clone());
        collector.handle_signal(click(1.0, 1.0));
        assert!(store.raw("portal_analytics").is_some());
        assert!(store.raw("portal_heatmap").is_some());

        collector.clear_storage();
        assert!(store.raw("portal_analytics").is_none());
        assert!(store.raw("portal_heatmap").is_none());
        assert_eq!(collector.summary().clicks, 1);
        assert!(collector.load_snapshot().is_none());
    }

    #[test]
    fn test_summary_counts() {
        let mut collector = collector();
        collector.handle_signal(click(1.0, 1.0));
        collector.handle_signal(scroll_to(500.0));
        collector.track_funnel_step("signup", "form_opened", Payload::new());

        let summary = collector.summary();
        assert_eq!(summary.page_views, 1);
        assert_eq!(summary.clicks, 1);
        assert_eq!(summary.heatmap_points, 1);
        assert_eq!(summary.funnels, 1);
        // one scroll milestone plus one funnel event
        assert_eq!(summary.events, 2);
        assert_eq!(summary.max_scroll_depth, 25);
    }
}
