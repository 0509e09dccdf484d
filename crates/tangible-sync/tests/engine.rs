//! Integration tests for the tangible engine
//!
//! Covers snapshot reconciliation, owner-thread marshalling and the two
//! subscription styles, against a scripted provider, the simulator and the
//! protocol client over in-memory channels.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

use tangible_core::{
    EngineError, EngineEvent, EngineProfile, EventKind, MockConnector, Pattern, Pointer, Provider,
    ProviderSink, Tangible, TangibleError, TangibleHandle,
};
use tangible_sync::{EventRecorder, OnEngineConnected, OnTangibleAdded, Subscriber, TangibleEngine};
use tangible_transport::{ClientConfig, MAX_FRAME_SIZE, encode_frame};

/// Provider that records calls and lets the test report on its behalf
struct ScriptedProvider {
    sink: Weak<dyn ProviderSink>,
    starts: AtomicUsize,
    disposes: AtomicUsize,
    pattern_requests: AtomicUsize,
    pointers: Mutex<Vec<Vec<Pointer>>>,
}

impl ScriptedProvider {
    fn sink(&self) -> Arc<dyn ProviderSink> {
        self.sink.upgrade().expect("engine dropped")
    }
}

impl Provider for ScriptedProvider {
    fn start_provider(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn set_patterns(&self, patterns: Vec<Pattern>) {
        self.sink().patterns_updated(patterns);
    }

    fn request_patterns(&self) {
        self.pattern_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn update_pointers(&self, pointers: Vec<Pointer>) {
        self.pointers.lock().push(pointers);
    }

    fn dispose(&self) {
        self.disposes.fetch_add(1, Ordering::SeqCst);
    }
}

fn scripted_engine() -> (TangibleEngine, Arc<ScriptedProvider>) {
    let mut provider = None;
    let engine = TangibleEngine::new(|sink| {
        let p = Arc::new(ScriptedProvider {
            sink,
            starts: AtomicUsize::new(0),
            disposes: AtomicUsize::new(0),
            pattern_requests: AtomicUsize::new(0),
            pointers: Mutex::new(Vec::new()),
        });
        provider = Some(p.clone());
        p as Arc<dyn Provider>
    });
    (engine, provider.expect("provider not built"))
}

/// Engine that is initialized, connected and knows pattern 1
fn connected_engine() -> (TangibleEngine, Arc<ScriptedProvider>, Arc<EventRecorder>) {
    let (engine, provider) = scripted_engine();
    let recorder = EventRecorder::new();
    engine.subscribe(&recorder);
    engine.init();
    provider.sink().connected();
    provider
        .sink()
        .patterns_updated(vec![Pattern::new(1, "puck").with_radius(30.0)]);
    recorder.take();
    (engine, provider, recorder)
}

fn kinds(events: &[EngineEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind()).collect()
}

fn ids(events: &[EngineEvent]) -> Vec<i32> {
    events.iter().filter_map(|e| e.tangible()).map(|t| t.id()).collect()
}

#[test]
fn test_first_snapshot_adds_every_tangible() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![
        Tangible::new(7, 1).at(100.0, 200.0),
        Tangible::new(8, 1).at(10.0, 20.0),
    ]);
    engine.tick();

    let events = recorder.take();
    assert_eq!(kinds(&events), vec![EventKind::TangibleAdded; 2]);
    assert_eq!(ids(&events), vec![7, 8]);
    assert_eq!(engine.tangibles().len(), 2);

    let t = engine.tangible(7).unwrap();
    assert_eq!(t.pattern_name().as_deref(), Some("puck"));
    assert_eq!(t.radius(), Some(30.0));
}

#[test]
fn test_snapshot_is_not_reconciled_until_tick() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    assert!(engine.tangible(7).is_none());
    assert!(recorder.is_empty());

    engine.tick();
    assert!(engine.tangible(7).is_some());
}

#[test]
fn test_update_mutates_in_place() {
    let (engine, provider, recorder) = connected_engine();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(7, 1).at(100.0, 200.0)]);
    engine.tick();
    let held = engine.tangible(7).unwrap();
    recorder.take();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(7, 1).at(105.0, 200.0).rotated(0.5)]);
    engine.tick();

    let events = recorder.take();
    assert_eq!(kinds(&events), vec![EventKind::TangibleUpdated]);
    assert!(events[0].tangible().unwrap().ptr_eq(&held));
    assert_eq!(held.position().x, 105.0);
    assert_eq!(held.rotation(), 0.5);
}

#[test]
fn test_update_changes_position_and_rotation_only() {
    let (engine, provider, _recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![
        Tangible::new(7, 1).with_pointer_ids(vec![1, 2, 3]),
    ]);
    engine.tick();

    provider.sink().tangibles_updated(vec![
        Tangible::new(7, 2).at(1.0, 1.0).with_pointer_ids(vec![9]),
    ]);
    engine.tick();

    let t = engine.tangible(7).unwrap();
    assert_eq!(t.pattern_id(), 1);
    assert_eq!(t.pointer_ids(), vec![1, 2, 3]);
    assert_eq!(t.position().x, 1.0);
}

#[test]
fn test_missing_tangible_is_removed() {
    let (engine, provider, recorder) = connected_engine();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(7, 1), Tangible::new(8, 1)]);
    engine.tick();
    recorder.take();

    provider.sink().tangibles_updated(vec![Tangible::new(8, 1)]);
    engine.tick();

    let events = recorder.take();
    assert_eq!(
        kinds(&events),
        vec![EventKind::TangibleUpdated, EventKind::TangibleRemoved]
    );
    assert_eq!(ids(&events), vec![8, 7]);
    assert!(engine.tangible(7).is_none());
    assert_eq!(engine.tangibles().len(), 1);
}

#[test]
fn test_empty_snapshot_removes_everything() {
    let (engine, provider, recorder) = connected_engine();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(7, 1), Tangible::new(8, 1)]);
    engine.tick();
    recorder.take();

    provider.sink().tangibles_updated(Vec::new());
    engine.tick();

    assert_eq!(kinds(&recorder.take()), vec![EventKind::TangibleRemoved; 2]);
    assert!(engine.tangibles().is_empty());
}

#[test]
fn test_tick_without_snapshot_keeps_state() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    engine.tick();
    recorder.take();

    engine.tick();
    engine.tick();

    assert!(recorder.is_empty());
    assert!(engine.tangible(7).is_some());
}

#[test]
fn test_added_before_updated_before_removed() {
    let (engine, provider, recorder) = connected_engine();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(1, 1), Tangible::new(2, 1)]);
    engine.tick();
    recorder.take();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(3, 1), Tangible::new(2, 1).at(5.0, 5.0)]);
    engine.tick();

    let events = recorder.take();
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::TangibleAdded,
            EventKind::TangibleUpdated,
            EventKind::TangibleRemoved
        ]
    );
    assert_eq!(ids(&events), vec![3, 2, 1]);
}

#[test]
fn test_snapshots_between_ticks_accumulate() {
    let (engine, provider, recorder) = connected_engine();

    provider
        .sink()
        .tangibles_updated(vec![Tangible::new(1, 1).at(0.0, 0.0)]);
    provider.sink().tangibles_updated(vec![
        Tangible::new(1, 1).at(9.0, 9.0),
        Tangible::new(2, 1),
    ]);
    engine.tick();

    let events = recorder.take();
    assert_eq!(kinds(&events), vec![EventKind::TangibleAdded; 2]);
    assert_eq!(ids(&events), vec![1, 2]);
    assert_eq!(engine.tangible(1).unwrap().position().x, 9.0);
}

#[test]
fn test_unknown_pattern_still_adds() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![Tangible::new(7, 99)]);
    engine.tick();

    assert_eq!(kinds(&recorder.take()), vec![EventKind::TangibleAdded]);
    let t = engine.tangible(7).unwrap();
    assert!(t.pattern().is_none());
    assert_eq!(t.pattern_name(), None);
    assert_eq!(t.radius(), None);
}

#[test]
fn test_no_reconciliation_while_disconnected() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    engine.tick();
    recorder.take();

    provider.sink().disconnected();
    assert_eq!(kinds(&recorder.take()), vec![EventKind::Disconnected]);

    provider.sink().tangibles_updated(Vec::new());
    engine.tick();

    assert!(recorder.is_empty());
    assert!(engine.tangible(7).is_some());
}

#[test]
fn test_pattern_replacement_publishes_once_and_keeps_links() {
    let (engine, provider, recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    engine.tick();
    recorder.take();

    provider
        .sink()
        .patterns_updated(vec![Pattern::new(2, "dial"), Pattern::new(3, "slider")]);

    let events = recorder.take();
    assert_eq!(kinds(&events), vec![EventKind::PatternsChanged]);
    match &events[0] {
        EngineEvent::PatternsChanged(patterns) => assert_eq!(patterns.len(), 2),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(engine.pattern(1).is_none());
    assert_eq!(engine.pattern(3).unwrap().name, "slider");
    assert_eq!(engine.patterns().len(), 2);

    // Already resolved links survive the swap
    assert_eq!(
        engine.tangible(7).unwrap().pattern_name().as_deref(),
        Some("puck")
    );
}

#[test]
fn test_notifications_from_foreign_thread_wait_for_tick() {
    let (engine, provider) = scripted_engine();
    let recorder = EventRecorder::new();
    engine.subscribe(&recorder);
    engine.init();

    let p = provider.clone();
    thread::spawn(move || {
        p.sink().connected();
        p.sink().patterns_updated(vec![Pattern::new(1, "puck")]);
        p.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    })
    .join()
    .unwrap();

    assert!(recorder.is_empty());
    assert!(!engine.is_connected());

    engine.tick();

    assert!(engine.is_connected());
    assert_eq!(
        kinds(&recorder.take()),
        vec![
            EventKind::Connected,
            EventKind::PatternsChanged,
            EventKind::TangibleAdded
        ]
    );
    assert_eq!(
        engine.tangible(7).unwrap().pattern_name().as_deref(),
        Some("puck")
    );
}

#[test]
fn test_snapshots_racing_ticks_apply_exactly_once() {
    const SNAPSHOTS: i32 = 2_000;

    let (engine, provider, recorder) = connected_engine();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let provider = provider.clone();
        let done = done.clone();
        thread::spawn(move || {
            let sink = provider.sink();
            for id in 0..SNAPSHOTS {
                sink.tangibles_updated(vec![Tangible::new(id, 1)]);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        engine.tick();
    }
    producer.join().unwrap();
    engine.tick();

    let events = recorder.take();
    let of_kind = |kind: EventKind| {
        let mut ids: Vec<i32> = events
            .iter()
            .filter(|e| e.kind() == kind)
            .filter_map(|e| e.tangible())
            .map(|t| t.id())
            .collect();
        ids.sort_unstable();
        ids
    };

    assert_eq!(of_kind(EventKind::TangibleAdded), (0..SNAPSHOTS).collect::<Vec<_>>());

    let removed = of_kind(EventKind::TangibleRemoved);
    let mut distinct = removed.clone();
    distinct.dedup();
    assert_eq!(removed, distinct);

    // Whatever is still live arrived in the last batch
    let live = engine.tangibles();
    assert!(live.iter().any(|t| t.id() == SNAPSHOTS - 1));
    assert_eq!(removed.len() + live.len(), SNAPSHOTS as usize);
}

#[test]
fn test_connect_requests_patterns() {
    let (engine, provider) = scripted_engine();
    engine.init();
    provider.sink().connected();

    assert!(engine.is_connected());
    assert_eq!(provider.pattern_requests.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_to_connect_is_published() {
    let (engine, provider) = scripted_engine();
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    engine.on_engine_failed_to_connect(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.init();
    provider.sink().failed_to_connect();

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!engine.is_connected());
}

#[test]
fn test_init_and_deinit_are_idempotent() {
    let (engine, provider) = scripted_engine();

    engine.init();
    engine.init();
    assert!(engine.is_initialized());
    assert_eq!(provider.starts.load(Ordering::SeqCst), 1);

    engine.deinit();
    engine.deinit();
    assert!(!engine.is_initialized());
    assert_eq!(provider.disposes.load(Ordering::SeqCst), 1);

    engine.init();
    assert_eq!(provider.starts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_drop_disposes_provider() {
    let (engine, provider) = scripted_engine();
    engine.init();
    drop(engine);
    assert_eq!(provider.disposes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_requires_init() {
    let (engine, provider) = scripted_engine();

    assert!(matches!(
        engine.set_patterns(Vec::new()),
        Err(TangibleError::Engine(EngineError::NotInitialized))
    ));
    assert!(matches!(
        engine.request_patterns(),
        Err(TangibleError::Engine(EngineError::NotInitialized))
    ));

    engine.update_pointers(vec![Pointer::new(1, 0.0, 0.0)]);
    assert!(provider.pointers.lock().is_empty());

    engine.init();
    engine.update_pointers(vec![Pointer::new(1, 0.0, 0.0)]);
    assert_eq!(provider.pointers.lock().len(), 1);
    assert!(engine.request_patterns().is_ok());
}

#[test]
fn test_pointer_association() {
    let (engine, provider, _recorder) = connected_engine();

    provider.sink().tangibles_updated(vec![
        Tangible::new(7, 1).with_pointer_ids(vec![1, 2, 3]),
    ]);
    engine.tick();

    let pointers = vec![
        Pointer::new(1, 0.0, 0.0),
        Pointer::new(4, 0.0, 0.0),
        Pointer::new(3, 0.0, 0.0),
    ];
    let associated: Vec<i32> = engine
        .associated_pointers(&pointers)
        .iter()
        .map(|p| p.id)
        .collect();
    let unassociated: Vec<i32> = engine
        .unassociated_pointers(&pointers)
        .iter()
        .map(|p| p.id)
        .collect();

    assert_eq!(associated, vec![1, 3]);
    assert_eq!(unassociated, vec![4]);
}

struct ConnectionWatcher {
    connected: AtomicUsize,
}

impl OnEngineConnected for ConnectionWatcher {
    fn on_engine_connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }
}

impl Subscriber for ConnectionWatcher {
    fn as_engine_connected(self: Arc<Self>) -> Option<Arc<dyn OnEngineConnected>> {
        Some(self)
    }
}

#[test]
fn test_late_subscriber_is_told_about_connection() {
    let (engine, _provider, _recorder) = connected_engine();
    let watcher = Arc::new(ConnectionWatcher {
        connected: AtomicUsize::new(0),
    });

    engine.subscribe(&watcher);
    assert_eq!(watcher.connected.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subscribe_is_idempotent() {
    let (engine, provider) = scripted_engine();
    let watcher = Arc::new(ConnectionWatcher {
        connected: AtomicUsize::new(0),
    });
    engine.subscribe(&watcher);
    engine.subscribe(&watcher);

    engine.init();
    provider.sink().connected();
    assert_eq!(watcher.connected.load(Ordering::SeqCst), 1);

    engine.unsubscribe(&watcher);
    provider.sink().disconnected();
    provider.sink().connected();
    assert_eq!(watcher.connected.load(Ordering::SeqCst), 1);
}

struct AddCounter {
    added: AtomicUsize,
}

impl OnTangibleAdded for AddCounter {
    fn on_tangible_added(&self, _tangible: &TangibleHandle) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }
}

impl Subscriber for AddCounter {
    fn as_tangible_added(self: Arc<Self>) -> Option<Arc<dyn OnTangibleAdded>> {
        Some(self)
    }
}

#[test]
fn test_subscriber_without_capability_is_ignored() {
    let (engine, provider, _recorder) = connected_engine();
    let counter = Arc::new(AddCounter {
        added: AtomicUsize::new(0),
    });
    engine.subscribe(&counter);

    provider.sink().disconnected();
    provider.sink().connected();
    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    engine.tick();

    assert_eq!(counter.added.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_subscriptions() {
    let (engine, provider, _recorder) = connected_engine();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    let added = engine.on_tangible_added(move |t| log.lock().push(("added", t.id())));
    let log = seen.clone();
    engine.on_tangible_removed(move |t| log.lock().push(("removed", t.id())));

    provider.sink().tangibles_updated(vec![Tangible::new(7, 1)]);
    engine.tick();

    assert!(engine.unsubscribe_callback(&added));
    assert!(!engine.unsubscribe_callback(&added));

    provider.sink().tangibles_updated(vec![Tangible::new(8, 1)]);
    engine.tick();

    assert_eq!(*seen.lock(), vec![("added", 7), ("removed", 7)]);
}

#[test]
fn test_simulator_end_to_end() {
    let mut profile = EngineProfile::default_profile();
    profile.patterns.push(Pattern::new(5, "dial").with_radius(40.0));

    let engine = TangibleEngine::with_simulator(profile);
    let recorder = EventRecorder::new();
    engine.subscribe(&recorder);
    engine.init();

    assert!(engine.is_connected());
    assert_eq!(
        kinds(&recorder.take()),
        vec![EventKind::PatternsChanged, EventKind::Connected]
    );

    let simulator = engine.simulator().unwrap().clone();
    let id = simulator.spawn(5, 300.0, 400.0, 90.0);
    engine.update_pointers(Vec::new());
    engine.tick();

    let events = recorder.take();
    assert_eq!(kinds(&events), vec![EventKind::TangibleAdded]);
    let handle = engine.tangible(id).unwrap();
    assert_eq!(handle.pattern_name().as_deref(), Some("dial"));
    assert_eq!(handle.radius(), Some(40.0));

    simulator.move_to(id, 310.0, 400.0);
    engine.update_pointers(Vec::new());
    engine.tick();
    assert_eq!(kinds(&recorder.take()), vec![EventKind::TangibleUpdated]);
    assert_eq!(handle.position().x, 310.0);

    simulator.remove(id);
    engine.update_pointers(Vec::new());
    engine.tick();
    assert_eq!(kinds(&recorder.take()), vec![EventKind::TangibleRemoved]);
    assert!(engine.tangibles().is_empty());

    engine.deinit();
    assert!(!engine.is_connected());
    assert_eq!(kinds(&recorder.take()), vec![EventKind::Disconnected]);
}

#[test]
fn test_service_end_to_end_over_mock_channel() {
    let connector = Arc::new(MockConnector::new());
    let engine = TangibleEngine::with_connector(connector.clone(), ClientConfig::default());
    let recorder = EventRecorder::new();
    engine.subscribe(&recorder);
    engine.init();

    assert!(engine.is_connected());
    assert!(engine.client().is_some());
    assert_eq!(kinds(&recorder.take()), vec![EventKind::Connected]);

    let channel = connector.last_channel().unwrap();
    // The connect handler asked for the pattern set
    assert_eq!(channel.sent().len(), 1);

    let inject = |json: &str| {
        let frame = encode_frame(json.as_bytes(), MAX_FRAME_SIZE).unwrap();
        channel.inject(&frame);
    };

    inject(r#"{"TYPE":2,"PATTERNS":[{"PatternId":4,"Name":"knob","Radius":25.0}],"STATUS":true,"ID":1}"#);
    inject(r#"{"TYPE":3,"TANGIBLES":[{"Id":11,"PatternId":4,"X":50.0,"Y":60.0,"R":0.0,"PointerIds":[1,2,3]}],"STATUS":true,"ID":2}"#);
    engine.tick();

    let events = recorder.take();
    assert_eq!(
        kinds(&events),
        vec![EventKind::PatternsChanged, EventKind::TangibleAdded]
    );
    let t = engine.tangible(11).unwrap();
    assert_eq!(t.pattern_name().as_deref(), Some("knob"));
    assert_eq!(t.pointer_ids(), vec![1, 2, 3]);

    channel.remote_close();
    assert!(!engine.is_connected());
    assert_eq!(kinds(&recorder.take()), vec![EventKind::Disconnected]);

    engine.heartbeat();
    assert_eq!(connector.attempts(), 2);
    assert!(engine.is_connected());
}
