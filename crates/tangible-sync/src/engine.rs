//! Tangible state synchronization engine
//!
//! The engine keeps the authoritative local model of the tangibles on the
//! surface. Providers hand it complete snapshots from their own threads;
//! the owner thread reconciles the latest snapshot against the live records
//! on every [`TangibleEngine::tick`] and publishes each transition once.
//!
//! ## Threading
//!
//! - Snapshot ingestion only appends to a pending buffer under a lock.
//! - Connection and pattern notifications are marshalled through the
//!   [`Dispatcher`] and handled on the owner thread.
//! - Reconciliation and every publish happen on the owner thread.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, trace, warn};

use tangible_core::{
    Connector, EngineError, EngineProfile, Pattern, PatternSet, Pointer, Provider, ProviderSink,
    Tangible, TangibleHandle, TangibleResult,
};
use tangible_transport::{ClientConfig, ProtocolClient, TcpConnector};

use crate::config::{EngineConfig, ProviderMode};
use crate::dispatcher::Dispatcher;
use crate::publisher::{Publishers, Subscriber, Subscription};
use crate::simulator::SimulatorProvider;

/// Snapshots received since the last reconciliation
#[derive(Default)]
struct PendingSnapshot {
    tangibles: Vec<Tangible>,
    ready: bool,
}

/// Live records and the active pattern set
#[derive(Default)]
struct EngineState {
    tangibles: Vec<TangibleHandle>,
    by_id: HashMap<i32, TangibleHandle>,
    patterns: Arc<Vec<Pattern>>,
    pattern_set: PatternSet,
}

struct EngineShared {
    this: Weak<EngineShared>,
    provider: Arc<dyn Provider>,
    dispatcher: Dispatcher,
    publishers: Publishers,
    pending: Mutex<PendingSnapshot>,
    state: RwLock<EngineState>,
    initialized: AtomicBool,
    connected: AtomicBool,
}

/// The concrete provider behind an engine, for provider-specific controls
#[derive(Clone)]
pub enum ProviderBackend {
    Service(Arc<ProtocolClient>),
    Simulator(Arc<SimulatorProvider>),
    Custom,
}

/// Client-side model of the tangibles recognized by a provider
///
/// Create it on the thread that will call [`tick`](Self::tick); that thread
/// becomes the owner thread for every publish.
pub struct TangibleEngine {
    shared: Arc<EngineShared>,
    backend: ProviderBackend,
}

impl TangibleEngine {
    /// Build an engine around a provider
    ///
    /// `make_provider` receives the sink the provider must report to.
    pub fn new<F>(make_provider: F) -> Self
    where
        F: FnOnce(Weak<dyn ProviderSink>) -> Arc<dyn Provider>,
    {
        Self {
            shared: EngineShared::build(make_provider),
            backend: ProviderBackend::Custom,
        }
    }

    /// Build an engine with the provider selected by `config`
    ///
    /// Service mode runs its socket tasks on `runtime`.
    pub fn from_config(config: &EngineConfig, runtime: Handle) -> TangibleResult<Self> {
        config.validate()?;

        match config.mode {
            ProviderMode::Service => {
                let connector: Arc<dyn Connector> = Arc::new(
                    TcpConnector::new(runtime).with_connect_timeout(config.connect_timeout()),
                );
                info!(destination = %config.destination(), "Initializing service connection");
                Ok(Self::with_connector(connector, config.client_config()))
            }
            ProviderMode::Simulator => {
                let profile = SimulatorProvider::load_profile(config.profile_path.as_deref());
                Ok(Self::with_simulator(profile))
            }
        }
    }

    /// Build an engine talking to the recognition service through `connector`
    pub fn with_connector(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        let mut client = None;
        let shared = EngineShared::build(|sink| {
            let c = Arc::new(ProtocolClient::new(connector, config, sink));
            client = Some(Arc::clone(&c));
            c as Arc<dyn Provider>
        });
        Self {
            shared,
            backend: client.map_or(ProviderBackend::Custom, ProviderBackend::Service),
        }
    }

    /// Build an engine backed by the offline simulator
    pub fn with_simulator(profile: EngineProfile) -> Self {
        let mut simulator = None;
        let shared = EngineShared::build(|sink| {
            let s = Arc::new(SimulatorProvider::new(profile, sink));
            simulator = Some(Arc::clone(&s));
            s as Arc<dyn Provider>
        });
        info!("Initializing simulator");
        Self {
            shared,
            backend: simulator.map_or(ProviderBackend::Custom, ProviderBackend::Simulator),
        }
    }

    /// The provider-specific backend
    pub fn backend(&self) -> &ProviderBackend {
        &self.backend
    }

    /// The protocol client, when the engine talks to the service
    pub fn client(&self) -> Option<&Arc<ProtocolClient>> {
        match &self.backend {
            ProviderBackend::Service(c) => Some(c),
            _ => None,
        }
    }

    /// The simulator, when the engine runs on one
    pub fn simulator(&self) -> Option<&Arc<SimulatorProvider>> {
        match &self.backend {
            ProviderBackend::Simulator(s) => Some(s),
            _ => None,
        }
    }

    /// Start the provider. Calling it again while initialized does nothing.
    pub fn init(&self) {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Engine initialized");
        self.shared.provider.start_provider();
    }

    /// Dispose the provider. Calling it again while not initialized does nothing.
    pub fn deinit(&self) {
        if !self.shared.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Engine deinitialized");
        self.shared.provider.dispose();
    }

    /// Run queued notifications, then reconcile the latest snapshot
    ///
    /// Must be called on the owner thread.
    pub fn tick(&self) {
        if !self.shared.dispatcher.is_owner_thread() {
            warn!("Engine ticked from a foreign thread, ignoring");
            return;
        }
        self.shared.dispatcher.drain();
        self.shared.reconcile();
    }

    /// Keep the service connection alive, reconnecting if it dropped
    ///
    /// Only the service provider has a connection to probe.
    pub fn heartbeat(&self) {
        if let ProviderBackend::Service(client) = &self.backend {
            client.heartbeat();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Live tangibles in discovery order
    pub fn tangibles(&self) -> Vec<TangibleHandle> {
        self.shared.state.read().tangibles.clone()
    }

    pub fn tangible(&self, id: i32) -> Option<TangibleHandle> {
        self.shared.state.read().by_id.get(&id).cloned()
    }

    /// The active pattern set
    pub fn patterns(&self) -> Arc<Vec<Pattern>> {
        Arc::clone(&self.shared.state.read().patterns)
    }

    pub fn pattern(&self, pattern_id: i32) -> Option<Arc<Pattern>> {
        self.shared.state.read().pattern_set.get(pattern_id).cloned()
    }

    /// Pointers that some live tangible is built from
    pub fn associated_pointers(&self, pointers: &[Pointer]) -> Vec<Pointer> {
        let used = self.shared.used_pointer_ids();
        pointers.iter().filter(|p| used.contains(&p.id)).copied().collect()
    }

    /// Pointers that belong to no live tangible
    pub fn unassociated_pointers(&self, pointers: &[Pointer]) -> Vec<Pointer> {
        let used = self.shared.used_pointer_ids();
        pointers.iter().filter(|p| !used.contains(&p.id)).copied().collect()
    }

    /// Forward pointer samples to the provider
    pub fn update_pointers(&self, pointers: Vec<Pointer>) {
        if !self.is_initialized() {
            trace!("Engine not initialized, dropping pointers");
            return;
        }
        self.shared.provider.update_pointers(pointers);
    }

    pub fn set_patterns(&self, patterns: Vec<Pattern>) -> TangibleResult<()> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized.into());
        }
        self.shared.provider.set_patterns(patterns);
        Ok(())
    }

    pub fn request_patterns(&self) -> TangibleResult<()> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized.into());
        }
        self.shared.provider.request_patterns();
        Ok(())
    }

    /// Register an interface-style subscriber for each capability it exposes
    ///
    /// A subscriber to connection events that joins while the engine is
    /// connected is told so immediately.
    pub fn subscribe<S: Subscriber + ?Sized + 'static>(&self, subscriber: &Arc<S>) {
        let wants_connected = self.shared.publishers.subscribe(subscriber);
        if wants_connected && self.is_connected() {
            if let Some(s) = Arc::clone(subscriber).as_engine_connected() {
                s.on_engine_connected();
            }
        }
    }

    pub fn unsubscribe<S: Subscriber + ?Sized + 'static>(&self, subscriber: &Arc<S>) {
        self.shared.publishers.unsubscribe(subscriber);
    }

    pub fn on_engine_connected<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.publishers.on_engine_connected(f)
    }

    pub fn on_engine_disconnected<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.publishers.on_engine_disconnected(f)
    }

    pub fn on_engine_failed_to_connect<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.publishers.on_engine_failed_to_connect(f)
    }

    pub fn on_patterns_changed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<Vec<Pattern>>) + Send + Sync + 'static,
    {
        self.shared.publishers.on_patterns_changed(f)
    }

    pub fn on_tangible_added<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        self.shared.publishers.on_tangible_added(f)
    }

    pub fn on_tangible_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        self.shared.publishers.on_tangible_updated(f)
    }

    pub fn on_tangible_removed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        self.shared.publishers.on_tangible_removed(f)
    }

    pub fn unsubscribe_callback(&self, subscription: &Subscription) -> bool {
        self.shared.publishers.unsubscribe_callback(subscription)
    }

    /// Observe panics raised by marshalled notifications
    pub fn on_dispatch_error<F>(&self, handler: F)
    where
        F: Fn(&EngineError) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on_error(handler);
    }
}

impl Drop for TangibleEngine {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl EngineShared {
    fn build<F>(make_provider: F) -> Arc<Self>
    where
        F: FnOnce(Weak<dyn ProviderSink>) -> Arc<dyn Provider>,
    {
        Arc::new_cyclic(|this: &Weak<EngineShared>| {
            let sink: Weak<dyn ProviderSink> = this.clone();
            EngineShared {
                this: this.clone(),
                provider: make_provider(sink),
                dispatcher: Dispatcher::new(),
                publishers: Publishers::new(),
                pending: Mutex::new(PendingSnapshot::default()),
                state: RwLock::new(EngineState::default()),
                initialized: AtomicBool::new(false),
                connected: AtomicBool::new(false),
            }
        })
    }

    /// Run `action` against the engine on the owner thread
    fn marshal<F>(&self, action: F)
    where
        F: FnOnce(&EngineShared) + Send + 'static,
    {
        let engine = self.this.clone();
        self.dispatcher.dispatch(move || {
            if let Some(engine) = engine.upgrade() {
                action(&engine);
            }
        });
    }

    fn used_pointer_ids(&self) -> HashSet<i32> {
        self.state
            .read()
            .tangibles
            .iter()
            .flat_map(|t| t.pointer_ids())
            .collect()
    }

    fn handle_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.provider.request_patterns();
        info!("Engine connected");
        self.publishers
            .engine_connected
            .publish(|s| s.on_engine_connected());
    }

    fn handle_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("Engine disconnected");
        self.publishers
            .engine_disconnected
            .publish(|s| s.on_engine_disconnected());
    }

    fn handle_failed_to_connect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        warn!("Engine failed to connect");
        self.publishers
            .engine_failed_to_connect
            .publish(|s| s.on_engine_failed_to_connect());
    }

    fn replace_patterns(&self, patterns: Vec<Pattern>) {
        let set = PatternSet::new(patterns.clone());
        let shared = Arc::new(patterns);
        {
            let mut state = self.state.write();
            state.pattern_set = set;
            state.patterns = Arc::clone(&shared);
        }
        info!(count = shared.len(), "Patterns changed");
        self.publishers
            .patterns_changed
            .publish(|s| s.on_patterns_changed(&shared));
    }

    #[instrument(skip(self), level = "trace")]
    fn reconcile(&self) {
        if !self.initialized.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return;
        }

        let incoming = {
            let mut pending = self.pending.lock();
            if !pending.ready {
                return;
            }
            pending.ready = false;
            std::mem::take(&mut pending.tangibles)
        };
        let working = collapse_duplicates(incoming);

        let mut added = Vec::new();
        let mut updated = Vec::new();
        let removed: Vec<TangibleHandle>;
        {
            let state = self.state.read();
            for tangible in &working {
                match state.by_id.get(&tangible.id) {
                    Some(live) => {
                        live.apply_update(tangible);
                        updated.push(live.clone());
                    }
                    None => {
                        let pattern = state.pattern_set.get(tangible.pattern_id).cloned();
                        if pattern.is_none() {
                            error!(
                                tangible_id = tangible.id,
                                pattern_id = tangible.pattern_id,
                                "Could not find matching pattern for tangible"
                            );
                        }
                        added.push(TangibleHandle::new(tangible.clone(), pattern));
                    }
                }
            }

            let present: HashSet<i32> = working.iter().map(|t| t.id).collect();
            removed = state
                .tangibles
                .iter()
                .filter(|t| !present.contains(&t.id()))
                .cloned()
                .collect();
        }

        for tangible in &added {
            {
                let mut state = self.state.write();
                state.by_id.insert(tangible.id(), tangible.clone());
                state.tangibles.push(tangible.clone());
            }
            debug!(
                tangible_id = tangible.id(),
                pattern_id = tangible.pattern_id(),
                "Tangible added"
            );
            self.publishers
                .tangible_added
                .publish(|s| s.on_tangible_added(tangible));
        }

        for tangible in &updated {
            self.publishers
                .tangible_updated
                .publish(|s| s.on_tangible_updated(tangible));
        }

        for tangible in &removed {
            {
                let mut state = self.state.write();
                state.by_id.remove(&tangible.id());
                state.tangibles.retain(|t| !t.ptr_eq(tangible));
            }
            debug!(tangible_id = tangible.id(), "Tangible removed");
            self.publishers
                .tangible_removed
                .publish(|s| s.on_tangible_removed(tangible));
        }
    }
}

impl ProviderSink for EngineShared {
    fn connected(&self) {
        self.marshal(|engine| engine.handle_connected());
    }

    fn disconnected(&self) {
        self.marshal(|engine| engine.handle_disconnected());
    }

    fn failed_to_connect(&self) {
        self.marshal(|engine| engine.handle_failed_to_connect());
    }

    fn tangibles_updated(&self, tangibles: Vec<Tangible>) {
        let mut pending = self.pending.lock();
        pending.tangibles.extend(tangibles);
        pending.ready = true;
    }

    fn patterns_updated(&self, patterns: Vec<Pattern>) {
        self.marshal(move |engine| engine.replace_patterns(patterns));
    }
}

/// Keep one entry per id: the latest values, at the first position
fn collapse_duplicates(incoming: Vec<Tangible>) -> Vec<Tangible> {
    let mut index: HashMap<i32, usize> = HashMap::with_capacity(incoming.len());
    let mut working: Vec<Tangible> = Vec::with_capacity(incoming.len());
    for tangible in incoming {
        match index.get(&tangible.id) {
            Some(&i) => working[i] = tangible,
            None => {
                index.insert(tangible.id, working.len());
                working.push(tangible);
            }
        }
    }
    working
}
