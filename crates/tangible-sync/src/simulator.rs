//! Offline simulator provider
//!
//! Stands in for the recognition service when no touch table is attached.
//! The host places, moves and removes simulated tangibles; every pointer
//! push (or an explicit [`SimulatorProvider::invoke_update`]) reports the
//! current set as a snapshot, exactly like the service would.

use std::path::Path;
use std::sync::Weak;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use tangible_core::{EngineProfile, Pattern, Pointer, Provider, ProviderSink, Tangible};

/// Pointer ids reported for every simulated tangible
pub const SIMULATED_POINTER_IDS: [i32; 3] = [1, 2, 3];

/// Provider backed by an [`EngineProfile`] and host-placed tangibles
pub struct SimulatorProvider {
    profile: RwLock<EngineProfile>,
    tangibles: Mutex<Vec<Tangible>>,
    next_id: AtomicI32,
    sink: Weak<dyn ProviderSink>,
}

impl SimulatorProvider {
    pub fn new(profile: EngineProfile, sink: Weak<dyn ProviderSink>) -> Self {
        Self {
            profile: RwLock::new(profile),
            tangibles: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1),
            sink,
        }
    }

    /// Load the profile at `path`, falling back to the default profile
    pub fn load_profile(path: Option<&Path>) -> EngineProfile {
        let Some(path) = path else {
            return EngineProfile::default_profile();
        };
        match EngineProfile::load(path) {
            Ok(profile) => {
                info!(
                    path = %path.display(),
                    patterns = profile.patterns.len(),
                    "Parsed profile"
                );
                profile
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default profile");
                EngineProfile::default_profile()
            }
        }
    }

    pub fn profile(&self) -> EngineProfile {
        self.profile.read().clone()
    }

    /// Place a tangible and return its id
    pub fn spawn(&self, pattern_id: i32, x: f32, y: f32, rotation_degrees: f32) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tangible = Tangible::new(id, pattern_id)
            .at(x, y)
            .rotated(rotation_degrees.to_radians())
            .with_pointer_ids(SIMULATED_POINTER_IDS.to_vec());
        self.tangibles.lock().push(tangible);
        debug!(tangible_id = id, pattern_id, "Simulated tangible placed");
        id
    }

    /// Move a tangible; returns false if no such tangible
    pub fn move_to(&self, id: i32, x: f32, y: f32) -> bool {
        self.with_tangible(id, |t| {
            t.x = x;
            t.y = y;
        })
    }

    /// Rotate a tangible; returns false if no such tangible
    pub fn rotate_to(&self, id: i32, rotation_degrees: f32) -> bool {
        self.with_tangible(id, |t| t.r = rotation_degrees.to_radians())
    }

    /// Take a tangible off the surface; returns false if no such tangible
    pub fn remove(&self, id: i32) -> bool {
        let mut tangibles = self.tangibles.lock();
        let before = tangibles.len();
        tangibles.retain(|t| t.id != id);
        tangibles.len() != before
    }

    /// Current simulated tangibles
    pub fn tangibles(&self) -> Vec<Tangible> {
        self.tangibles.lock().clone()
    }

    /// Report the current tangibles as a snapshot
    pub fn invoke_update(&self) {
        let snapshot = self.tangibles();
        if let Some(sink) = self.sink.upgrade() {
            sink.tangibles_updated(snapshot);
        }
    }

    fn with_tangible(&self, id: i32, update: impl FnOnce(&mut Tangible)) -> bool {
        let mut tangibles = self.tangibles.lock();
        match tangibles.iter_mut().find(|t| t.id == id) {
            Some(t) => {
                update(t);
                true
            }
            None => false,
        }
    }

    fn report_patterns(&self) {
        let patterns = self.profile.read().patterns.clone();
        if let Some(sink) = self.sink.upgrade() {
            sink.patterns_updated(patterns);
        }
    }
}

impl Provider for SimulatorProvider {
    fn start_provider(&self) {
        info!(profile = %self.profile.read().config.name, "Simulator started");
        if let Some(sink) = self.sink.upgrade() {
            sink.connected();
        }
    }

    fn set_patterns(&self, patterns: Vec<Pattern>) {
        self.profile.write().patterns = patterns;
        self.report_patterns();
    }

    fn request_patterns(&self) {
        self.report_patterns();
    }

    fn update_pointers(&self, _pointers: Vec<Pointer>) {
        self.invoke_update();
    }

    fn dispose(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.disconnected();
        }
    }
}
