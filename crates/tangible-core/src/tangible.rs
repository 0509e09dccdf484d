//! Tangible instances
//!
//! [`Tangible`] is the plain value carried in snapshots from the service.
//! [`TangibleHandle`] is the live record the engine keeps for every tangible
//! currently on the surface. The engine mutates a handle in place on every
//! update, so a handle held by application code always reflects the latest
//! position and rotation until the tangible is removed.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::pattern::{Pattern, Point};

/// A recognized tangible as reported in one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Tangible {
    /// Instance id, unique among live tangibles
    pub id: i32,
    /// Foreign key into the active pattern set
    pub pattern_id: i32,
    pub x: f32,
    pub y: f32,
    /// Rotation in radians
    pub r: f32,
    /// Pointer ids used to recognize this tangible
    pub pointer_ids: Vec<i32>,
}

impl Tangible {
    pub fn new(id: i32, pattern_id: i32) -> Self {
        Self {
            id,
            pattern_id,
            ..Default::default()
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn rotated(mut self, r: f32) -> Self {
        self.r = r;
        self
    }

    pub fn with_pointer_ids(mut self, pointer_ids: Vec<i32>) -> Self {
        self.pointer_ids = pointer_ids;
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug)]
struct TangibleState {
    x: f32,
    y: f32,
    r: f32,
    pointer_ids: Vec<i32>,
    pattern: Option<Arc<Pattern>>,
}

#[derive(Debug)]
struct TangibleRecord {
    id: i32,
    pattern_id: i32,
    state: RwLock<TangibleState>,
}

/// Shared, identity-preserving record of one live tangible
///
/// Cloning a handle is cheap and yields the same record; use
/// [`TangibleHandle::ptr_eq`] to compare identity. Readers never block
/// the engine for longer than a field copy.
#[derive(Clone)]
pub struct TangibleHandle {
    inner: Arc<TangibleRecord>,
}

impl TangibleHandle {
    /// Create a record from a snapshot value with its resolved pattern
    pub fn new(tangible: Tangible, pattern: Option<Arc<Pattern>>) -> Self {
        Self {
            inner: Arc::new(TangibleRecord {
                id: tangible.id,
                pattern_id: tangible.pattern_id,
                state: RwLock::new(TangibleState {
                    x: tangible.x,
                    y: tangible.y,
                    r: tangible.r,
                    pointer_ids: tangible.pointer_ids,
                    pattern,
                }),
            }),
        }
    }

    pub fn id(&self) -> i32 {
        self.inner.id
    }

    pub fn pattern_id(&self) -> i32 {
        self.inner.pattern_id
    }

    pub fn position(&self) -> Point {
        let state = self.inner.state.read();
        Point::new(state.x, state.y)
    }

    /// Rotation in radians
    pub fn rotation(&self) -> f32 {
        self.inner.state.read().r
    }

    pub fn pointer_ids(&self) -> Vec<i32> {
        self.inner.state.read().pointer_ids.clone()
    }

    pub fn uses_pointer(&self, pointer_id: i32) -> bool {
        self.inner.state.read().pointer_ids.contains(&pointer_id)
    }

    /// The pattern resolved when this tangible was added, if any
    pub fn pattern(&self) -> Option<Arc<Pattern>> {
        self.inner.state.read().pattern.clone()
    }

    /// Name of the resolved pattern; `None` when unresolved
    pub fn pattern_name(&self) -> Option<String> {
        self.inner.state.read().pattern.as_ref().map(|p| p.name.clone())
    }

    /// Pattern radius; `None` when unresolved
    pub fn radius(&self) -> Option<f32> {
        self.inner.state.read().pattern.as_ref().map(|p| p.radius)
    }

    /// Points needed to keep this tangible alive; `None` when unresolved
    pub fn keep_alive_points(&self) -> Option<i32> {
        self.inner
            .state
            .read()
            .pattern
            .as_ref()
            .map(|p| p.keep_alive_points)
    }

    /// Center offset from the touch point centroid; zero when unresolved
    pub fn offset(&self) -> Point {
        self.inner
            .state
            .read()
            .pattern
            .as_ref()
            .map(|p| p.offset)
            .unwrap_or_default()
    }

    /// Defining point offsets of the pattern; `None` when unresolved
    pub fn pattern_points(&self) -> Option<Vec<Point>> {
        self.inner
            .state
            .read()
            .pattern
            .as_ref()
            .map(|p| p.points.clone())
    }

    /// Immutable copy of the current values
    pub fn snapshot(&self) -> Tangible {
        let state = self.inner.state.read();
        Tangible {
            id: self.inner.id,
            pattern_id: self.inner.pattern_id,
            x: state.x,
            y: state.y,
            r: state.r,
            pointer_ids: state.pointer_ids.clone(),
        }
    }

    /// Whether both handles refer to the same record
    pub fn ptr_eq(&self, other: &TangibleHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Apply the position and rotation of a newer snapshot in place
    ///
    /// Only the owning engine should call this.
    pub fn apply_update(&self, update: &Tangible) {
        let mut state = self.inner.state.write();
        state.x = update.x;
        state.y = update.y;
        state.r = update.r;
    }
}

impl fmt::Debug for TangibleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("TangibleHandle")
            .field("id", &self.inner.id)
            .field("pattern_id", &self.inner.pattern_id)
            .field("x", &state.x)
            .field("y", &state.y)
            .field("r", &state.r)
            .field("resolved", &state.pattern.is_some())
            .finish()
    }
}
