//! Geometry primitives, pointer samples and recognition patterns
//!
//! Field names on the wire are PascalCase (`PatternId`, `KeepAlivePoints`,
//! `X`, `Y`), matching what the recognition service emits.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A 2D coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A raw input contact point (e.g. one finger on the touch surface)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Pointer {
    /// Raw input-channel id
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

impl Pointer {
    pub fn new(id: i32, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }
}

/// Template describing the geometry of a recognizable physical object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Pattern {
    /// Unique within a pattern set
    pub pattern_id: i32,
    /// Human-readable name
    pub name: String,
    /// Minimum number of points required to keep instances alive
    pub keep_alive_points: i32,
    /// Offset of the tangible center from the centroid of its touch points
    pub offset: Point,
    /// Relative offsets of every touch point defining the pattern
    pub points: Vec<Point>,
    /// Nominal radius
    pub radius: f32,
}

impl Pattern {
    /// Create a pattern with an id and a name; geometry left empty
    pub fn new(pattern_id: i32, name: impl Into<String>) -> Self {
        Self {
            pattern_id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_keep_alive_points(mut self, count: i32) -> Self {
        self.keep_alive_points = count;
        self
    }

    pub fn with_offset(mut self, offset: Point) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }
}

/// The active pattern collection plus its id index
///
/// Replaced wholesale whenever the service reports a new set; never patched.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Arc<Pattern>>,
    by_id: HashMap<i32, Arc<Pattern>>,
}

impl PatternSet {
    /// Build a set, preserving order. A later duplicate id wins in the index.
    pub fn new(patterns: Vec<Pattern>) -> Self {
        let patterns: Vec<Arc<Pattern>> = patterns.into_iter().map(Arc::new).collect();
        let by_id = patterns
            .iter()
            .map(|p| (p.pattern_id, Arc::clone(p)))
            .collect();
        Self { patterns, by_id }
    }

    pub fn get(&self, pattern_id: i32) -> Option<&Arc<Pattern>> {
        self.by_id.get(&pattern_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pattern>> {
        self.patterns.iter()
    }

    /// Owned copies of the patterns, in arrival order
    pub fn to_vec(&self) -> Vec<Pattern> {
        self.patterns.iter().map(|p| (**p).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_json_field_names() {
        let pattern = Pattern::new(7, "dial")
            .with_keep_alive_points(3)
            .with_offset(Point::new(1.0, -2.0))
            .with_points(vec![Point::new(0.0, 10.0)])
            .with_radius(42.5);

        let json = serde_json::to_string(&pattern).unwrap();
        assert!(json.contains("\"PatternId\":7"));
        assert!(json.contains("\"Name\":\"dial\""));
        assert!(json.contains("\"KeepAlivePoints\":3"));
        assert!(json.contains("\"Offset\":{\"X\":1.0,\"Y\":-2.0}"));
        assert!(json.contains("\"Radius\":42.5"));
    }

    #[test]
    fn test_pattern_missing_fields_default() {
        let pattern: Pattern = serde_json::from_str(r#"{"PatternId":3}"#).unwrap();
        assert_eq!(pattern.pattern_id, 3);
        assert!(pattern.name.is_empty());
        assert_eq!(pattern.offset, Point::default());
        assert!(pattern.points.is_empty());
    }

    #[test]
    fn test_pointer_from_json() {
        let pointer: Pointer = serde_json::from_str(r#"{"Id":4,"X":12,"Y":8.5}"#).unwrap();
        assert_eq!(pointer, Pointer::new(4, 12.0, 8.5));
    }

    #[test]
    fn test_pattern_set_lookup() {
        let set = PatternSet::new(vec![Pattern::new(1, "a"), Pattern::new(2, "b")]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(2).unwrap().name, "b");
        assert!(set.get(3).is_none());

        let names: Vec<_> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_pattern_set_duplicate_id_last_wins() {
        let set = PatternSet::new(vec![Pattern::new(1, "old"), Pattern::new(1, "new")]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().name, "new");
    }
}
