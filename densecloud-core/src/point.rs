//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A point that remembers which observation produced it
///
/// Dense reconstructions triangulate each point from a scene landmark;
/// `source_id` carries that landmark id through filtering so the surviving
/// points can be mapped back onto the dataset they were loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub position: Point3f,
    pub source_id: Option<u64>,
}

impl TrackedPoint {
    /// Create a point without a source id
    pub fn new(position: Point3f) -> Self {
        Self {
            position,
            source_id: None,
        }
    }

    /// Create a point tagged with the id of its source observation
    pub fn with_source(position: Point3f, source_id: u64) -> Self {
        Self {
            position,
            source_id: Some(source_id),
        }
    }
}

impl Default for TrackedPoint {
    fn default() -> Self {
        Self::new(Point3f::origin())
    }
}

impl From<TrackedPoint> for Point3f {
    fn from(point: TrackedPoint) -> Self {
        point.position
    }
}

impl From<Point3f> for TrackedPoint {
    fn from(position: Point3f) -> Self {
        Self::new(position)
    }
}
