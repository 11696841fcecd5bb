//! Core traits for densecloud

use crate::{mesh::*, point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality
///
/// Results are `(index, distance)` pairs ordered by ascending distance, with
/// ties broken by ascending index so that repeated queries are reproducible.
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Trait for objects with an axis-aligned spatial extent
pub trait Bounded {
    /// Get the bounding box of the object, `None` when it has no points
    fn bounding_box(&self) -> Option<(Point3f, Point3f)>;

    /// Length of the bounding box diagonal, 0 for an empty object
    fn extent(&self) -> f32 {
        self.bounding_box()
            .map(|(min, max)| (max - min).norm())
            .unwrap_or(0.0)
    }
}

fn bounds_of<I: IntoIterator<Item = Point3f>>(points: I) -> Option<(Point3f, Point3f)> {
    points.into_iter().fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((min, max)) => Some((min.inf(&p), max.sup(&p))),
    })
}

impl<T> Bounded for PointCloud<T>
where
    T: Copy,
    Point3f: From<T>,
{
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds_of(self.points.iter().map(|p| Point3f::from(*p)))
    }
}

impl Bounded for TriangleMesh {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds_of(self.vertices.iter().copied())
    }
}
