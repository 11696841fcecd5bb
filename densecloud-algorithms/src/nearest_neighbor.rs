//! Nearest neighbor search implementations

use densecloud_core::{Error, NearestNeighborSearch, Point3f, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Subtrees smaller than this are built on the current thread.
const PARALLEL_BUILD_THRESHOLD: usize = 16 * 1024;

/// A neighbor candidate ordered by squared distance, then by index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_squared: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_squared
            .total_cmp(&other.distance_squared)
            .then(self.index.cmp(&other.index))
    }
}

fn into_results(mut candidates: Vec<Candidate>) -> Vec<(usize, f32)> {
    candidates.sort_unstable();
    candidates
        .into_iter()
        .map(|c| (c.index, c.distance_squared.sqrt()))
        .collect()
}

/// Balanced KD-tree for nearest neighbor search
///
/// The tree is stored implicitly: `order` holds point indices so that the
/// median of every range `lo..hi` sits at `lo + (hi - lo) / 2`, with its
/// split axis in `axes` at the same position. The tree is immutable; build a
/// new one when the underlying points change.
pub struct KdTree {
    points: Vec<Point3f>,
    order: Vec<usize>,
    axes: Vec<u8>,
}

impl KdTree {
    /// Build a tree over `points` in O(N log N).
    ///
    /// Fails with [`Error::InvalidInput`] if any coordinate is not finite.
    pub fn new(points: &[Point3f]) -> Result<Self> {
        if let Some(index) = points
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(Error::InvalidInput(format!(
                "point {} has non-finite coordinates",
                index
            )));
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut axes = vec![0u8; points.len()];
        build(points, &mut order, &mut axes);

        Ok(Self {
            points: points.to_vec(),
            order,
            axes,
        })
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points, in their original order
    pub fn points(&self) -> &[Point3f] {
        &self.points
    }

    fn search_k(
        &self,
        lo: usize,
        hi: usize,
        query: &Point3f,
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        if lo >= hi {
            return;
        }

        let mid = lo + (hi - lo) / 2;
        let index = self.order[mid];
        let point = &self.points[index];
        let candidate = Candidate {
            distance_squared: (point - query).norm_squared(),
            index,
        };

        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let axis = self.axes[mid] as usize;
        let diff = query[axis] - point[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search_k(near.0, near.1, query, k, heap);

        // Equal distances must still be visited so that lower indices win ties
        let visit_far = heap.len() < k
            || heap
                .peek()
                .is_some_and(|worst| diff * diff <= worst.distance_squared);
        if visit_far {
            self.search_k(far.0, far.1, query, k, heap);
        }
    }

    fn search_radius(
        &self,
        lo: usize,
        hi: usize,
        query: &Point3f,
        radius_squared: f32,
        found: &mut Vec<Candidate>,
    ) {
        if lo >= hi {
            return;
        }

        let mid = lo + (hi - lo) / 2;
        let index = self.order[mid];
        let point = &self.points[index];
        let distance_squared = (point - query).norm_squared();
        if distance_squared <= radius_squared {
            found.push(Candidate {
                distance_squared,
                index,
            });
        }

        let axis = self.axes[mid] as usize;
        let diff = query[axis] - point[axis];
        if diff <= 0.0 || diff * diff <= radius_squared {
            self.search_radius(lo, mid, query, radius_squared, found);
        }
        if diff >= 0.0 || diff * diff <= radius_squared {
            self.search_radius(mid + 1, hi, query, radius_squared, found);
        }
    }
}

/// Arrange `order` so that each range's median sits at its midpoint,
/// splitting along the axis of largest spread.
fn build(points: &[Point3f], order: &mut [usize], axes: &mut [u8]) {
    if order.is_empty() {
        return;
    }

    let axis = widest_axis(points, order);
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        points[a][axis]
            .total_cmp(&points[b][axis])
            .then(a.cmp(&b))
    });
    axes[mid] = axis as u8;

    let (left_order, rest_order) = order.split_at_mut(mid);
    let right_order = &mut rest_order[1..];
    let (left_axes, rest_axes) = axes.split_at_mut(mid);
    let right_axes = &mut rest_axes[1..];

    if left_order.len() >= PARALLEL_BUILD_THRESHOLD {
        rayon::join(
            || build(points, left_order, left_axes),
            || build(points, right_order, right_axes),
        );
    } else {
        build(points, left_order, left_axes);
        build(points, right_order, right_axes);
    }
}

fn widest_axis(points: &[Point3f], order: &[usize]) -> usize {
    let first = points[order[0]];
    let (min, max) = order
        .iter()
        .fold((first, first), |(min, max), &i| (min.inf(&points[i]), max.sup(&points[i])));
    let spread = max - min;
    if spread.x >= spread.y && spread.x >= spread.z {
        0
    } else if spread.y >= spread.z {
        1
    } else {
        2
    }
}

impl NearestNeighborSearch for KdTree {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.points.is_empty() {
            return Vec::new();
        }

        let k = k.min(self.points.len());
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.search_k(0, self.points.len(), query, k, &mut heap);
        into_results(heap.into_vec())
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if radius < 0.0 || self.points.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        self.search_radius(0, self.points.len(), query, radius * radius, &mut found);
        into_results(found)
    }
}

/// Simple brute force nearest neighbor search for small datasets
///
/// Serves as the reference implementation the KD-tree is checked against.
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn candidates<'a>(&'a self, query: &'a Point3f) -> impl Iterator<Item = Candidate> + 'a {
        self.points
            .iter()
            .enumerate()
            .map(move |(index, point)| Candidate {
                distance_squared: (point - query).norm_squared(),
                index,
            })
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let mut results = into_results(self.candidates(query).collect());
        results.truncate(k);
        results
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if radius < 0.0 {
            return Vec::new();
        }
        let radius_squared = radius * radius;
        into_results(
            self.candidates(query)
                .filter(|c| c.distance_squared <= radius_squared)
                .collect(),
        )
    }
}
