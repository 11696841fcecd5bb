//! Local density and surface consistency estimation
//!
//! Every point receives a non-negative outlier score built from two ratios:
//!
//! * `surface_ratio`: distance to the reference mesh divided by the mesh's
//!   mean edge length,
//! * `density_ratio`: mean distance to the point's nearest neighbors divided
//!   by the median of that quantity over the whole cloud.
//!
//! The score is `max(surface_ratio * max(1, density_ratio), density_ratio - 1)`.
//! Either term marks a point on its own: a dense cluster far from the mesh
//! keeps its full surface ratio, and an isolated point lying on the surface
//! still scores by its sparsity. Sparse off-surface points score highest.

use crate::surface::SurfaceIndex;
use densecloud_core::{NearestNeighborSearch, Point3f};
use rayon::prelude::*;

/// Neighborhood statistics of a single point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighborhood {
    /// Mean distance to the neighbors found, 0 when there are none
    pub mean_distance: f32,
    /// Number of neighbors found, at most the requested count
    pub count: usize,
}

/// Scores of one filtering pass
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSet {
    /// One score per point, in cloud order
    pub scores: Vec<f32>,
    /// Points that had fewer neighbors than requested
    pub low_confidence: usize,
    /// Median mean-neighbor distance used to normalize density
    pub density_reference: f32,
}

/// Per-point outlier scoring against a shared surface index
pub struct ConsistencyEstimator<'a> {
    surface: &'a SurfaceIndex,
    n_neighbors: usize,
}

impl<'a> ConsistencyEstimator<'a> {
    pub fn new(surface: &'a SurfaceIndex, n_neighbors: usize) -> Self {
        Self {
            surface,
            n_neighbors,
        }
    }

    /// Distance of every point to the reference surface.
    ///
    /// These depend only on the point and the mesh, so callers may compute
    /// them once and carry them across passes.
    pub fn surface_distances(&self, positions: &[Point3f]) -> Vec<f32> {
        positions
            .par_iter()
            .map(|p| self.surface.distance(p))
            .collect()
    }

    /// Neighborhood statistics for every point of `positions`, which must be
    /// the points indexed by `search`.
    pub fn neighborhoods<S>(&self, search: &S, positions: &[Point3f]) -> Vec<Neighborhood>
    where
        S: NearestNeighborSearch + Sync,
    {
        // A point has at most `len - 1` neighbors
        let k = self.n_neighbors.min(positions.len().saturating_sub(1));
        positions
            .par_iter()
            .enumerate()
            .map(|(index, point)| {
                // One extra neighbor because the point finds itself
                let (sum, count) = search
                    .find_k_nearest(point, k.saturating_add(1))
                    .into_iter()
                    .filter(|&(neighbor, _)| neighbor != index)
                    .take(k)
                    .fold((0.0f64, 0usize), |(sum, count), (_, distance)| {
                        (sum + distance as f64, count + 1)
                    });

                Neighborhood {
                    mean_distance: if count > 0 {
                        (sum / count as f64) as f32
                    } else {
                        0.0
                    },
                    count,
                }
            })
            .collect()
    }

    /// Score every point.
    ///
    /// `surface_distances[i]` must be the surface distance of `positions[i]`.
    pub fn score<S>(&self, search: &S, positions: &[Point3f], surface_distances: &[f32]) -> ScoreSet
    where
        S: NearestNeighborSearch + Sync,
    {
        debug_assert_eq!(positions.len(), surface_distances.len());

        let neighborhoods = self.neighborhoods(search, positions);
        let density_reference = median_mean_distance(&neighborhoods);
        let length = self.surface.characteristic_length();

        let scores: Vec<f32> = neighborhoods
            .par_iter()
            .zip(surface_distances.par_iter())
            .map(|(neighborhood, &surface_distance)| {
                if neighborhood.count == 0 {
                    return 0.0;
                }
                let density_ratio = if density_reference > f32::EPSILON {
                    neighborhood.mean_distance / density_reference
                } else {
                    1.0
                };
                combined_score(surface_distance / length, density_ratio)
            })
            .collect();

        let low_confidence = neighborhoods
            .iter()
            .filter(|n| n.count < self.n_neighbors)
            .count();

        ScoreSet {
            scores,
            low_confidence,
            density_reference,
        }
    }
}

/// Outlier score from the surface and density ratios of one point.
pub fn combined_score(surface_ratio: f32, density_ratio: f32) -> f32 {
    (surface_ratio * density_ratio.max(1.0)).max(density_ratio - 1.0)
}

/// Median of the mean neighbor distances of points that have neighbors.
fn median_mean_distance(neighborhoods: &[Neighborhood]) -> f32 {
    let mut distances: Vec<f32> = neighborhoods
        .iter()
        .filter(|n| n.count > 0)
        .map(|n| n.mean_distance)
        .collect();
    if distances.is_empty() {
        return 0.0;
    }

    let mid = (distances.len() - 1) / 2;
    let (_, median, _) = distances.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *median
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest_neighbor::{BruteForceSearch, KdTree};
    use approx::assert_relative_eq;
    use densecloud_core::TriangleMesh;

    fn ground_plane() -> SurfaceIndex {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(-10.0, -10.0, 0.0),
                Point3f::new(10.0, -10.0, 0.0),
                Point3f::new(10.0, 10.0, 0.0),
                Point3f::new(-10.0, 10.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        SurfaceIndex::build(&mesh).unwrap()
    }

    fn grid_on_plane(n: usize, spacing: f32) -> Vec<Point3f> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push(Point3f::new(i as f32 * spacing, j as f32 * spacing, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_regular_grid_on_surface_scores_low() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 4);
        let points = grid_on_plane(5, 0.1);
        let tree = KdTree::new(&points).unwrap();
        let distances = estimator.surface_distances(&points);

        let result = estimator.score(&tree, &points, &distances);
        assert_eq!(result.scores.len(), points.len());
        assert!(result.scores.iter().all(|&s| (0.0..0.5).contains(&s)));
        assert_eq!(result.low_confidence, 0);
    }

    #[test]
    fn test_isolated_point_above_surface_scores_highest() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 4);
        let mut points = grid_on_plane(6, 0.1);
        for p in points.iter_mut().take(6) {
            p.z = 0.05;
        }
        points.push(Point3f::new(0.25, 0.25, 8.0));

        let tree = KdTree::new(&points).unwrap();
        let distances = estimator.surface_distances(&points);
        let result = estimator.score(&tree, &points, &distances);

        let (best, _) = result
            .scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(best, points.len() - 1);
    }

    #[test]
    fn test_small_cloud_is_low_confidence() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 50);
        let points = grid_on_plane(3, 0.5);
        let tree = KdTree::new(&points).unwrap();

        let neighborhoods = estimator.neighborhoods(&tree, &points);
        assert!(neighborhoods.iter().all(|n| n.count == 8));

        let distances = estimator.surface_distances(&points);
        let result = estimator.score(&tree, &points, &distances);
        assert_eq!(result.low_confidence, points.len());
    }

    #[test]
    fn test_single_point_is_never_scored() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 10);
        let points = vec![Point3f::new(0.0, 0.0, 100.0)];
        let tree = KdTree::new(&points).unwrap();
        let distances = estimator.surface_distances(&points);

        let result = estimator.score(&tree, &points, &distances);
        assert_eq!(result.scores, vec![0.0]);
        assert_eq!(result.low_confidence, 1);
        assert_eq!(result.density_reference, 0.0);
    }

    #[test]
    fn test_self_is_excluded_from_neighbors() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 1);
        let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(3.0, 0.0, 0.0)];
        let search = BruteForceSearch::new(&points);

        let neighborhoods = estimator.neighborhoods(&search, &points);
        assert_relative_eq!(neighborhoods[0].mean_distance, 3.0);
        assert_relative_eq!(neighborhoods[1].mean_distance, 3.0);
    }

    #[test]
    fn test_tree_and_brute_force_agree() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 6);
        let mut points = grid_on_plane(8, 0.2);
        points.iter_mut().enumerate().for_each(|(i, p)| p.z = (i % 5) as f32 * 0.03);

        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);
        let distances = estimator.surface_distances(&points);

        assert_eq!(
            estimator.score(&tree, &points, &distances),
            estimator.score(&brute, &points, &distances)
        );
    }

    #[test]
    fn test_combined_score_terms_act_alone() {
        // dense cluster far from the surface keeps its surface ratio
        assert_relative_eq!(combined_score(30.0, 0.01), 30.0);
        // isolated point on the surface scores by sparsity
        assert_relative_eq!(combined_score(0.0, 12.0), 11.0);
        // sparse and off the surface compounds
        assert_relative_eq!(combined_score(2.0, 3.0), 6.0);
        assert_relative_eq!(combined_score(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_dense_cluster_far_from_surface_scores_high() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 8);
        let mut points = grid_on_plane(8, 0.1);
        let cluster_start = points.len();
        for i in 0..12 {
            let t = i as f32;
            points.push(Point3f::new(
                5.0 + 0.001 * t.sin(),
                5.0 + 0.001 * t.cos(),
                10.0 + 0.001 * (t * 0.5).sin(),
            ));
        }

        let tree = KdTree::new(&points).unwrap();
        let distances = estimator.surface_distances(&points);
        let result = estimator.score(&tree, &points, &distances);

        let length = surface.characteristic_length();
        for score in &result.scores[cluster_start..] {
            assert!(*score >= 10.0 / length - 1e-3);
        }
        assert!(result.scores[..cluster_start].iter().all(|&s| s < 1.0));
    }

    #[test]
    fn test_isolated_point_on_surface_scores_high() {
        let surface = ground_plane();
        let estimator = ConsistencyEstimator::new(&surface, 8);
        let mut points = grid_on_plane(8, 0.1);
        points.push(Point3f::new(-8.0, 8.0, 0.0));

        let tree = KdTree::new(&points).unwrap();
        let distances = estimator.surface_distances(&points);
        let result = estimator.score(&tree, &points, &distances);

        assert!(result.scores[points.len() - 1] > 10.0);
        assert!(result.scores[..points.len() - 1].iter().all(|&s| s < 1.0));
    }

    #[test]
    fn test_huge_neighbor_count_is_clamped() {
        let surface = ground_plane();
        let points = grid_on_plane(4, 0.25);
        let tree = KdTree::new(&points).unwrap();

        for n_neighbors in [usize::MAX, 1 << 40] {
            let estimator = ConsistencyEstimator::new(&surface, n_neighbors);
            let neighborhoods = estimator.neighborhoods(&tree, &points);
            assert!(neighborhoods.iter().all(|n| n.count == points.len() - 1));

            let distances = estimator.surface_distances(&points);
            let result = estimator.score(&tree, &points, &distances);
            assert_eq!(result.low_confidence, points.len());
        }
    }

    #[test]
    fn test_median_of_neighborhoods() {
        let neighborhoods = [
            Neighborhood { mean_distance: 3.0, count: 2 },
            Neighborhood { mean_distance: 1.0, count: 2 },
            Neighborhood { mean_distance: 100.0, count: 0 },
            Neighborhood { mean_distance: 2.0, count: 2 },
        ];
        assert_eq!(median_mean_distance(&neighborhoods), 2.0);
        assert_eq!(median_mean_distance(&[]), 0.0);
    }
}
