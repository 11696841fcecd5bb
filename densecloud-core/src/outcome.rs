//! Filtering diagnostics

use crate::point_cloud::PointCloud;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics of a single filtering pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    /// 0-based pass index
    pub iteration: usize,
    /// Filter strength used by this pass
    pub strength: f32,
    /// Score above which a point became a removal candidate
    pub threshold: f32,
    /// Cloud size when the pass started
    pub points_before: usize,
    /// Points whose score exceeded the threshold
    pub candidates: usize,
    /// Points actually removed (at most `n_points_max`)
    pub removed: usize,
    /// Points scored with fewer neighbors than requested
    pub low_confidence: usize,
}

impl PassReport {
    /// Cloud size after the pass
    pub fn points_after(&self) -> usize {
        self.points_before - self.removed
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass {}: strength {:.4}, threshold {:.4}, {} -> {} points ({} candidates, {} removed)",
            self.iteration,
            self.strength,
            self.threshold,
            self.points_before,
            self.points_after(),
            self.candidates,
            self.removed
        )
    }
}

/// The filtered cloud together with per-pass diagnostics
#[derive(Debug, Clone)]
pub struct FilteringOutcome<T> {
    pub cloud: PointCloud<T>,
    pub passes: Vec<PassReport>,
}

impl<T> FilteringOutcome<T> {
    /// Removed-point count of each pass, in order
    pub fn removed_per_iteration(&self) -> Vec<usize> {
        self.passes.iter().map(|p| p.removed).collect()
    }

    /// Strength used by each pass, in order
    pub fn strengths(&self) -> Vec<f32> {
        self.passes.iter().map(|p| p.strength).collect()
    }

    pub fn total_removed(&self) -> usize {
        self.passes.iter().map(|p| p.removed).sum()
    }
}

impl<T> fmt::Display for FilteringOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dense filtering: {} passes, {} points removed, {} points kept",
            self.passes.len(),
            self.total_removed(),
            self.cloud.len()
        )
    }
}
