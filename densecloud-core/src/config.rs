//! Filter configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters of the mesh-guided dense point cloud filter
///
/// `filter_strength` is the strength of the first pass; every following pass
/// uses the previous strength multiplied by `persistence`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Scale of the surface tolerance, in units of mean mesh edge length. Default: 1.0.
    pub radius_factor: f32,
    /// Initial removal aggressiveness; 0 disables removal. Default: 1.0.
    pub filter_strength: f32,
    /// Maximum number of points removed by a single pass. Default: 25.
    pub n_points_max: usize,
    /// Number of nearest neighbors used for the density estimate. Default: 50.
    pub n_neighbors_max: usize,
    /// Number of filtering passes. Default: 1.
    pub iterations: usize,
    /// Multiplicative strength decay between passes. Default: 1.0.
    pub persistence: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            radius_factor: 1.0,
            filter_strength: 1.0,
            n_points_max: 25,
            n_neighbors_max: 50,
            iterations: 1,
            persistence: 1.0,
        }
    }
}

impl FilterConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_radius_factor(mut self, radius_factor: f32) -> Self {
        self.radius_factor = radius_factor;
        self
    }

    #[must_use]
    pub const fn with_filter_strength(mut self, filter_strength: f32) -> Self {
        self.filter_strength = filter_strength;
        self
    }

    #[must_use]
    pub const fn with_n_points_max(mut self, n_points_max: usize) -> Self {
        self.n_points_max = n_points_max;
        self
    }

    #[must_use]
    pub const fn with_n_neighbors_max(mut self, n_neighbors_max: usize) -> Self {
        self.n_neighbors_max = n_neighbors_max;
        self
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_persistence(mut self, persistence: f32) -> Self {
        self.persistence = persistence;
        self
    }

    /// Strength used by pass `iteration` (0-based).
    pub fn strength_at(&self, iteration: usize) -> f32 {
        let exponent = i32::try_from(iteration).unwrap_or(i32::MAX);
        self.filter_strength * self.persistence.powi(exponent)
    }

    /// Reject configurations the filter cannot run with.
    ///
    /// `iterations` may be zero, which makes the filter a no-op.
    pub fn validate(&self) -> Result<()> {
        if !(self.radius_factor.is_finite() && self.radius_factor > 0.0) {
            return Err(Error::InvalidInput(format!(
                "radius_factor must be positive, got {}",
                self.radius_factor
            )));
        }
        if !(self.filter_strength.is_finite() && self.filter_strength >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "filter_strength must be non-negative, got {}",
                self.filter_strength
            )));
        }
        if !(self.persistence.is_finite() && self.persistence >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "persistence must be non-negative, got {}",
                self.persistence
            )));
        }
        if self.n_points_max == 0 {
            return Err(Error::InvalidInput(
                "n_points_max must be greater than 0".to_string(),
            ));
        }
        if self.n_neighbors_max == 0 {
            return Err(Error::InvalidInput(
                "n_neighbors_max must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = FilterConfig::default();
        assert_eq!(config.radius_factor, 1.0);
        assert_eq!(config.filter_strength, 1.0);
        assert_eq!(config.n_points_max, 25);
        assert_eq!(config.n_neighbors_max, 50);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.persistence, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strength_decay() {
        let config = FilterConfig::new()
            .with_filter_strength(2.0)
            .with_persistence(0.5);
        assert_relative_eq!(config.strength_at(0), 2.0);
        assert_relative_eq!(config.strength_at(1), 1.0);
        assert_relative_eq!(config.strength_at(2), 0.5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(FilterConfig::new().with_radius_factor(0.0).validate().is_err());
        assert!(FilterConfig::new().with_radius_factor(f32::NAN).validate().is_err());
        assert!(FilterConfig::new().with_filter_strength(-1.0).validate().is_err());
        assert!(FilterConfig::new().with_persistence(-0.5).validate().is_err());
        assert!(FilterConfig::new().with_n_points_max(0).validate().is_err());
        assert!(FilterConfig::new().with_n_neighbors_max(0).validate().is_err());
    }

    #[test]
    fn test_zero_strength_and_iterations_are_valid() {
        let config = FilterConfig::new()
            .with_filter_strength(0.0)
            .with_iterations(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FilterConfig =
            serde_json::from_str(r#"{ "iterations": 3, "persistence": 0.5 }"#).unwrap();
        assert_eq!(config.iterations, 3);
        assert_eq!(config.persistence, 0.5);
        assert_eq!(config.n_points_max, 25);
    }
}
