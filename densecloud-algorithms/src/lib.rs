//! # densecloud algorithms
//!
//! Mesh-guided outlier filtering for dense point clouds.
//!
//! The filter is assembled from four layers, leaves first:
//!
//! - [`nearest_neighbor`]: KD-tree (and a brute force reference) for k-NN and radius queries
//! - [`surface`]: bounding volume hierarchy answering point-to-mesh distances
//! - [`estimator`]: per-point outlier scores from neighbor density and surface distance
//! - [`decision`]: strength-scaled threshold with a per-pass removal cap
//!
//! [`controller`] iterates passes with a decaying strength and exposes
//! [`filter_dense_point_cloud`].

pub mod nearest_neighbor;
pub mod surface;
pub mod estimator;
pub mod decision;
pub mod controller;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use surface::*;
pub use estimator::*;
pub use decision::*;
pub use controller::*;
