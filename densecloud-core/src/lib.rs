//! Core data structures and traits for densecloud
//!
//! This crate provides the shared types for mesh-guided dense point cloud
//! filtering: points, point clouds, triangle meshes, the filter configuration,
//! filtering diagnostics and the common error type.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod config;
pub mod outcome;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use config::*;
pub use outcome::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
