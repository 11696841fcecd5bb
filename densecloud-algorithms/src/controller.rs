//! Iterated dense point cloud filtering
//!
//! The [`IterationController`] drives repeated filter passes over a cloud.
//! Each pass rebuilds the KD-tree if the previous pass removed points, scores
//! every point, removes the worst candidates, and then decays the strength by
//! the configured persistence before the next pass.

use crate::decision::decide;
use crate::estimator::ConsistencyEstimator;
use crate::nearest_neighbor::KdTree;
use crate::surface::SurfaceIndex;
use densecloud_core::{
    Error, FilterConfig, FilteringOutcome, PassReport, Point3f, PointCloud, Result, TriangleMesh,
};
use tracing::{debug, info, warn};

/// Lifecycle of an [`IterationController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, inputs not yet validated
    Idle,
    /// Inputs valid; the next pass to run is the contained index
    Running(usize),
    /// All passes completed
    Done,
    /// Inputs were rejected; no pass has run
    Failed,
}

/// Runs the configured number of filter passes over a point cloud
///
/// The mesh is only read. All state carried between passes lives in the
/// controller: the current cloud, the surface distances of its points, the
/// current strength, and the KD-tree of the current cloud when it is still
/// up to date.
pub struct IterationController<'m, T> {
    mesh: &'m TriangleMesh,
    config: FilterConfig,
    cloud: PointCloud<T>,
    state: ControllerState,
    strength: f32,
    surface: Option<SurfaceIndex>,
    surface_distances: Vec<f32>,
    index: Option<KdTree>,
    passes: Vec<PassReport>,
}

impl<'m, T> IterationController<'m, T>
where
    T: Copy + Send + Sync,
    Point3f: From<T>,
{
    pub fn new(cloud: PointCloud<T>, mesh: &'m TriangleMesh, config: FilterConfig) -> Self {
        Self {
            mesh,
            strength: config.filter_strength,
            config,
            cloud,
            state: ControllerState::Idle,
            surface: None,
            surface_distances: Vec::new(),
            index: None,
            passes: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Strength the next pass will use
    pub fn current_strength(&self) -> f32 {
        self.strength
    }

    pub fn cloud(&self) -> &PointCloud<T> {
        &self.cloud
    }

    pub fn passes(&self) -> &[PassReport] {
        &self.passes
    }

    /// Validate the inputs and prepare the first pass.
    ///
    /// Moves `Idle` to `Running(0)`, or straight to `Done` when no iterations
    /// are configured. Invalid inputs move the controller to `Failed`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ControllerState::Idle {
            return Err(Error::InvalidInput(format!(
                "controller cannot start from state {:?}",
                self.state
            )));
        }

        match self.prepare() {
            Ok(()) => {
                self.state = if self.config.iterations == 0 {
                    ControllerState::Done
                } else {
                    ControllerState::Running(0)
                };
                Ok(())
            }
            Err(err) => {
                self.state = ControllerState::Failed;
                Err(err)
            }
        }
    }

    fn prepare(&mut self) -> Result<()> {
        self.config.validate()?;

        if self.cloud.is_empty() {
            return Err(Error::InvalidInput("dense point cloud is empty".to_string()));
        }

        let positions = self.cloud.positions();
        if let Some(index) = positions
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(Error::InvalidInput(format!(
                "point {} of the dense point cloud has non-finite coordinates",
                index
            )));
        }

        let surface = SurfaceIndex::build(self.mesh)?;
        debug!(
            faces = surface.face_count(),
            characteristic_length = surface.characteristic_length(),
            "Surface index built"
        );

        let estimator = ConsistencyEstimator::new(&surface, self.config.n_neighbors_max);
        self.surface_distances = estimator.surface_distances(&positions);
        self.surface = Some(surface);
        Ok(())
    }

    /// Advance the state machine by one step and return the new state.
    ///
    /// From `Idle` this validates the inputs; from `Running(i)` it runs pass
    /// `i`. `Done` is terminal and stepping it is a no-op.
    pub fn step(&mut self) -> Result<ControllerState> {
        match self.state {
            ControllerState::Idle => self.start()?,
            ControllerState::Running(iteration) => self.run_pass(iteration)?,
            ControllerState::Done => {}
            ControllerState::Failed => {
                return Err(Error::InvalidInput(
                    "filtering was aborted because of invalid input".to_string(),
                ));
            }
        }
        Ok(self.state)
    }

    fn run_pass(&mut self, iteration: usize) -> Result<()> {
        let surface = self.surface.as_ref().ok_or_else(|| {
            Error::InvalidInput("surface index missing for a running controller".to_string())
        })?;

        let positions = self.cloud.positions();
        if self.index.is_none() {
            debug!(points = positions.len(), "Building KD-tree");
            self.index = Some(KdTree::new(&positions)?);
        }
        let index = self.index.as_ref().ok_or_else(|| {
            Error::InvalidInput("KD-tree missing after rebuild".to_string())
        })?;

        let estimator = ConsistencyEstimator::new(surface, self.config.n_neighbors_max);
        let scores = estimator.score(index, &positions, &self.surface_distances);
        if scores.low_confidence > 0 {
            warn!(
                iteration,
                points = scores.low_confidence,
                requested = self.config.n_neighbors_max,
                "Points scored with fewer neighbors than requested"
            );
        }

        let decision = decide(
            &scores.scores,
            self.config.radius_factor,
            self.strength,
            self.config.n_points_max,
        );

        if decision.removed > 0 {
            self.cloud.retain_mask(&decision.keep)?;
            let mut keep = decision.keep.iter();
            self.surface_distances
                .retain(|_| *keep.next().unwrap_or(&true));
            self.index = None;
        }

        let report = PassReport {
            iteration,
            strength: self.strength,
            threshold: decision.threshold,
            points_before: positions.len(),
            candidates: decision.candidates,
            removed: decision.removed,
            low_confidence: scores.low_confidence,
        };
        info!("{}", report);
        self.passes.push(report);

        self.strength *= self.config.persistence;
        let next = iteration + 1;
        self.state = if next >= self.config.iterations {
            ControllerState::Done
        } else {
            ControllerState::Running(next)
        };
        Ok(())
    }

    /// Run every remaining step and return the outcome.
    pub fn run(mut self) -> Result<FilteringOutcome<T>> {
        while self.step()? != ControllerState::Done {}
        Ok(self.into_outcome())
    }

    /// The current cloud and the reports of the passes run so far
    pub fn into_outcome(self) -> FilteringOutcome<T> {
        FilteringOutcome {
            cloud: self.cloud,
            passes: self.passes,
        }
    }
}

/// Filter a dense point cloud against a reference mesh.
///
/// Runs `config.iterations` passes; pass `i` uses strength
/// `config.filter_strength * config.persistence^i`. The mesh is never
/// modified.
///
/// # Errors
///
/// [`Error::InvalidInput`] for an empty cloud, a cloud with non-finite
/// coordinates, an empty or malformed mesh, or an invalid configuration.
///
/// # Example
/// ```rust
/// use densecloud_core::{FilterConfig, Point3f, PointCloud, TriangleMesh};
/// use densecloud_algorithms::filter_dense_point_cloud;
///
/// fn main() -> densecloud_core::Result<()> {
///     let mesh = TriangleMesh::from_vertices_and_faces(
///         vec![
///             Point3f::new(0.0, 0.0, 0.0),
///             Point3f::new(1.0, 0.0, 0.0),
///             Point3f::new(0.0, 1.0, 0.0),
///         ],
///         vec![[0, 1, 2]],
///     );
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.1, 0.1, 0.0),
///         Point3f::new(0.2, 0.1, 0.0),
///         Point3f::new(0.1, 0.2, 0.0),
///         Point3f::new(0.2, 0.2, 0.0),
///         Point3f::new(0.1, 0.1, 50.0), // outlier
///     ]);
///
///     let outcome = filter_dense_point_cloud(cloud, &mesh, &FilterConfig::default())?;
///     assert_eq!(outcome.cloud.len(), 4);
///     Ok(())
/// }
/// ```
pub fn filter_dense_point_cloud<T>(
    cloud: PointCloud<T>,
    mesh: &TriangleMesh,
    config: &FilterConfig,
) -> Result<FilteringOutcome<T>>
where
    T: Copy + Send + Sync,
    Point3f: From<T>,
{
    info!(
        points = cloud.len(),
        vertices = mesh.vertex_count(),
        facets = mesh.face_count(),
        radius_factor = config.radius_factor,
        filter_strength = config.filter_strength,
        iterations = config.iterations,
        "Filtering dense point cloud"
    );
    IterationController::new(cloud, mesh, *config).run()
}
