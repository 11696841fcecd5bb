//! Dense point cloud datasets
//!
//! A dataset holds the calibrated views of a reconstruction and the dense
//! landmarks observed from them. It is stored as JSON; a `.ply` path reads
//! or writes the landmark structure only.

use crate::{extension, write_file};
use densecloud_core::{Error, Point3f, Result, TrackedPoint, TrackedPointCloud};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version string written into new datasets
pub const DATASET_VERSION: &str = "1.0";

fn default_version() -> String {
    DATASET_VERSION.to_string()
}

/// Which parts of a dataset are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetScope {
    /// Views and landmarks with full observations
    #[default]
    All,
    /// Views and landmarks, observations reduced to the observing view ids
    Dense,
}

/// A calibrated camera view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub view_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_id: Option<u32>,
    #[serde(default)]
    pub image_path: PathBuf,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl View {
    pub fn new(view_id: u32, image_path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            view_id,
            intrinsic_id: None,
            pose_id: None,
            image_path: image_path.into(),
            width,
            height,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_calibration(mut self, intrinsic_id: u32, pose_id: u32) -> Self {
        self.intrinsic_id = Some(intrinsic_id);
        self.pose_id = Some(pose_id);
        self
    }

    /// Whether the view carries intrinsic and pose ids and a non-empty image size.
    pub fn is_complete(&self) -> bool {
        self.intrinsic_id.is_some() && self.pose_id.is_some() && self.width > 0 && self.height > 0
    }
}

/// Image feature backing an observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureObservation {
    pub feature_id: u32,
    /// Pixel coordinates in the observing view
    pub x: [f32; 2],
    #[serde(default)]
    pub scale: f32,
}

/// A landmark seen from one view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub view_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureObservation>,
}

impl Observation {
    pub fn new(view_id: u32) -> Self {
        Self { view_id, feature: None }
    }

    pub fn with_feature(view_id: u32, feature_id: u32, x: [f32; 2], scale: f32) -> Self {
        Self {
            view_id,
            feature: Some(FeatureObservation { feature_id, x, scale }),
        }
    }
}

fn default_color() -> [u8; 3] {
    [u8::MAX; 3]
}

/// A dense 3D point with its color and observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u64,
    pub position: [f64; 3],
    #[serde(default = "default_color")]
    pub color: [u8; 3],
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Landmark {
    pub fn new(id: u64, position: [f64; 3]) -> Self {
        Self {
            id,
            position,
            color: default_color(),
            observations: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observations.push(observation);
        self
    }

    pub fn point(&self) -> Point3f {
        let [x, y, z] = self.position;
        Point3f::new(x as f32, y as f32, z as f32)
    }
}

/// Views and dense landmarks of a reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudDataset {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

impl Default for PointCloudDataset {
    fn default() -> Self {
        Self {
            version: default_version(),
            views: Vec::new(),
            landmarks: Vec::new(),
        }
    }
}

impl PointCloudDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_landmarks(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks,
            ..Self::default()
        }
    }

    /// Check id uniqueness, finite positions and observation view references.
    pub fn validate(&self) -> Result<()> {
        let mut view_ids = HashSet::with_capacity(self.views.len());
        for view in &self.views {
            if !view_ids.insert(view.view_id) {
                return Err(Error::InvalidInput(format!("duplicate view id {}", view.view_id)));
            }
        }

        let mut landmark_ids = HashSet::with_capacity(self.landmarks.len());
        for landmark in &self.landmarks {
            if !landmark_ids.insert(landmark.id) {
                return Err(Error::InvalidInput(format!("duplicate landmark id {}", landmark.id)));
            }
            if landmark.position.iter().any(|c| !c.is_finite()) {
                return Err(Error::InvalidInput(format!(
                    "landmark {} has a non-finite position",
                    landmark.id
                )));
            }
            if let Some(obs) = landmark
                .observations
                .iter()
                .find(|obs| !view_ids.contains(&obs.view_id))
            {
                return Err(Error::InvalidInput(format!(
                    "landmark {} is observed from unknown view {}",
                    landmark.id, obs.view_id
                )));
            }
        }
        Ok(())
    }

    /// Landmark positions as a point cloud, each point tagged with its landmark id.
    pub fn to_point_cloud(&self) -> TrackedPointCloud {
        self.landmarks
            .iter()
            .map(|landmark| TrackedPoint::with_source(landmark.point(), landmark.id))
            .collect()
    }

    /// Keep the landmarks whose ids appear in `cloud`, in their current order.
    ///
    /// Returns the number of landmarks dropped.
    pub fn retain_points(&mut self, cloud: &TrackedPointCloud) -> usize {
        let survivors: HashSet<u64> = cloud.iter().filter_map(|p| p.source_id).collect();
        let before = self.landmarks.len();
        self.landmarks.retain(|landmark| survivors.contains(&landmark.id));
        before - self.landmarks.len()
    }

    /// Copy of the dataset restricted to `scope`
    pub fn with_scope(&self, scope: DatasetScope) -> PointCloudDataset {
        let mut dataset = self.clone();
        if scope == DatasetScope::Dense {
            for landmark in &mut dataset.landmarks {
                for observation in &mut landmark.observations {
                    observation.feature = None;
                }
            }
        }
        dataset
    }

    pub fn complete_view_count(&self) -> usize {
        self.views.iter().filter(|v| v.is_complete()).count()
    }
}

/// Load and validate a dataset from a `.json` or `.ply` file.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<PointCloudDataset> {
    let path = path.as_ref();
    let dataset = match extension(path).as_deref() {
        Some("json") => {
            let file = File::open(path).map_err(|e| Error::read(path, e))?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::read(path, e))?
        }
        Some("ply") => PointCloudDataset::from_landmarks(crate::ply::read_landmarks(path)?),
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported dataset format: {}",
                path.display()
            )))
        }
    };
    dataset.validate()?;

    info!(
        path = %path.display(),
        views = dataset.views.len(),
        complete_views = dataset.complete_view_count(),
        landmarks = dataset.landmarks.len(),
        "Dataset loaded"
    );
    Ok(dataset)
}

/// Whether `dataset` carries anything a PLY landmark export cannot hold
fn has_structure(dataset: &PointCloudDataset) -> bool {
    !dataset.views.is_empty() || dataset.landmarks.iter().any(|l| !l.observations.is_empty())
}

/// Serialize `dataset` restricted to `scope`, in the format selected by `path`.
///
/// PLY output holds landmark positions and colors only, whatever the scope.
pub fn encode_dataset<P: AsRef<Path>>(
    dataset: &PointCloudDataset,
    path: P,
    scope: DatasetScope,
) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = match extension(path).as_deref() {
        Some("json") => serde_json::to_vec_pretty(&dataset.with_scope(scope))
            .map_err(|e| Error::write(path, e))?,
        Some("ply") => {
            if has_structure(dataset) {
                warn!(
                    path = %path.display(),
                    "PLY dataset export keeps landmark positions and colors only; \
                     views, ids and observations are dropped"
                );
            }
            crate::ply::encode_landmarks(&dataset.landmarks)?
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported dataset format: {}",
                path.display()
            )))
        }
    };
    debug!(path = %path.display(), ?scope, bytes = bytes.len(), "Dataset encoded");
    Ok(bytes)
}

/// Save `dataset` restricted to `scope`.
pub fn save_dataset<P: AsRef<Path>>(
    dataset: &PointCloudDataset,
    path: P,
    scope: DatasetScope,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_dataset(dataset, path, scope)?;
    write_file(path, &bytes)
}
