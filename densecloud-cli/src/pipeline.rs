use crate::args::Args;
use anyhow::{Context, Result};
use densecloud_algorithms::filter_dense_point_cloud;
use densecloud_core::{Bounded, FilterConfig, FilteringOutcome, TrackedPoint};
use densecloud_io::{
    commit_outputs, encode_dataset, encode_mesh, load_dataset, read_mesh, DatasetScope,
};
use std::path::PathBuf;
use tracing::info;

/// Load the mesh and dataset, filter, then write every output.
///
/// All outputs are serialized in memory, then staged and moved into place
/// together, so a failure at any point leaves no output behind.
pub fn run(args: &Args, config: &FilterConfig) -> Result<FilteringOutcome<TrackedPoint>> {
    let mesh = read_mesh(&args.input_mesh)
        .with_context(|| format!("unable to read input mesh from {}", args.input_mesh.display()))?;
    mesh.validate()
        .with_context(|| format!("empty or malformed mesh in {}", args.input_mesh.display()))?;
    info!(
        path = %args.input_mesh.display(),
        vertices = mesh.vertex_count(),
        facets = mesh.face_count(),
        extent = mesh.extent(),
        "Mesh loaded"
    );

    let mut dataset = load_dataset(&args.input_dataset).with_context(|| {
        format!("the input dataset {} cannot be read", args.input_dataset.display())
    })?;

    let cloud = dataset.to_point_cloud();
    info!(points = cloud.len(), extent = cloud.extent(), "Dense point cloud loaded");

    let outcome = filter_dense_point_cloud(cloud, &mesh, config)
        .context("dense point cloud filtering failed")?;
    let dropped = dataset.retain_points(&outcome.cloud);
    info!(
        landmarks = dataset.landmarks.len(),
        removed = dropped,
        "{}",
        outcome
    );

    let mut outputs: Vec<(PathBuf, Vec<u8>)> = Vec::with_capacity(2);
    if let Some(path) = &args.output_mesh {
        let bytes = encode_mesh(&mesh, path)
            .with_context(|| format!("cannot encode output mesh {}", path.display()))?;
        outputs.push((path.clone(), bytes));
    }
    let bytes = encode_dataset(&dataset, &args.output_dataset, DatasetScope::Dense)
        .with_context(|| {
            format!("cannot encode output dataset {}", args.output_dataset.display())
        })?;
    outputs.push((args.output_dataset.clone(), bytes));

    commit_outputs(&outputs).context("cannot write outputs")?;
    for (path, _) in &outputs {
        info!(path = %path.display(), "Output saved");
    }

    Ok(outcome)
}
