//! I/O operations for meshes and dense point cloud datasets
//!
//! This crate reads and writes the inputs and outputs of the dense filtering
//! pipeline: triangle meshes (OBJ, PLY) and point cloud datasets (JSON, with a
//! PLY structure export).
//!
//! Every writer is split into an `encode_*` step producing bytes in memory and
//! a `write_*`/`save_*` step touching the file system, so callers can make
//! sure all outputs serialize before any file is created. [`commit_outputs`]
//! then stages several encoded outputs and moves them into place together.

pub mod obj;
pub mod ply;
pub mod dataset;

pub use dataset::*;

use densecloud_core::{Error, Result, TriangleMesh};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    /// Serialize `mesh` into an in-memory buffer
    fn encode_mesh(mesh: &TriangleMesh) -> Result<Vec<u8>>;

    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = Self::encode_mesh(mesh).map_err(|e| Error::write(path, e))?;
        write_file(path, &bytes)
    }
}

/// Lowercase file extension of `path`
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Write `bytes` to `path`, reporting failures against the path.
pub fn write_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, bytes).map_err(|e| Error::write(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "File written");
    Ok(())
}

/// Sibling temporary path `path` is staged under before being renamed into place
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Write several encoded outputs so that either all of them land or none does.
///
/// Every output is first written to a temporary file next to its target. Only
/// when all of them succeeded are they renamed onto their targets. A failed
/// write removes the temporary files and leaves every target untouched.
pub fn commit_outputs(outputs: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(outputs.len());

    for (path, bytes) in outputs {
        let tmp = staging_path(path);
        if let Err(e) = write_synced(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            discard(&staged);
            return Err(Error::write(path, e));
        }
        staged.push((tmp, path.as_path()));
    }

    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            discard(&staged[i..]);
            if i > 0 {
                warn!(committed = i, "Some outputs were replaced before a rename failed");
            }
            return Err(Error::write(*path, e));
        }
        debug!(path = %path.display(), "File written");
    }
    Ok(())
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => self::obj::ObjReader::read_mesh(path),
        Some("ply") => self::ply::PlyReader::read_mesh(path),
        _ => Err(Error::UnsupportedFormat(format!(
            "unsupported mesh format: {}",
            path.display()
        ))),
    }
}

/// Serialize `mesh` in the format selected by the extension of `path`
pub fn encode_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => self::obj::ObjWriter::encode_mesh(mesh),
        Some("ply") => self::ply::PlyWriter::encode_mesh(mesh),
        _ => Err(Error::UnsupportedFormat(format!(
            "unsupported mesh format: {}",
            path.display()
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_mesh(mesh, path)?;
    write_file(path, &bytes)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// A file path in the system temp directory, removed on drop
    pub struct TempPath(pub PathBuf);

    impl TempPath {
        pub fn new(name: &str) -> Self {
            let unique = format!("densecloud-{}-{}", std::process::id(), name);
            Self(std::env::temp_dir().join(unique))
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }
}
