//! OBJ format support
//!
//! Reads vertex positions, optional vertex normals and polygonal faces;
//! polygons with more than three corners are fan-triangulated. Texture
//! coordinates and materials are ignored.

use crate::{MeshReader, MeshWriter};
use densecloud_core::{Error, Point3f, Result, TriangleMesh, Vector3f};
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

pub struct ObjReader;
pub struct ObjWriter;

impl MeshReader for ObjReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        let data = ::obj::ObjData::load_buf(BufReader::new(file))
            .map_err(|e| Error::read(path, e))?;

        let vertices: Vec<Point3f> = data
            .position
            .iter()
            .map(|p| Point3f::new(p[0], p[1], p[2]))
            .collect();

        let mut faces = Vec::new();
        let mut vertex_normals: Vec<Option<Vector3f>> = vec![None; vertices.len()];
        let mut skipped = 0usize;

        for polygon in data
            .objects
            .iter()
            .flat_map(|o| o.groups.iter())
            .flat_map(|g| g.polys.iter())
        {
            let corners = &polygon.0;
            if corners.len() < 3 {
                skipped += 1;
                continue;
            }

            for corner in corners {
                if let (Some(slot), Some(normal)) = (
                    vertex_normals.get_mut(corner.0),
                    corner.2.and_then(|n| data.normal.get(n)),
                ) {
                    *slot = Some(Vector3f::new(normal[0], normal[1], normal[2]));
                }
            }

            for i in 1..corners.len() - 1 {
                faces.push([corners[0].0, corners[i].0, corners[i + 1].0]);
            }
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Skipped OBJ faces with fewer than 3 corners");
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = vertex_normals.into_iter().collect::<Option<Vec<_>>>() {
            mesh.set_normals(normals);
        }

        debug!(
            path = %path.display(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "OBJ mesh read"
        );
        Ok(mesh)
    }
}

impl MeshWriter for ObjWriter {
    fn encode_mesh(mesh: &TriangleMesh) -> Result<Vec<u8>> {
        let vertex_count = mesh.vertex_count();
        if let Some(face) = mesh.faces.iter().find(|f| f.iter().any(|&i| i >= vertex_count)) {
            return Err(Error::InvalidInput(format!(
                "face {:?} references a vertex outside 0..{}",
                face, vertex_count
            )));
        }

        let mut out = String::with_capacity(32 * (mesh.vertex_count() + mesh.face_count()));
        // Writing to a String cannot fail
        let _ = writeln!(out, "# {} vertices, {} faces", mesh.vertex_count(), mesh.face_count());

        for v in &mesh.vertices {
            let _ = writeln!(out, "v {} {} {}", v.x, v.y, v.z);
        }

        match &mesh.normals {
            Some(normals) => {
                for n in normals {
                    let _ = writeln!(out, "vn {} {} {}", n.x, n.y, n.z);
                }
                for [a, b, c] in &mesh.faces {
                    let _ = writeln!(out, "f {0}//{0} {1}//{1} {2}//{2}", a + 1, b + 1, c + 1);
                }
            }
            None => {
                for [a, b, c] in &mesh.faces {
                    let _ = writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1);
                }
            }
        }

        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempPath;
    use approx::assert_relative_eq;

    #[test]
    fn test_read_quad_is_triangulated() {
        let path = TempPath::new("quad.obj");
        std::fs::write(
            &path.0,
            "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1 4/1\n",
        )
        .unwrap();

        let mesh = ObjReader::read_mesh(&path.0).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(mesh.normals.is_none());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_normals_round_trip() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.5, 0.0, 0.0),
                Point3f::new(0.0, 2.5, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 3]);

        let path = TempPath::new("normals.obj");
        ObjWriter::write_mesh(&mesh, &path.0).unwrap();
        let loaded = ObjReader::read_mesh(&path.0).unwrap();

        assert_eq!(loaded.faces, mesh.faces);
        assert_relative_eq!(loaded.vertices[1].x, 1.5);
        assert_relative_eq!(loaded.vertices[2].y, 2.5);
        let normals = loaded.normals.unwrap();
        assert_relative_eq!(normals[0].z, 1.0);
    }

    #[test]
    fn test_encode_rejects_dangling_face() {
        let mesh = TriangleMesh::from_vertices_and_faces(vec![Point3f::origin()], vec![[0, 1, 2]]);
        assert!(matches!(ObjWriter::encode_mesh(&mesh), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_corrupt_file_is_read_error() {
        let path = TempPath::new("corrupt.obj");
        std::fs::write(&path.0, "v 0 0 zero\nf 1 2 3\n").unwrap();
        let err = ObjReader::read_mesh(&path.0).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
