//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Corner positions of face `face`
    ///
    /// Only meaningful on a mesh that passed [`TriangleMesh::validate`].
    pub fn triangle(&self, face: usize) -> [Point3f; 3] {
        let [a, b, c] = self.faces[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Check the structural invariants the filter relies on
    ///
    /// A usable mesh has at least one vertex, at least one face, and every
    /// face index inside the vertex array.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty mesh: {} vertices and {} facets",
                self.vertices.len(),
                self.faces.len()
            )));
        }

        let vertex_count = self.vertices.len();
        if let Some((face, _)) = self
            .faces
            .iter()
            .enumerate()
            .find(|(_, f)| f.iter().any(|&i| i >= vertex_count))
        {
            return Err(Error::InvalidInput(format!(
                "face {} references a vertex outside 0..{}",
                face, vertex_count
            )));
        }

        if self
            .vertices
            .iter()
            .any(|v| !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()))
        {
            return Err(Error::InvalidInput("mesh has non-finite vertex coordinates".to_string()));
        }

        Ok(())
    }

    /// Mean length of all face edges, counting shared edges once per face
    ///
    /// Used as the characteristic length of the surface. Returns 0 for a mesh
    /// without faces.
    pub fn mean_edge_length(&self) -> f32 {
        if self.faces.is_empty() {
            return 0.0;
        }

        let total: f64 = (0..self.faces.len())
            .map(|face| {
                let [a, b, c] = self.triangle(face);
                ((b - a).norm() + (c - b).norm() + (a - c).norm()) as f64
            })
            .sum();

        (total / (3 * self.faces.len()) as f64) as f32
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
