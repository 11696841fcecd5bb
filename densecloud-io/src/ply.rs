//! PLY format support
//!
//! Meshes are stored as a `vertex` element (`x`, `y`, `z`, optional `nx`,
//! `ny`, `nz`) plus a `face` element with a `vertex_indices` list. Dataset
//! structure exports store one vertex per landmark with `red`, `green` and
//! `blue` color channels.

use crate::dataset::Landmark;
use crate::{MeshReader, MeshWriter};
use densecloud_core::{Error, Point3f, Result, TriangleMesh, Vector3f};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

pub struct PlyReader;
pub struct PlyWriter;

fn parse_file(path: &Path) -> Result<Ply<DefaultElement>> {
    let file = File::open(path).map_err(|e| Error::read(path, e))?;
    let mut reader = BufReader::new(file);
    Parser::<DefaultElement>::new()
        .read_ply(&mut reader)
        .map_err(|e| Error::read(path, e))
}

fn encode(ply: &mut Ply<DefaultElement>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    Writer::new().write_ply(&mut bytes, ply)?;
    Ok(bytes)
}

fn scalar_def(name: &str, scalar: ScalarType) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar))
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let ply = parse_file(path)?;
        let vertex_element = ply.payload.get("vertex").map(Vec::as_slice).unwrap_or(&[]);

        let vertices = vertex_element
            .iter()
            .map(|vertex| {
                Ok(Point3f::new(
                    extract_property_value(vertex, "x")?,
                    extract_property_value(vertex, "y")?,
                    extract_property_value(vertex, "z")?,
                ))
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::read(path, e))?;

        // Normals are kept only when every vertex has them
        let normals = vertex_element
            .iter()
            .map(|vertex| {
                Some(Vector3f::new(
                    extract_property_value(vertex, "nx").ok()?,
                    extract_property_value(vertex, "ny").ok()?,
                    extract_property_value(vertex, "nz").ok()?,
                ))
            })
            .collect::<Option<Vec<_>>>()
            .filter(|normals| !normals.is_empty());

        let mut faces = Vec::new();
        for face in ply.payload.get("face").into_iter().flatten() {
            let indices = extract_face_indices(face).map_err(|e| Error::read(path, e))?;
            for i in 1..indices.len().saturating_sub(1) {
                faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = normals {
            mesh.set_normals(normals);
        }

        debug!(
            path = %path.display(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "PLY mesh read"
        );
        Ok(mesh)
    }
}

impl MeshWriter for PlyWriter {
    fn encode_mesh(mesh: &TriangleMesh) -> Result<Vec<u8>> {
        let vertex_count = mesh.vertex_count();
        let mut face_indices = Vec::with_capacity(mesh.face_count());
        for face in &mesh.faces {
            let indices = face
                .iter()
                .map(|&i| i32::try_from(i).ok().filter(|_| i < vertex_count))
                .collect::<Option<Vec<i32>>>()
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "face {:?} references a vertex outside 0..{}",
                        face, vertex_count
                    ))
                })?;
            face_indices.push(indices);
        }
        let normals = mesh.normals.as_ref().filter(|n| n.len() == vertex_count);

        let mut ply = Ply::<DefaultElement>::new();

        let mut vertex_def = ElementDef::new("vertex".to_string());
        vertex_def.count = vertex_count;
        for name in ["x", "y", "z"] {
            vertex_def.properties.add(scalar_def(name, ScalarType::Float));
        }
        if normals.is_some() {
            for name in ["nx", "ny", "nz"] {
                vertex_def.properties.add(scalar_def(name, ScalarType::Float));
            }
        }
        ply.header.elements.add(vertex_def);

        let mut face_def = ElementDef::new("face".to_string());
        face_def.count = face_indices.len();
        face_def.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_def);

        let vertices = mesh
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut element = DefaultElement::new();
                element.insert("x".to_string(), Property::Float(v.x));
                element.insert("y".to_string(), Property::Float(v.y));
                element.insert("z".to_string(), Property::Float(v.z));
                if let Some(n) = normals.map(|normals| normals[i]) {
                    element.insert("nx".to_string(), Property::Float(n.x));
                    element.insert("ny".to_string(), Property::Float(n.y));
                    element.insert("nz".to_string(), Property::Float(n.z));
                }
                element
            })
            .collect();
        ply.payload.insert("vertex".to_string(), vertices);

        let faces = face_indices
            .into_iter()
            .map(|indices| {
                let mut element = DefaultElement::new();
                element.insert("vertex_indices".to_string(), Property::ListInt(indices));
                element
            })
            .collect();
        ply.payload.insert("face".to_string(), faces);

        encode(&mut ply)
    }
}

/// Serialize landmark positions and colors as a PLY vertex element.
pub fn encode_landmarks(landmarks: &[Landmark]) -> Result<Vec<u8>> {
    let mut ply = Ply::<DefaultElement>::new();

    let mut vertex_def = ElementDef::new("vertex".to_string());
    vertex_def.count = landmarks.len();
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(scalar_def(name, ScalarType::Double));
    }
    for name in ["red", "green", "blue"] {
        vertex_def.properties.add(scalar_def(name, ScalarType::UChar));
    }
    ply.header.elements.add(vertex_def);

    let vertices = landmarks
        .iter()
        .map(|landmark| {
            let mut element = DefaultElement::new();
            let [x, y, z] = landmark.position;
            let [r, g, b] = landmark.color;
            element.insert("x".to_string(), Property::Double(x));
            element.insert("y".to_string(), Property::Double(y));
            element.insert("z".to_string(), Property::Double(z));
            element.insert("red".to_string(), Property::UChar(r));
            element.insert("green".to_string(), Property::UChar(g));
            element.insert("blue".to_string(), Property::UChar(b));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    encode(&mut ply)
}

/// Read landmarks from a PLY vertex element.
///
/// Landmark ids are the vertex indices; colors default to white when the
/// file has none. Observations are not stored in PLY.
pub fn read_landmarks<P: AsRef<Path>>(path: P) -> Result<Vec<Landmark>> {
    let path = path.as_ref();
    let ply = parse_file(path)?;

    ply.payload
        .get("vertex")
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(id, vertex)| {
            let position = [
                extract_property_f64(vertex, "x")?,
                extract_property_f64(vertex, "y")?,
                extract_property_f64(vertex, "z")?,
            ];
            let color = [
                extract_color(vertex, "red"),
                extract_color(vertex, "green"),
                extract_color(vertex, "blue"),
            ];
            Ok(Landmark::new(id as u64, position).with_color(color))
        })
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::read(path, e))
}

/// Extract a property value as f64 from a PLY element
fn extract_property_f64(element: &DefaultElement, name: &str) -> Result<f64> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val as f64),
        Some(Property::Double(val)) => Ok(*val),
        Some(Property::Int(val)) => Ok(*val as f64),
        Some(Property::UInt(val)) => Ok(*val as f64),
        Some(Property::Short(val)) => Ok(*val as f64),
        Some(Property::UShort(val)) => Ok(*val as f64),
        _ => Err(Error::InvalidInput(format!(
            "property '{}' not found or not numeric",
            name
        ))),
    }
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    extract_property_f64(element, name).map(|v| v as f32)
}

fn extract_color(element: &DefaultElement, name: &str) -> u8 {
    match element.get(name) {
        Some(Property::UChar(val)) => *val,
        Some(Property::Float(val)) => (val.clamp(0.0, 1.0) * 255.0).round() as u8,
        _ => u8::MAX,
    }
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    let to_index = |idx: i64| {
        usize::try_from(idx)
            .map_err(|_| Error::InvalidInput(format!("negative face index {}", idx)))
    };
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        Some(Property::ListUInt(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        Some(Property::ListUChar(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        _ => Err(Error::InvalidInput("face indices not found".to_string())),
    }
}
