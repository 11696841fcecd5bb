//! Point-to-surface distance queries against a triangle mesh
//!
//! [`SurfaceIndex`] builds a bounding volume hierarchy over the mesh faces
//! once, then answers exact unsigned distance queries with a branch-and-bound
//! traversal. The index is immutable and `Sync`, so a single instance can be
//! shared by every scoring thread for every filtering pass.

use densecloud_core::{Error, Point3f, Result, TriangleMesh, Vector3f};

/// Maximum number of faces stored in a leaf.
const MAX_LEAF_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3f,
    max: Point3f,
}

impl Aabb {
    fn from_triangle(triangle: &[Point3f; 3]) -> Self {
        Self {
            min: triangle[0].inf(&triangle[1]).inf(&triangle[2]),
            max: triangle[0].sup(&triangle[1]).sup(&triangle[2]),
        }
    }

    fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn longest_axis(&self) -> usize {
        let size = self.max - self.min;
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from `point` to the box, 0 inside.
    fn distance_squared(&self, point: &Point3f) -> f32 {
        let below = self.min - point;
        let above = point - self.max;
        below.sup(&above).sup(&Vector3f::zeros()).norm_squared()
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bbox: Aabb,
    kind: NodeKind,
}

/// Bounding volume hierarchy over the faces of a validated mesh
pub struct SurfaceIndex {
    triangles: Vec<[Point3f; 3]>,
    order: Vec<usize>,
    nodes: Vec<Node>,
    characteristic_length: f32,
}

impl SurfaceIndex {
    /// Build the index for `mesh`.
    ///
    /// The mesh must pass [`TriangleMesh::validate`] and have a non-zero mean
    /// edge length, otherwise [`Error::InvalidInput`] is returned.
    pub fn build(mesh: &TriangleMesh) -> Result<Self> {
        mesh.validate()?;

        let characteristic_length = mesh.mean_edge_length();
        if !(characteristic_length.is_finite() && characteristic_length > 0.0) {
            return Err(Error::InvalidInput(
                "mesh is degenerate: all edges have zero length".to_string(),
            ));
        }

        let triangles: Vec<[Point3f; 3]> =
            (0..mesh.face_count()).map(|f| mesh.triangle(f)).collect();
        let boxes: Vec<Aabb> = triangles.iter().map(Aabb::from_triangle).collect();
        let centroids: Vec<Point3f> = triangles
            .iter()
            .map(|[a, b, c]| Point3f::from((a.coords + b.coords + c.coords) / 3.0))
            .collect();

        let mut order: Vec<usize> = (0..triangles.len()).collect();
        let mut nodes = Vec::with_capacity(2 * triangles.len() / MAX_LEAF_SIZE + 1);
        build_node(&boxes, &centroids, &mut order, 0, &mut nodes);

        Ok(Self {
            triangles,
            order,
            nodes,
            characteristic_length,
        })
    }

    /// Mean edge length of the indexed mesh
    pub fn characteristic_length(&self) -> f32 {
        self.characteristic_length
    }

    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    /// Unsigned distance from `point` to the closest face.
    pub fn distance(&self, point: &Point3f) -> f32 {
        let mut best = f32::INFINITY;
        let mut stack = vec![0usize];

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            if node.bbox.distance_squared(point) >= best {
                continue;
            }

            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &face in &self.order[start..start + count] {
                        let closest = closest_point_on_triangle(point, &self.triangles[face]);
                        best = best.min((closest - point).norm_squared());
                    }
                }
                NodeKind::Internal { left, right } => {
                    let left_distance = self.nodes[left].bbox.distance_squared(point);
                    let right_distance = self.nodes[right].bbox.distance_squared(point);
                    // Nearer child is popped first
                    if left_distance <= right_distance {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }

        best.sqrt()
    }
}

/// Recursively build the node covering `order[..]`, whose first element sits
/// at `offset` in the full face order. Returns the node's index.
fn build_node(
    boxes: &[Aabb],
    centroids: &[Point3f],
    order: &mut [usize],
    offset: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let bbox = order[1..]
        .iter()
        .fold(boxes[order[0]], |acc, &f| acc.merge(&boxes[f]));

    let node_index = nodes.len();
    if order.len() <= MAX_LEAF_SIZE {
        nodes.push(Node {
            bbox,
            kind: NodeKind::Leaf {
                start: offset,
                count: order.len(),
            },
        });
        return node_index;
    }

    // Placeholder, patched once both children exist
    nodes.push(Node {
        bbox,
        kind: NodeKind::Leaf { start: offset, count: 0 },
    });

    let axis = bbox.longest_axis();
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        centroids[a][axis]
            .total_cmp(&centroids[b][axis])
            .then(a.cmp(&b))
    });

    let (left_order, right_order) = order.split_at_mut(mid);
    let left = build_node(boxes, centroids, left_order, offset, nodes);
    let right = build_node(boxes, centroids, right_order, offset + mid, nodes);
    nodes[node_index].kind = NodeKind::Internal { left, right };

    node_index
}

/// Closest point on a triangle to a query point.
///
/// Region-based method from "Real-Time Collision Detection" (Ericson).
/// Degenerate triangles fall back to the closest point on their edges.
pub fn closest_point_on_triangle(point: &Point3f, triangle: &[Point3f; 3]) -> Point3f {
    let [a, b, c] = *triangle;
    let ab = b - a;
    let ac = c - a;
    let ap = point - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = point - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = point - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let sum = va + vb + vc;
    if sum.abs() <= f32::EPSILON * ab.norm_squared().max(ac.norm_squared()) {
        return closest_point_on_edges(point, triangle);
    }

    let denom = 1.0 / sum;
    a + ab * (vb * denom) + ac * (vc * denom)
}

fn closest_point_on_segment(point: &Point3f, start: Point3f, end: Point3f) -> Point3f {
    let direction = end - start;
    let length_squared = direction.norm_squared();
    if length_squared == 0.0 {
        return start;
    }
    let t = ((point - start).dot(&direction) / length_squared).clamp(0.0, 1.0);
    start + direction * t
}

fn closest_point_on_edges(point: &Point3f, triangle: &[Point3f; 3]) -> Point3f {
    let [a, b, c] = *triangle;
    [(a, b), (b, c), (c, a)]
        .into_iter()
        .map(|(s, e)| closest_point_on_segment(point, s, e))
        .min_by(|p, q| {
            (p - point)
                .norm_squared()
                .total_cmp(&(q - point).norm_squared())
        })
        .unwrap_or(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_cube() -> TriangleMesh {
        let vertices = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2],
            [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4],
            [2, 3, 7], [2, 7, 6],
            [1, 2, 6], [1, 6, 5],
            [0, 4, 7], [0, 7, 3],
        ];
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn brute_force_distance(mesh: &TriangleMesh, point: &Point3f) -> f32 {
        (0..mesh.face_count())
            .map(|f| (closest_point_on_triangle(point, &mesh.triangle(f)) - point).norm())
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn test_closest_point_regions() {
        let triangle = [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ];

        // Face interior
        let p = closest_point_on_triangle(&Point3f::new(0.25, 0.25, 2.0), &triangle);
        assert_relative_eq!(p, Point3f::new(0.25, 0.25, 0.0), epsilon = 1e-6);

        // Vertex region
        let p = closest_point_on_triangle(&Point3f::new(-1.0, -1.0, 0.0), &triangle);
        assert_relative_eq!(p, triangle[0], epsilon = 1e-6);

        // Edge region
        let p = closest_point_on_triangle(&Point3f::new(0.5, -1.0, 0.0), &triangle);
        assert_relative_eq!(p, Point3f::new(0.5, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_triangle() {
        let triangle = [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ];
        let p = closest_point_on_triangle(&Point3f::new(1.5, 1.0, 0.0), &triangle);
        assert!(p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cube_distances() {
        let index = SurfaceIndex::build(&unit_cube()).unwrap();
        assert_eq!(index.face_count(), 12);
        assert_relative_eq!(index.distance(&Point3f::new(0.5, 0.5, 0.5)), 0.5, epsilon = 1e-6);
        assert_relative_eq!(index.distance(&Point3f::new(0.5, 0.5, 3.0)), 2.0, epsilon = 1e-6);
        assert_relative_eq!(index.distance(&Point3f::new(1.0, 0.3, 0.7)), 0.0, epsilon = 1e-6);
        assert_relative_eq!(
            index.distance(&Point3f::new(2.0, 2.0, 2.0)),
            3.0f32.sqrt(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_matches_brute_force_on_larger_mesh() {
        // Tessellated height field with enough faces to produce a deep hierarchy
        let n = 20;
        let mut mesh = TriangleMesh::new();
        for i in 0..=n {
            for j in 0..=n {
                let x = i as f32 / n as f32;
                let y = j as f32 / n as f32;
                mesh.add_vertex(Point3f::new(x, y, 0.2 * (x * 6.0).sin() * (y * 4.0).cos()));
            }
        }
        for i in 0..n {
            for j in 0..n {
                let v = i * (n + 1) + j;
                mesh.add_face([v, v + n + 1, v + 1]);
                mesh.add_face([v + 1, v + n + 1, v + n + 2]);
            }
        }

        let index = SurfaceIndex::build(&mesh).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let query = Point3f::new(
                rng.gen_range(-0.5..1.5),
                rng.gen_range(-0.5..1.5),
                rng.gen_range(-1.0..1.0),
            );
            assert_relative_eq!(
                index.distance(&query),
                brute_force_distance(&mesh, &query),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn test_rejects_invalid_meshes() {
        assert!(matches!(
            SurfaceIndex::build(&TriangleMesh::new()),
            Err(Error::InvalidInput(_))
        ));

        let collapsed = TriangleMesh::from_vertices_and_faces(
            vec![Point3f::new(1.0, 1.0, 1.0); 3],
            vec![[0, 1, 2]],
        );
        assert!(matches!(
            SurfaceIndex::build(&collapsed),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_characteristic_length() {
        let index = SurfaceIndex::build(&unit_cube()).unwrap();
        assert_relative_eq!(
            index.characteristic_length(),
            (2.0 + 2.0f32.sqrt()) / 3.0,
            epsilon = 1e-6
        );
    }
}
