//! Mesh geometry built from stage polygon data.
//!
//! This module provides the triangulated, engine-agnostic mesh that mesh
//! assets are built from. Polygon data coming from a stage is validated
//! while it is triangulated, since malformed geometry is common in the wild.

use stagelink_math::{Aabb, Mat4, Vec3};
use thiserror::Error;

/// Reasons polygon data cannot be turned into a mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("Face {face} has invalid vertex count {count}")]
    InvalidFaceCount { face: usize, count: i32 },

    #[error("Face vertex counts sum to {expected} but {actual} indices were given")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Vertex index {index} out of range for {vertex_count} points")]
    IndexOutOfRange { index: i32, vertex_count: usize },
}

/// A mesh consisting of vertex positions, optional normals, and triangle indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - will be computed if not provided)
    pub normals: Option<Vec<Vec3>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Aabb::from_point_cloud(&positions);
        Self {
            positions,
            normals,
            indices,
            bounds,
        }
    }

    /// Create an empty mesh.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), None)
    }

    /// Build a mesh from polygon data, fan-triangulating n-gons.
    ///
    /// Faces with fewer than three vertices are skipped. Counts must add up
    /// to the number of indices and every index must address a point.
    pub fn from_polygons(
        points: Vec<Vec3>,
        face_vertex_counts: &[i32],
        face_vertex_indices: &[i32],
        normals: Option<Vec<Vec3>>,
    ) -> Result<Self, MeshError> {
        let mut expected = 0usize;
        for (face, &count) in face_vertex_counts.iter().enumerate() {
            if count < 0 {
                return Err(MeshError::InvalidFaceCount { face, count });
            }
            expected += count as usize;
        }
        if expected != face_vertex_indices.len() {
            return Err(MeshError::CountMismatch {
                expected,
                actual: face_vertex_indices.len(),
            });
        }
        if let Some(&index) = face_vertex_indices
            .iter()
            .find(|&&i| i < 0 || i as usize >= points.len())
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: points.len(),
            });
        }

        let indices = triangulate(face_vertex_counts, face_vertex_indices);
        Ok(Self::new(points, indices, normals))
    }

    /// Compute smooth vertex normals by averaging face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        // Accumulate face normals at each vertex
        for face in self.indices.chunks_exact(3) {
            let i0 = face[0] as usize;
            let i1 = face[1] as usize;
            let i2 = face[2] as usize;

            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let edge1 = self.positions[i1] - p0;
            let edge2 = self.positions[i2] - p0;
            let face_normal = edge2.cross(edge1); // USD uses CW winding

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            let len = normal.length();
            if len > 0.0 {
                *normal /= len;
            } else {
                *normal = Vec3::Y; // Default up normal for degenerate cases
            }
        }

        self.normals = Some(normals);
    }

    /// Check if the mesh has normals.
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Ensure the mesh has per-vertex normals, computing them if necessary.
    /// Also recomputes if existing normals don't match vertex count (e.g., face-varying normals).
    pub fn ensure_normals(&mut self) {
        let authored = self.normals.as_ref().map(Vec::len);
        match authored {
            Some(len) if len == self.positions.len() => {}
            Some(len) => {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    len,
                    self.positions.len()
                );
                self.compute_normals();
            }
            None => self.compute_normals(),
        }
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// A copy of this mesh with positions and normals transformed.
    pub fn transformed(&self, matrix: &Mat4) -> Mesh {
        let positions = self
            .positions
            .iter()
            .map(|p| matrix.transform_point3(*p))
            .collect();
        let normal_matrix = matrix.inverse().transpose();
        let normals = self.normals.as_ref().map(|normals| {
            normals
                .iter()
                .map(|n| normal_matrix.transform_vector3(*n).normalize_or_zero())
                .collect()
        });
        Mesh::new(positions, self.indices.clone(), normals)
    }

    /// Append another mesh, offsetting its indices.
    ///
    /// Normals are kept only if both meshes have per-vertex normals.
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.positions.len() as u32;
        let was_empty = self.positions.is_empty();

        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if was_empty => Some(theirs.clone()),
            _ => None,
        };
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
        self.bounds = Aabb::surrounding(&self.bounds, &other.bounds);
    }
}

/// Fan triangulation of validated polygon data.
///
/// For a polygon with vertices [0, 1, 2, 3, ...n-1] this creates
/// (0,1,2), (0,2,3), ... (0,n-2,n-1).
fn triangulate(face_vertex_counts: &[i32], face_vertex_indices: &[i32]) -> Vec<u32> {
    let mut indices = Vec::new();
    let mut vertex_offset = 0usize;

    for &count in face_vertex_counts {
        let count = count as usize;
        if count >= 3 {
            for i in 1..(count - 1) {
                indices.push(face_vertex_indices[vertex_offset] as u32);
                indices.push(face_vertex_indices[vertex_offset + i] as u32);
                indices.push(face_vertex_indices[vertex_offset + i + 1] as u32);
            }
        }
        vertex_offset += count;
    }

    indices
}
