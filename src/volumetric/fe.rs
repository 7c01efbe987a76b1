//! Finite-element projection of a tetrahedral mesh.

use std::collections::HashMap;

use nalgebra::Point3;

use super::tet_mesh::TetMesh;
use crate::mesh::{SurfaceMesh, MARKER_SENTINEL};

/// Face type of a face shared by two tetrahedra.
pub const INTERIOR_FACE: i32 = 0;
/// Face type of a boundary face without a source marker.
pub const DEFAULT_BOUNDARY_FACE: i32 = 1;

/// A vertex record: id, chart and position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeVertex {
    /// Vertex number.
    pub id: usize,
    /// Coordinate chart; always 0.
    pub chart: i32,
    /// Position.
    pub position: Point3<f64>,
}

/// A simplex record.
///
/// `face_types[i]` and `neighbors[i]` describe the face opposite
/// `vertices[i]`; a missing neighbor is `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeSimplex {
    /// Simplex number.
    pub id: usize,
    /// Group; always 0.
    pub group: i32,
    /// Material, from the region attribute.
    pub material: i32,
    /// Per-face boundary type.
    pub face_types: [i32; 4],
    /// Per-face neighbor simplex, `-1` on the boundary.
    pub neighbors: [i64; 4],
    /// Vertex numbers.
    pub vertices: [usize; 4],
}

/// A finite-element mesh ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct FeMesh {
    /// Intrinsic dimension.
    pub dim: u32,
    /// Embedding dimension.
    pub dimii: u32,
    /// Vertex records.
    pub vertices: Vec<FeVertex>,
    /// Simplex records.
    pub simplices: Vec<FeSimplex>,
}

type PositionKey = [[u64; 3]; 3];

fn face_key(points: [Point3<f64>; 3]) -> PositionKey {
    let mut key = points.map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]);
    key.sort_unstable();
    key
}

impl FeMesh {
    /// Project a tetrahedral mesh.
    ///
    /// Materials come from the region attributes. Any face, shared or not,
    /// that lies on a marked triangle of the mesh's constrained surface or
    /// of `boundary` takes that marker; `boundary` wins where both mark the
    /// same triangle. Other boundary faces get [`DEFAULT_BOUNDARY_FACE`] and
    /// other shared faces [`INTERIOR_FACE`].
    pub fn from_tet_mesh(tet: &TetMesh, boundary: Option<&SurfaceMesh>) -> Self {
        let mut markers: HashMap<PositionKey, i32> = HashMap::new();
        for surface in [tet.constrained_surface(), boundary].into_iter().flatten() {
            if let Some(face_markers) = surface.face_markers() {
                for (f, &m) in face_markers.iter().enumerate() {
                    if m != MARKER_SENTINEL {
                        markers.insert(face_key(surface.face_positions(f)), m);
                    }
                }
            }
        }

        let vertices = tet
            .vertices()
            .iter()
            .enumerate()
            .map(|(id, &position)| FeVertex {
                id,
                chart: 0,
                position,
            })
            .collect();

        let simplices = (0..tet.num_tets())
            .map(|t| {
                let adj = tet.neighbors()[t];
                let mut face_types = [INTERIOR_FACE; 4];
                for (i, face_type) in face_types.iter_mut().enumerate() {
                    let points = tet.face(t, i).map(|v| tet.vertices()[v]);
                    *face_type = match markers.get(&face_key(points)) {
                        Some(&m) => m,
                        None if adj[i].is_valid() => INTERIOR_FACE,
                        None => DEFAULT_BOUNDARY_FACE,
                    };
                }
                FeSimplex {
                    id: t,
                    group: 0,
                    material: tet.regions()[t],
                    face_types,
                    neighbors: adj.map(|n| n.to_signed()),
                    vertices: tet.tets()[t],
                }
            })
            .collect();

        Self {
            dim: 3,
            dimii: 3,
            vertices,
            simplices,
        }
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of simplices.
    pub fn num_simplices(&self) -> usize {
        self.simplices.len()
    }
}
