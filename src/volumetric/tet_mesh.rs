//! Tetrahedral meshes.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{SurfaceMesh, TetId};

/// Outward faces of a positively oriented tetrahedron; entry `i` is the
/// face opposite vertex `i`.
pub(crate) const TET_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Six times the signed volume of `[a, b, c, d]`; positive when `d` lies
/// on the side `(b - a) × (c - a)` points to.
#[inline]
pub(crate) fn orient(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

/// A tetrahedral mesh with adjacency and region attributes.
///
/// Every tetrahedron is stored positively oriented. `neighbors()[t][i]` is
/// the tetrahedron across the face opposite vertex `i`, or the invalid
/// sentinel on the boundary.
///
/// A mesh built from a surface also keeps that surface as recovered in the
/// tetrahedra: each of its triangles is a tetrahedron face, and it carries
/// the source face markers.
#[derive(Debug, Clone, Default)]
pub struct TetMesh {
    vertices: Vec<Point3<f64>>,
    tets: Vec<[usize; 4]>,
    neighbors: Vec<[TetId; 4]>,
    regions: Vec<i32>,
    constrained: Option<SurfaceMesh>,
}

impl TetMesh {
    /// Build a mesh from positions, tetrahedra and one region per
    /// tetrahedron. Inverted tetrahedra are reoriented; degenerate ones and
    /// faces shared by more than two tetrahedra are rejected.
    pub fn new(vertices: Vec<Point3<f64>>, mut tets: Vec<[usize; 4]>, regions: Vec<i32>) -> Result<Self> {
        if regions.len() != tets.len() {
            return Err(MeshError::invalid_input(format!(
                "{} regions for {} tetrahedra",
                regions.len(),
                tets.len()
            )));
        }
        for (ti, tet) in tets.iter_mut().enumerate() {
            if let Some(&v) = tet.iter().find(|&&v| v >= vertices.len()) {
                return Err(MeshError::invalid_input(format!(
                    "tetrahedron {} references invalid vertex index {}",
                    ti, v
                )));
            }
            let [a, b, c, d] = tet.map(|v| vertices[v]);
            let o = orient(&a, &b, &c, &d);
            if o == 0.0 || !o.is_finite() {
                return Err(MeshError::invalid_input(format!("tetrahedron {} is degenerate", ti)));
            }
            if o < 0.0 {
                tet.swap(2, 3);
            }
        }
        let neighbors = tet_adjacency(&tets)?;
        Ok(Self {
            vertices,
            tets,
            neighbors,
            regions,
            constrained: None,
        })
    }

    /// Attach the surface the tetrahedra conform to.
    pub fn with_constrained_surface(mut self, surface: SurfaceMesh) -> Self {
        self.constrained = Some(surface);
        self
    }

    /// The surface the tetrahedra conform to, refined where its triangles
    /// had to be split.
    pub fn constrained_surface(&self) -> Option<&SurfaceMesh> {
        self.constrained.as_ref()
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of tetrahedra.
    #[inline]
    pub fn num_tets(&self) -> usize {
        self.tets.len()
    }

    /// Whether the mesh has no tetrahedra.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tets.is_empty()
    }

    /// Vertex positions.
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Tetrahedra as vertex index quadruples.
    pub fn tets(&self) -> &[[usize; 4]] {
        &self.tets
    }

    /// Per-tetrahedron neighbors across the face opposite each vertex.
    pub fn neighbors(&self) -> &[[TetId; 4]] {
        &self.neighbors
    }

    /// Per-tetrahedron region attributes.
    pub fn regions(&self) -> &[i32] {
        &self.regions
    }

    /// The outward face of `t` opposite its vertex `i`.
    pub fn face(&self, t: usize, i: usize) -> [usize; 3] {
        TET_FACES[i].map(|k| self.tets[t][k])
    }

    /// Volume of tetrahedron `t`.
    pub fn tet_volume(&self, t: usize) -> f64 {
        let [a, b, c, d] = self.tets[t].map(|v| self.vertices[v]);
        orient(&a, &b, &c, &d) / 6.0
    }

    /// Total volume.
    pub fn volume(&self) -> f64 {
        (0..self.tets.len()).map(|t| self.tet_volume(t)).sum()
    }

    /// Circumradius over shortest edge of tetrahedron `t`.
    pub fn radius_edge_ratio(&self, t: usize) -> f64 {
        let p = self.tets[t].map(|v| self.vertices[v]);
        radius_edge_ratio(&p)
    }

    /// Boundary faces as `(tet, local face)` pairs.
    pub fn boundary_faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.neighbors.iter().enumerate().flat_map(|(t, adj)| {
            (0..4).filter(move |&i| !adj[i].is_valid()).map(move |i| (t, i))
        })
    }

    /// The faces used by exactly one tetrahedron, oriented outward, as a
    /// surface over the vertices they reference.
    pub fn surface_extract(&self) -> Result<SurfaceMesh> {
        let faces: Vec<[usize; 3]> = self.boundary_faces().map(|(t, i)| self.face(t, i)).collect();
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        let faces = faces
            .into_iter()
            .map(|f| {
                f.map(|v| {
                    if remap[v] == usize::MAX {
                        remap[v] = vertices.len();
                        vertices.push(self.vertices[v]);
                    }
                    remap[v]
                })
            })
            .collect();
        SurfaceMesh::from_parts(vertices, faces)
    }
}

/// Circumsphere of a tetrahedron, `None` when it is flat.
pub(crate) fn circumsphere(p: &[Point3<f64>; 4]) -> Option<(Point3<f64>, f64)> {
    let ba = p[1] - p[0];
    let ca = p[2] - p[0];
    let da = p[3] - p[0];
    let denom = 2.0 * ba.dot(&ca.cross(&da));
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let offset = (ca.cross(&da) * ba.norm_squared()
        + da.cross(&ba) * ca.norm_squared()
        + ba.cross(&ca) * da.norm_squared())
        / denom;
    Some((p[0] + offset, offset.norm_squared()))
}

pub(crate) fn radius_edge_ratio(p: &[Point3<f64>; 4]) -> f64 {
    let Some((_, r2)) = circumsphere(p) else {
        return f64::INFINITY;
    };
    let mut shortest = f64::INFINITY;
    for i in 0..4 {
        for j in (i + 1)..4 {
            shortest = shortest.min((p[j] - p[i]).norm_squared());
        }
    }
    (r2 / shortest).sqrt()
}

/// Tetrahedron adjacency via shared faces.
fn tet_adjacency(tets: &[[usize; 4]]) -> Result<Vec<[TetId; 4]>> {
    let mut face_map: HashMap<[usize; 3], (usize, usize)> = HashMap::with_capacity(tets.len() * 2);
    let mut neighbors = vec![[TetId::invalid(); 4]; tets.len()];
    for (t, tet) in tets.iter().enumerate() {
        for (i, face) in TET_FACES.iter().enumerate() {
            let mut key = face.map(|k| tet[k]);
            key.sort_unstable();
            match face_map.remove(&key) {
                Some((u, j)) => {
                    if neighbors[u][j].is_valid() {
                        return Err(MeshError::topology(format!(
                            "face {:?} is shared by more than two tetrahedra",
                            key
                        )));
                    }
                    neighbors[t][i] = TetId::new(u);
                    neighbors[u][j] = TetId::new(t);
                    // Re-insert so a third user is caught.
                    face_map.insert(key, (t, i));
                }
                None => {
                    face_map.insert(key, (t, i));
                }
            }
        }
    }
    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tetrahedra sharing the face `[0, 1, 2]`.
    fn bipyramid() -> TetMesh {
        TetMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(0.0, 0.0, -1.0),
            ],
            vec![[0, 1, 2, 3], [0, 1, 2, 4]],
            vec![1, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_orientation_fixed() {
        let mesh = bipyramid();
        for t in 0..mesh.num_tets() {
            assert!(mesh.tet_volume(t) > 0.0);
        }
        assert!((mesh.volume() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_adjacency() {
        let mesh = bipyramid();
        let shared: Vec<_> = mesh.neighbors()[0].iter().filter(|n| n.is_valid()).collect();
        assert_eq!(shared, vec![&TetId::new(1)]);
        assert_eq!(mesh.boundary_faces().count(), 6);
    }

    #[test]
    fn test_surface_extract_outward() {
        let mesh = bipyramid();
        let surface = mesh.surface_extract().unwrap();
        assert_eq!(surface.num_faces(), 6);
        assert_eq!(surface.num_vertices(), 5);
        assert!((surface.signed_volume() - mesh.volume()).abs() < 1e-12);
        assert_eq!(surface.euler_characteristic(), 2);
    }

    #[test]
    fn test_rejects_overshared_face() {
        let result = TetMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(0.0, 0.0, -1.0),
                Point3::new(0.0, 0.0, 2.0),
            ],
            vec![[0, 1, 2, 3], [0, 1, 2, 4], [0, 1, 2, 5]],
            vec![0; 3],
        );
        assert!(matches!(result, Err(MeshError::TopologyInconsistent(_))));
    }

    #[test]
    fn test_rejects_degenerate() {
        let result = TetMesh::new(vec![Point3::origin(); 4], vec![[0, 1, 2, 3]], vec![0]);
        assert!(matches!(result, Err(MeshError::InvalidInput(_))));
    }

    #[test]
    fn test_regular_tet_ratio() {
        let p = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        // sqrt(6)/4 for a regular tetrahedron.
        assert!((radius_edge_ratio(&p) - 6f64.sqrt() / 4.0).abs() < 1e-12);
    }
}
