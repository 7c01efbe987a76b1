//! Triangulated surface mesh.
//!
//! [`SurfaceMesh`] stores positions and triangles as flat face-vertex
//! arrays, which is what the extractor produces and what every exchange
//! format expects. Adjacency is optional and lives in a [`NeighborList`]
//! built on demand.
//!
//! Every topological mutation bumps the mesh revision and drops the mesh
//! back to [`MeshStage::Raw`]. A neighbor list built for an older revision
//! is stale: reading it is an error until it is destroyed and rebuilt.
//! Moving vertices does not change the revision.

use nalgebra::{Point3, Vector3};

use super::neighbors::NeighborList;
use crate::error::{MeshError, Result};

/// Marker value meaning "unmarked".
pub const MARKER_SENTINEL: i32 = 0;

/// Processing stage of a surface mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MeshStage {
    /// Freshly extracted or edited; adjacency not certified.
    #[default]
    Raw,
    /// Adjacency built and checked; islands removed.
    Consistent,
    /// Passed through the smoothing/coarsening loop.
    Improved,
    /// Handed to an exporter.
    Exported,
}

/// A triangle surface mesh with optional adjacency and markers.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    pub(crate) vertices: Vec<Point3<f64>>,
    pub(crate) faces: Vec<[usize; 3]>,
    neighbors: Option<NeighborList>,
    vertex_markers: Option<Vec<i32>>,
    face_markers: Option<Vec<i32>>,
    revision: u64,
    stage: MeshStage,
}

impl SurfaceMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mesh with pre-allocated storage.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(num_vertices),
            faces: Vec::with_capacity(num_faces),
            ..Self::default()
        }
    }

    /// Build a mesh from vertex positions and triangles.
    ///
    /// Fails with [`MeshError::InvalidVertexIndex`] if a face references a
    /// missing vertex, and with [`MeshError::InvalidInput`] if a face
    /// repeats a vertex.
    pub fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Result<Self> {
        validate_faces(vertices.len(), &faces)?;
        Ok(Self {
            vertices,
            faces,
            ..Self::default()
        })
    }

    // ==================== Accessors ====================

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Whether the mesh has no faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Vertex positions.
    #[inline]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Triangles as vertex index triples.
    #[inline]
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Position of vertex `v`.
    #[inline]
    pub fn position(&self, v: usize) -> &Point3<f64> {
        &self.vertices[v]
    }

    /// Move vertex `v`. Geometry only; adjacency stays valid.
    #[inline]
    pub fn set_position(&mut self, v: usize, p: Point3<f64>) {
        self.vertices[v] = p;
    }

    /// Mutable access to positions. Geometry only; adjacency stays valid.
    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.vertices
    }

    /// Current topology revision.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current processing stage.
    #[inline]
    pub fn stage(&self) -> MeshStage {
        self.stage
    }

    /// Advance the stage; never moves it backwards. Leaving `Raw`
    /// requires [`certify`](Self::certify).
    pub fn promote(&mut self, stage: MeshStage) -> Result<()> {
        if self.stage == MeshStage::Raw && stage > MeshStage::Raw {
            return Err(MeshError::topology("mesh must be certified before promotion"));
        }
        if stage > self.stage {
            self.stage = stage;
        }
        Ok(())
    }

    /// Fail unless the mesh has been certified since its last topology change.
    pub fn require_certified(&self) -> Result<()> {
        if self.stage == MeshStage::Raw {
            return Err(MeshError::topology(
                "mesh has not been certified since its last topology change",
            ));
        }
        Ok(())
    }

    // ==================== Construction ====================

    /// Append a vertex and return its index.
    pub fn add_vertex(&mut self, p: Point3<f64>) -> usize {
        self.touch();
        self.vertices.push(p);
        if let Some(m) = &mut self.vertex_markers {
            m.push(MARKER_SENTINEL);
        }
        self.vertices.len() - 1
    }

    /// Append a triangle and return its index.
    pub fn add_face(&mut self, face: [usize; 3]) -> Result<usize> {
        validate_faces(self.vertices.len(), std::slice::from_ref(&face))
            .map_err(|e| match e {
                MeshError::InvalidVertexIndex { vertex, .. } => MeshError::InvalidVertexIndex {
                    face: self.faces.len(),
                    vertex,
                },
                other => other,
            })?;
        self.touch();
        self.faces.push(face);
        if let Some(m) = &mut self.face_markers {
            m.push(MARKER_SENTINEL);
        }
        Ok(self.faces.len() - 1)
    }

    /// Replace all geometry and topology. Markers are kept only if their
    /// lengths still match.
    pub(crate) fn replace(&mut self, vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) {
        self.touch();
        if self.vertex_markers.as_ref().is_some_and(|m| m.len() != vertices.len()) {
            self.vertex_markers = None;
        }
        if self.face_markers.as_ref().is_some_and(|m| m.len() != faces.len()) {
            self.face_markers = None;
        }
        self.vertices = vertices;
        self.faces = faces;
    }

    /// Replace the face markers wholesale. Length must match the face count.
    pub(crate) fn set_face_markers(&mut self, markers: Option<Vec<i32>>) {
        debug_assert!(markers.as_ref().map_or(true, |m| m.len() == self.faces.len()));
        self.face_markers = markers;
    }

    /// Replace the vertex markers wholesale. Length must match the vertex count.
    pub(crate) fn set_vertex_markers(&mut self, markers: Option<Vec<i32>>) {
        debug_assert!(markers.as_ref().map_or(true, |m| m.len() == self.vertices.len()));
        self.vertex_markers = markers;
    }

    /// Mutable access to the triangles. Counts as a topology change.
    pub(crate) fn faces_mut(&mut self) -> &mut [[usize; 3]] {
        self.touch();
        &mut self.faces
    }

    /// Record a topology change.
    #[inline]
    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.stage = MeshStage::Raw;
    }

    /// Free all storage. The mesh is empty afterwards.
    pub fn release(&mut self) {
        self.touch();
        self.vertices = Vec::new();
        self.faces = Vec::new();
        self.neighbors = None;
        self.vertex_markers = None;
        self.face_markers = None;
    }

    // ==================== Adjacency ====================

    /// Build the neighbor list for the current topology.
    ///
    /// Fails if a list (stale or not) already exists; destroy it first.
    pub fn build_neighbors(&mut self) -> Result<()> {
        if self.neighbors.is_some() {
            return Err(MeshError::topology(
                "neighbor list already built; destroy it before rebuilding",
            ));
        }
        self.neighbors = Some(NeighborList::build(
            self.vertices.len(),
            &self.faces,
            self.revision,
        ));
        Ok(())
    }

    /// Drop the neighbor list. A no-op without one.
    pub fn destroy_neighbors(&mut self) {
        self.neighbors = None;
    }

    /// Destroy and build in one step.
    pub fn rebuild_neighbors(&mut self) -> Result<()> {
        self.destroy_neighbors();
        self.build_neighbors()
    }

    /// Whether a neighbor list exists (possibly stale).
    #[inline]
    pub fn has_neighbors(&self) -> bool {
        self.neighbors.is_some()
    }

    /// The neighbor list, if it exists and matches the current topology.
    pub fn neighbors(&self) -> Result<&NeighborList> {
        match &self.neighbors {
            None => Err(MeshError::topology("neighbor list has not been built")),
            Some(list) if list.revision() != self.revision => Err(MeshError::topology(format!(
                "neighbor list is stale (built for revision {}, mesh is at {})",
                list.revision(),
                self.revision
            ))),
            Some(list) => Ok(list),
        }
    }

    /// Detach an up-to-date neighbor list for a geometry-only pass. Hand
    /// it back with [`restore_neighbors`](Self::restore_neighbors).
    pub(crate) fn take_neighbors(&mut self) -> Result<NeighborList> {
        self.neighbors()?;
        self.neighbors
            .take()
            .ok_or_else(|| MeshError::topology("neighbor list has not been built"))
    }

    /// Reattach a list taken with [`take_neighbors`](Self::take_neighbors).
    pub(crate) fn restore_neighbors(&mut self, list: NeighborList) {
        debug_assert_eq!(list.revision(), self.revision);
        self.neighbors = Some(list);
    }

    /// Validate indices, build fresh adjacency and reject non-manifold
    /// edges. Promotes a `Raw` mesh to `Consistent`.
    pub fn certify(&mut self) -> Result<()> {
        validate_faces(self.vertices.len(), &self.faces)?;
        self.rebuild_neighbors()?;
        let bad = self.neighbors()?.nonmanifold_edges();
        if bad > 0 {
            return Err(MeshError::topology(format!(
                "{} face edges are shared by more than two triangles",
                bad
            )));
        }
        if self.stage == MeshStage::Raw {
            self.stage = MeshStage::Consistent;
        }
        Ok(())
    }

    /// Certify again and restore `stage` after an operation that keeps the
    /// mesh manifold. A no-op for `Raw`.
    pub(crate) fn recertify(&mut self, stage: MeshStage) -> Result<()> {
        if stage == MeshStage::Raw {
            return Ok(());
        }
        self.certify()?;
        self.promote(stage)
    }

    // ==================== Markers ====================

    /// Allocate vertex markers filled with the sentinel. Replaces existing ones.
    pub fn create_vertex_markers(&mut self) {
        self.vertex_markers = Some(vec![MARKER_SENTINEL; self.vertices.len()]);
    }

    /// Reset vertex markers to the sentinel without reallocating.
    pub fn reset_vertex_markers(&mut self) {
        if let Some(m) = &mut self.vertex_markers {
            m.fill(MARKER_SENTINEL);
        }
    }

    /// Drop the vertex markers.
    pub fn destroy_vertex_markers(&mut self) {
        self.vertex_markers = None;
    }

    /// Vertex markers, if allocated.
    pub fn vertex_markers(&self) -> Option<&[i32]> {
        self.vertex_markers.as_deref()
    }

    /// Mutable vertex markers, if allocated.
    pub fn vertex_markers_mut(&mut self) -> Option<&mut [i32]> {
        self.vertex_markers.as_deref_mut()
    }

    /// Allocate face markers filled with the sentinel. Replaces existing ones.
    pub fn create_face_markers(&mut self) {
        self.face_markers = Some(vec![MARKER_SENTINEL; self.faces.len()]);
    }

    /// Reset face markers to the sentinel without reallocating.
    pub fn reset_face_markers(&mut self) {
        if let Some(m) = &mut self.face_markers {
            m.fill(MARKER_SENTINEL);
        }
    }

    /// Drop the face markers.
    pub fn destroy_face_markers(&mut self) {
        self.face_markers = None;
    }

    /// Face markers, if allocated.
    pub fn face_markers(&self) -> Option<&[i32]> {
        self.face_markers.as_deref()
    }

    /// Mutable face markers, if allocated.
    pub fn face_markers_mut(&mut self) -> Option<&mut [i32]> {
        self.face_markers.as_deref_mut()
    }

    // ==================== Geometry ====================

    /// Positions of the three corners of face `f`.
    #[inline]
    pub fn face_positions(&self, f: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[f];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Unit normal of face `f`; zero for a degenerate face.
    pub fn face_normal(&self, f: usize) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0)
            .cross(&(p2 - p0))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Area of face `f`.
    pub fn face_area(&self, f: usize) -> f64 {
        let [p0, p1, p2] = self.face_positions(f);
        0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
    }

    /// Centroid of face `f`.
    pub fn face_centroid(&self, f: usize) -> Point3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        Point3::from((p0.coords + p1.coords + p2.coords) / 3.0)
    }

    /// Interior angles of face `f` in degrees, at corners 0, 1 and 2.
    pub fn face_angles(&self, f: usize) -> [f64; 3] {
        triangle_angles(&self.face_positions(f))
    }

    /// Unique undirected edges as `(lo, hi)` pairs, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .faces
            .iter()
            .flat_map(|f| {
                (0..3).map(move |i| {
                    let (a, b) = (f[i], f[(i + 1) % 3]);
                    (a.min(b), a.max(b))
                })
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Mean length of the unique edges; zero for an empty mesh.
    pub fn average_edge_length(&self) -> f64 {
        let edges = self.edges();
        if edges.is_empty() {
            return 0.0;
        }
        let total: f64 = edges
            .iter()
            .map(|&(a, b)| (self.vertices[b] - self.vertices[a]).norm())
            .sum();
        total / edges.len() as f64
    }

    /// Axis-aligned bounds of the vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.vertices {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Total area.
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume (positive for outward normals on a closed surface).
    pub fn signed_volume(&self) -> f64 {
        signed_volume_of(&self.vertices, self.faces.iter())
    }

    /// `V - E + F`.
    pub fn euler_characteristic(&self) -> i64 {
        self.vertices.len() as i64 - self.edges().len() as i64 + self.faces.len() as i64
    }

    // ==================== Transforms ====================

    /// Shift every vertex by `offset`.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for p in &mut self.vertices {
            *p += offset;
        }
    }

    /// Scale each axis independently about the origin.
    pub fn scale(&mut self, sx: f64, sy: f64, sz: f64) {
        for p in &mut self.vertices {
            p.x *= sx;
            p.y *= sy;
            p.z *= sz;
        }
    }

    /// Scale uniformly about the origin.
    pub fn scale_uniform(&mut self, s: f64) {
        self.scale(s, s, s);
    }

    /// Move the bounding box centre to the origin.
    pub fn centeralize(&mut self) {
        if let Some((min, max)) = self.bounding_box() {
            let center = nalgebra::center(&min, &max);
            self.translate(-center.coords);
        }
    }

    /// Centre of the bounding box and the largest distance from it to a vertex.
    pub fn center_radius(&self) -> Option<(Point3<f64>, f64)> {
        let (min, max) = self.bounding_box()?;
        let center = nalgebra::center(&min, &max);
        let radius = self
            .vertices
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0, f64::max);
        Some((center, radius))
    }

    // ==================== Primitives ====================

    /// Unit sphere: an octahedron refined `level` times and projected
    /// onto the sphere. Has `4^level * 8` faces.
    pub fn sphere(level: usize) -> Self {
        let vertices = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let faces = vec![
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        let mut mesh = Self {
            vertices,
            faces,
            ..Self::default()
        };
        for _ in 0..level {
            crate::algo::refine::subdivide(&mut mesh);
        }
        for p in &mut mesh.vertices {
            *p = Point3::from(p.coords.normalize());
        }
        mesh
    }
}

/// Check face indices against a vertex count.
pub(crate) fn validate_faces(num_vertices: usize, faces: &[[usize; 3]]) -> Result<()> {
    for (fi, face) in faces.iter().enumerate() {
        for &v in face {
            if v >= num_vertices {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: v });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(MeshError::invalid_input(format!(
                "face {} repeats a vertex: {:?}",
                fi, face
            )));
        }
    }
    Ok(())
}

/// Interior angles of a triangle in degrees.
pub(crate) fn triangle_angles(p: &[Point3<f64>; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for i in 0..3 {
        let a = p[(i + 1) % 3] - p[i];
        let b = p[(i + 2) % 3] - p[i];
        let denom = a.norm() * b.norm();
        out[i] = if denom > 0.0 {
            (a.dot(&b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
        } else {
            0.0
        };
    }
    out
}

/// Divergence-theorem volume of a set of triangles.
pub(crate) fn signed_volume_of<'a>(
    vertices: &[Point3<f64>],
    faces: impl Iterator<Item = &'a [usize; 3]>,
) -> f64 {
    faces
        .map(|&[a, b, c]| {
            vertices[a]
                .coords
                .dot(&vertices[b].coords.cross(&vertices[c].coords))
        })
        .sum::<f64>()
        / 6.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> SurfaceMesh {
        SurfaceMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_from_parts_rejects_bad_index() {
        let result = SurfaceMesh::from_parts(vec![Point3::origin(); 3], vec![[0, 1, 5]]);
        assert!(matches!(
            result,
            Err(MeshError::InvalidVertexIndex { face: 0, vertex: 5 })
        ));
    }

    #[test]
    fn test_tetrahedron_geometry() {
        let mesh = tetrahedron();
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!((mesh.signed_volume() - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(mesh.edges().len(), 6);
        let angles = mesh.face_angles(0);
        assert!((angles.iter().sum::<f64>() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_neighbor_lifecycle() {
        let mut mesh = tetrahedron();
        assert!(mesh.neighbors().is_err());
        mesh.build_neighbors().unwrap();
        let first = mesh.neighbors().unwrap().clone();
        assert!(matches!(
            mesh.build_neighbors(),
            Err(MeshError::TopologyInconsistent(_))
        ));
        mesh.destroy_neighbors();
        mesh.build_neighbors().unwrap();
        assert_eq!(mesh.neighbors().unwrap(), &first);
    }

    #[test]
    fn test_mutation_makes_list_stale() {
        let mut mesh = tetrahedron();
        mesh.certify().unwrap();
        assert_eq!(mesh.stage(), MeshStage::Consistent);

        mesh.set_position(0, Point3::new(-0.1, 0.0, 0.0));
        assert!(mesh.neighbors().is_ok());

        let v = mesh.add_vertex(Point3::new(2.0, 2.0, 2.0));
        assert_eq!(v, 4);
        assert!(matches!(
            mesh.neighbors(),
            Err(MeshError::TopologyInconsistent(_))
        ));
        assert_eq!(mesh.stage(), MeshStage::Raw);
        assert!(mesh.require_certified().is_err());
    }

    #[test]
    fn test_certify_rejects_nonmanifold() {
        let mut mesh = SurfaceMesh::from_parts(
            vec![Point3::origin(); 5],
            vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]],
        )
        .unwrap();
        assert!(matches!(
            mesh.certify(),
            Err(MeshError::TopologyInconsistent(_))
        ));
        assert_eq!(mesh.stage(), MeshStage::Raw);
    }

    #[test]
    fn test_markers() {
        let mut mesh = tetrahedron();
        mesh.create_vertex_markers();
        mesh.create_face_markers();
        mesh.vertex_markers_mut().unwrap()[2] = 7;
        mesh.face_markers_mut().unwrap()[1] = 3;
        mesh.reset_vertex_markers();
        assert!(mesh.vertex_markers().unwrap().iter().all(|&m| m == MARKER_SENTINEL));
        assert_eq!(mesh.face_markers().unwrap()[1], 3);
        mesh.add_vertex(Point3::origin());
        assert_eq!(mesh.vertex_markers().unwrap().len(), 5);
        mesh.destroy_face_markers();
        assert!(mesh.face_markers().is_none());
    }

    #[test]
    fn test_release() {
        let mut mesh = tetrahedron();
        mesh.certify().unwrap();
        mesh.create_vertex_markers();
        mesh.release();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(!mesh.has_neighbors());
        assert!(mesh.vertex_markers().is_none());
    }

    #[test]
    fn test_transforms() {
        let mut mesh = tetrahedron();
        mesh.translate(Vector3::new(1.0, 2.0, 3.0));
        mesh.centeralize();
        let (min, max) = mesh.bounding_box().unwrap();
        assert!((min.coords + max.coords).norm() < 1e-12);

        mesh.scale(2.0, 1.0, 1.0);
        let (min, max) = mesh.bounding_box().unwrap();
        assert!((max.x - min.x - 2.0).abs() < 1e-12);
        assert!((max.y - min.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sphere_primitive() {
        let mesh = SurfaceMesh::sphere(2);
        assert_eq!(mesh.num_faces(), 8 * 16);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(mesh.signed_volume() > 0.0);
        for p in mesh.vertices() {
            assert!((p.coords.norm() - 1.0).abs() < 1e-12);
        }
        let (center, radius) = mesh.center_radius().unwrap();
        assert!(center.coords.norm() < 1e-12);
        assert!((radius - 1.0).abs() < 1e-12);
    }
}
