//! Vertex/triangle adjacency.
//!
//! A [`NeighborList`] stores, for every vertex, the corners of the
//! triangles incident to it. Records live in a single arena; each vertex
//! owns the contiguous range `offsets[v]..offsets[v + 1]`. Within a range
//! the corners are ordered as a fan, so that `ring[i].next == ring[i + 1].prev`
//! wherever the one-ring is manifold.
//!
//! The list also records, for every triangle, the triangle across each of
//! its three edges.
//!
//! A list is built for one revision of its mesh. The mesh bumps its
//! revision on every topological mutation, and a list built for an older
//! revision is rejected by [`SurfaceMesh::neighbors`](super::SurfaceMesh::neighbors).

use super::index::{FaceId, VertexId};

/// One corner of a triangle, seen from the vertex that owns the record.
///
/// For a face `[v, a, b]` the record stored at `v` is
/// `Corner { face, next: a, prev: b }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    /// The incident triangle.
    pub face: FaceId,
    /// The vertex following the owner in the triangle's winding.
    pub next: VertexId,
    /// The vertex preceding the owner in the triangle's winding.
    pub prev: VertexId,
}

/// Arena-backed adjacency for a triangle mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborList {
    revision: u64,
    offsets: Vec<usize>,
    corners: Vec<Corner>,
    face_neighbors: Vec<[FaceId; 3]>,
    boundary: Vec<bool>,
    nonmanifold_edges: usize,
}

impl NeighborList {
    /// Build adjacency for `faces` over `num_vertices` vertices.
    ///
    /// Runs in O(V + F) apart from fan ordering, which is quadratic in the
    /// valence of each vertex. Face indices must already be validated.
    pub(crate) fn build(num_vertices: usize, faces: &[[usize; 3]], revision: u64) -> Self {
        let mut offsets = vec![0usize; num_vertices + 1];
        for face in faces {
            for &v in face {
                offsets[v + 1] += 1;
            }
        }
        for v in 0..num_vertices {
            offsets[v + 1] += offsets[v];
        }

        let mut cursor = offsets.clone();
        let placeholder = Corner {
            face: FaceId::invalid(),
            next: VertexId::invalid(),
            prev: VertexId::invalid(),
        };
        let mut corners = vec![placeholder; offsets[num_vertices]];
        for (fi, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let v = face[i];
                corners[cursor[v]] = Corner {
                    face: FaceId::new(fi),
                    next: VertexId::new(face[(i + 1) % 3]),
                    prev: VertexId::new(face[(i + 2) % 3]),
                };
                cursor[v] += 1;
            }
        }

        for v in 0..num_vertices {
            order_fan(&mut corners[offsets[v]..offsets[v + 1]]);
        }

        let mut list = Self {
            revision,
            offsets,
            corners,
            face_neighbors: vec![[FaceId::invalid(); 3]; faces.len()],
            boundary: vec![false; num_vertices],
            nonmanifold_edges: 0,
        };
        list.link_faces(faces);
        list
    }

    /// Fill face-across-edge links and boundary flags.
    fn link_faces(&mut self, faces: &[[usize; 3]]) {
        let mut nonmanifold = 0;
        for (fi, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let mut found = FaceId::invalid();
                let mut count = 0;
                for c in self.ring(VertexId::new(a)) {
                    if c.face.index() == fi {
                        continue;
                    }
                    if c.next.index() == b || c.prev.index() == b {
                        found = c.face;
                        count += 1;
                    }
                }
                match count {
                    0 => {
                        self.boundary[a] = true;
                        self.boundary[b] = true;
                    }
                    1 => self.face_neighbors[fi][i] = found,
                    // Each extra face sees the edge too; count it once per face.
                    _ => nonmanifold += 1,
                }
            }
        }
        self.nonmanifold_edges = nonmanifold;
    }

    /// Mesh revision this list was built for.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of vertices covered.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of corner records in the arena (`3 * F`).
    #[inline]
    pub fn num_records(&self) -> usize {
        self.corners.len()
    }

    /// The corner records around a vertex, in fan order.
    #[inline]
    pub fn ring(&self, v: VertexId) -> &[Corner] {
        let i = v.index();
        &self.corners[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Number of triangles incident to a vertex.
    #[inline]
    pub fn valence(&self, v: VertexId) -> usize {
        let i = v.index();
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Triangles incident to a vertex.
    pub fn faces_around(&self, v: VertexId) -> impl Iterator<Item = FaceId> + '_ {
        self.ring(v).iter().map(|c| c.face)
    }

    /// Distinct vertices sharing an edge with `v`, in fan order.
    pub fn one_ring(&self, v: VertexId) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = Vec::with_capacity(self.valence(v) + 1);
        for c in self.ring(v) {
            if !out.contains(&c.next) {
                out.push(c.next);
            }
            if !out.contains(&c.prev) {
                out.push(c.prev);
            }
        }
        out
    }

    /// The triangles across the edges `(f[0], f[1])`, `(f[1], f[2])` and
    /// `(f[2], f[0])` of triangle `f`. Invalid on open or non-manifold edges.
    #[inline]
    pub fn face_neighbors(&self, f: FaceId) -> [FaceId; 3] {
        self.face_neighbors[f.index()]
    }

    /// Per-face neighbor table, parallel to the face array.
    #[inline]
    pub fn face_neighbor_table(&self) -> &[[FaceId; 3]] {
        &self.face_neighbors
    }

    /// Whether a vertex lies on an open edge (or is isolated).
    #[inline]
    pub fn is_boundary(&self, v: VertexId) -> bool {
        self.boundary[v.index()] || self.valence(v) == 0
    }

    /// Number of (face, edge) pairs whose edge is shared by three or more faces.
    #[inline]
    pub fn nonmanifold_edges(&self) -> usize {
        self.nonmanifold_edges
    }
}

/// Reorder corners so that consecutive records share an edge.
///
/// Starts from a corner whose `prev` edge is open, so boundary fans are
/// walked from one end; closed fans start at the first record. A fan that
/// cannot be chained (a pinched vertex) keeps its remaining records in
/// their original order.
fn order_fan(fan: &mut [Corner]) {
    let n = fan.len();
    if n < 2 {
        return;
    }
    let start = (0..n)
        .find(|&i| !fan.iter().any(|c| c.next == fan[i].prev))
        .unwrap_or(0);
    fan.swap(0, start);
    for i in 1..n {
        let want = fan[i - 1].next;
        match (i..n).find(|&j| fan[j].prev == want) {
            Some(j) => fan.swap(i, j),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<[usize; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]
    }

    #[test]
    fn test_closed_fans_are_chained() {
        let faces = tetrahedron();
        let list = NeighborList::build(4, &faces, 0);
        assert_eq!(list.num_records(), 12);
        for v in 0..4 {
            let ring = list.ring(VertexId::new(v));
            assert_eq!(ring.len(), 3);
            for i in 0..ring.len() {
                let next = ring[(i + 1) % ring.len()];
                assert_eq!(ring[i].next, next.prev, "fan of vertex {} not chained", v);
            }
            assert!(!list.is_boundary(VertexId::new(v)));
        }
        assert_eq!(list.nonmanifold_edges(), 0);
    }

    #[test]
    fn test_face_neighbors_are_symmetric() {
        let faces = tetrahedron();
        let list = NeighborList::build(4, &faces, 0);
        for f in 0..faces.len() {
            for g in list.face_neighbors(FaceId::new(f)) {
                assert!(g.is_valid());
                assert!(list.face_neighbors(g).contains(&FaceId::new(f)));
            }
        }
    }

    #[test]
    fn test_open_strip_boundary() {
        let faces = vec![[0, 1, 2], [1, 3, 2]];
        let list = NeighborList::build(4, &faces, 0);
        assert!(list.is_boundary(VertexId::new(0)));
        assert_eq!(list.face_neighbors(FaceId::new(0))[1], FaceId::new(1));
        assert!(!list.face_neighbors(FaceId::new(0))[0].is_valid());
        assert_eq!(list.one_ring(VertexId::new(1)).len(), 3);
    }

    #[test]
    fn test_nonmanifold_edge_detected() {
        // Three triangles hinged on edge (0, 1).
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let list = NeighborList::build(5, &faces, 0);
        assert!(list.nonmanifold_edges() > 0);
    }
}
