//! Surface topology management.
//!
//! Operations that reason about connectivity rather than geometry:
//!
//! - [`remove_islands`]: drop small disconnected shells
//! - [`correct_normals`]: make winding consistent and outward per component
//! - [`merge`]: concatenate two meshes
//! - [`weld_vertices`]: merge coincident vertices
//! - [`assign_active_sites`]: tag vertices by seeded region growing
//!
//! Neighbor-list construction and markers live on
//! [`SurfaceMesh`](crate::mesh::SurfaceMesh) itself.

mod islands;
mod merge;
mod orient;
mod sites;

pub use islands::{components, remove_islands, IslandReport};
pub use merge::{merge, weld_vertices};
pub use orient::{correct_normals, OrientReport};
pub use sites::{assign_active_sites, partition_sites, DistanceHeap, HeapEntry};

use crate::mesh::{SurfaceMesh, MARKER_SENTINEL};

/// Keep the faces flagged in `keep`, drop vertices no kept face uses and
/// reindex. Markers follow their elements.
pub(crate) fn retain_faces(mesh: &mut SurfaceMesh, keep: &[bool]) {
    debug_assert_eq!(keep.len(), mesh.num_faces());
    let mut used = vec![false; mesh.num_vertices()];
    for (face, &k) in mesh.faces().iter().zip(keep) {
        if k {
            for &v in face {
                used[v] = true;
            }
        }
    }
    // Surviving vertices keep their relative order.
    let mut remap = vec![usize::MAX; mesh.num_vertices()];
    let mut vertices = Vec::new();
    for (v, &u) in used.iter().enumerate() {
        if u {
            remap[v] = vertices.len();
            vertices.push(mesh.vertices()[v]);
        }
    }
    let mut faces = Vec::new();
    let mut kept_faces = Vec::new();
    for (fi, face) in mesh.faces().iter().enumerate() {
        if keep[fi] {
            faces.push(face.map(|v| remap[v]));
            kept_faces.push(fi);
        }
    }

    let vertex_markers = mesh.vertex_markers().map(|old| {
        let mut m = vec![MARKER_SENTINEL; vertices.len()];
        for (v, &r) in remap.iter().enumerate() {
            if r != usize::MAX {
                m[r] = old[v];
            }
        }
        m
    });
    let face_markers = mesh
        .face_markers()
        .map(|old| kept_faces.iter().map(|&f| old[f]).collect::<Vec<_>>());

    mesh.replace(vertices, faces);
    mesh.set_vertex_markers(vertex_markers);
    mesh.set_face_markers(face_markers);
}
