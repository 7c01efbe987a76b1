//! Uniform refinement.
//!
//! Every triangle `[a, b, c]` is split into four at its edge midpoints:
//!
//! ```text
//!         c
//!        / \
//!      ca---bc
//!      / \ / \
//!     a---ab---b
//! ```
//!
//! The children keep the parent's winding and face marker. Midpoint
//! vertices are numbered after the original vertices, in the order their
//! edges are first met while scanning faces.

use std::collections::HashMap;

use nalgebra::Point3;
use tracing::info;

use crate::error::Result;
use crate::mesh::{SurfaceMesh, MARKER_SENTINEL};

/// Split every triangle 1 → 4. A certified mesh stays certified.
pub fn refine(mesh: &mut SurfaceMesh) -> Result<()> {
    let stage = mesh.stage();
    let before = mesh.num_faces();
    subdivide(mesh);
    mesh.recertify(stage)?;
    info!(faces_before = before, faces_after = mesh.num_faces(), "Refined mesh.");
    Ok(())
}

/// The split itself, without adjacency upkeep.
pub(crate) fn subdivide(mesh: &mut SurfaceMesh) {
    if mesh.is_empty() {
        return;
    }
    let mut vertices = mesh.vertices().to_vec();
    let mut vertex_markers = mesh.vertex_markers().map(<[i32]>::to_vec);
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();

    let mut midpoint = |a: usize, b: usize| -> usize {
        let key = (a.min(b), a.max(b));
        *midpoints.entry(key).or_insert_with(|| {
            let p = Point3::from((vertices[a].coords + vertices[b].coords) * 0.5);
            vertices.push(p);
            if let Some(m) = &mut vertex_markers {
                // A midpoint inherits a marker both ends agree on.
                let marker = if m[a] == m[b] { m[a] } else { MARKER_SENTINEL };
                m.push(marker);
            }
            vertices.len() - 1
        })
    };

    let mut faces = Vec::with_capacity(mesh.num_faces() * 4);
    for &[a, b, c] in mesh.faces() {
        let ab = midpoint(a, b);
        let bc = midpoint(b, c);
        let ca = midpoint(c, a);
        faces.push([a, ab, ca]);
        faces.push([ab, b, bc]);
        faces.push([ca, bc, c]);
        faces.push([ab, bc, ca]);
    }

    let face_markers = mesh
        .face_markers()
        .map(|m| m.iter().flat_map(|&x| [x; 4]).collect::<Vec<_>>());

    mesh.replace(vertices, faces);
    mesh.set_vertex_markers(vertex_markers);
    mesh.set_face_markers(face_markers);
}
