//! Concatenating meshes and welding coincident vertices.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{MeshError, Result};
use crate::mesh::{SurfaceMesh, MARKER_SENTINEL};

/// Concatenate two meshes. Indices of `b` are offset by `a`'s vertex
/// count; coincident vertices are not merged.
///
/// Markers are concatenated when either side has them, with the sentinel
/// standing in for the side that does not. The result has no neighbor list.
pub fn merge(a: &SurfaceMesh, b: &SurfaceMesh) -> SurfaceMesh {
    let offset = a.num_vertices();
    let mut vertices = Vec::with_capacity(a.num_vertices() + b.num_vertices());
    vertices.extend_from_slice(a.vertices());
    vertices.extend_from_slice(b.vertices());
    let mut faces = Vec::with_capacity(a.num_faces() + b.num_faces());
    faces.extend_from_slice(a.faces());
    faces.extend(b.faces().iter().map(|f| f.map(|v| v + offset)));

    let concat = |x: Option<&[i32]>, nx: usize, y: Option<&[i32]>, ny: usize| {
        if x.is_none() && y.is_none() {
            return None;
        }
        let mut out = Vec::with_capacity(nx + ny);
        match x {
            Some(m) => out.extend_from_slice(m),
            None => out.resize(nx, MARKER_SENTINEL),
        }
        match y {
            Some(m) => out.extend_from_slice(m),
            None => out.resize(nx + ny, MARKER_SENTINEL),
        }
        Some(out)
    };
    let vertex_markers = concat(
        a.vertex_markers(),
        a.num_vertices(),
        b.vertex_markers(),
        b.num_vertices(),
    );
    let face_markers = concat(a.face_markers(), a.num_faces(), b.face_markers(), b.num_faces());

    let mut mesh = SurfaceMesh::new();
    mesh.replace(vertices, faces);
    mesh.set_vertex_markers(vertex_markers);
    mesh.set_face_markers(face_markers);
    mesh
}

/// Merge vertices closer than `tolerance` and drop the faces that
/// collapse. Returns the number of vertices removed.
///
/// Each vertex is matched against earlier representatives in its own and
/// the 26 surrounding cells of a `tolerance`-sized hash grid. The first
/// vertex of a cluster keeps its position and marker.
pub fn weld_vertices(mesh: &mut SurfaceMesh, tolerance: f64) -> Result<usize> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(MeshError::invalid_param(
            "tolerance",
            tolerance,
            "must be positive",
        ));
    }
    let cell = |c: f64| (c / tolerance).floor() as i64;
    let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
    let mut remap = vec![0usize; mesh.num_vertices()];
    let mut representatives: Vec<usize> = Vec::new();

    for (v, p) in mesh.vertices().iter().enumerate() {
        let key = (cell(p.x), cell(p.y), cell(p.z));
        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = grid.get(&(key.0 + dx, key.1 + dy, key.2 + dz)) else {
                        continue;
                    };
                    for &r in bucket {
                        if (mesh.vertices()[representatives[r]] - p).norm() <= tolerance {
                            found = Some(r);
                            break 'search;
                        }
                    }
                }
            }
        }
        remap[v] = match found {
            Some(r) => r,
            None => {
                representatives.push(v);
                grid.entry(key).or_default().push(representatives.len() - 1);
                representatives.len() - 1
            }
        };
    }

    let removed = mesh.num_vertices() - representatives.len();
    if removed == 0 {
        return Ok(0);
    }

    let vertices = representatives.iter().map(|&v| mesh.vertices()[v]).collect();
    let mut faces = Vec::with_capacity(mesh.num_faces());
    let mut kept = Vec::with_capacity(mesh.num_faces());
    for (fi, f) in mesh.faces().iter().enumerate() {
        let g = f.map(|v| remap[v]);
        if g[0] != g[1] && g[1] != g[2] && g[0] != g[2] {
            faces.push(g);
            kept.push(fi);
        }
    }
    let vertex_markers = mesh
        .vertex_markers()
        .map(|m| representatives.iter().map(|&v| m[v]).collect::<Vec<_>>());
    let face_markers = mesh
        .face_markers()
        .map(|m| kept.iter().map(|&f| m[f]).collect::<Vec<_>>());

    debug!(
        removed,
        collapsed_faces = mesh.num_faces() - faces.len(),
        "Welded vertices."
    );
    mesh.replace(vertices, faces);
    mesh.set_vertex_markers(vertex_markers);
    mesh.set_face_markers(face_markers);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_merge_offsets_indices() {
        let a = SurfaceMesh::sphere(0);
        let mut b = SurfaceMesh::sphere(0);
        b.translate(Vector3::new(3.0, 0.0, 0.0));
        let mesh = merge(&a, &b);
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 16);
        assert_eq!(mesh.faces()[8], b.faces()[0].map(|v| v + 6));
        assert!(!mesh.has_neighbors());
    }

    #[test]
    fn test_merge_markers_fill_sentinel() {
        let mut a = SurfaceMesh::sphere(0);
        a.create_vertex_markers();
        a.vertex_markers_mut().unwrap().fill(2);
        let b = SurfaceMesh::sphere(0);
        let mesh = merge(&a, &b);
        let m = mesh.vertex_markers().unwrap();
        assert_eq!(m.len(), 12);
        assert!(m[..6].iter().all(|&x| x == 2));
        assert!(m[6..].iter().all(|&x| x == MARKER_SENTINEL));
        assert!(mesh.face_markers().is_none());
    }

    #[test]
    fn test_weld_triangle_soup() {
        // Two triangles sharing an edge, stored with duplicated corners.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 1e-9),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [3, 4, 5]];
        let mut mesh = SurfaceMesh::from_parts(vertices, faces).unwrap();
        let removed = weld_vertices(&mut mesh, 1e-6).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.faces(), &[[0, 1, 2], [1, 3, 2]]);
    }

    #[test]
    fn test_weld_rejects_bad_tolerance() {
        let mut mesh = SurfaceMesh::sphere(0);
        assert!(weld_vertices(&mut mesh, 0.0).is_err());
        assert_eq!(weld_vertices(&mut mesh, 1e-6).unwrap(), 0);
    }
}
