//! Isosurface extraction.
//!
//! Every lattice cube is split into the six Kuhn tetrahedra that share its
//! `(0,0,0)-(1,1,1)` diagonal, and each tetrahedron is triangulated from a
//! 16-case table. All cubes split their faces along the same diagonal, so
//! adjacent cubes agree on every shared face and the result is watertight.
//! This is also the rule that resolves the ambiguous marching-cubes
//! configurations: two inside corners are connected exactly when they
//! share a tetrahedron edge, i.e. when the diagonal joining them runs from
//! the low to the high corner of a face or cube.
//!
//! A sample is inside when its value is strictly greater than the
//! isovalue. Triangles are wound so their normals point from high to low
//! density. Crossing points are shared per lattice edge.
//!
//! # Example
//!
//! ```
//! use biomesh::algo::marching::{marching_cubes, SecondaryField};
//! use biomesh::volume::DensityGrid;
//! use nalgebra::{Point3, Vector3};
//!
//! let grid = DensityGrid::from_fn([9, 9, 9], Point3::new(-4.0, -4.0, -4.0), Vector3::repeat(1.0), |p| {
//!     (9.5 - p.coords.norm_squared()) as f32
//! })
//! .unwrap();
//! let surface = marching_cubes(&grid, 0.0, SecondaryField::None).unwrap();
//! assert!(surface.mesh.num_faces() > 0);
//! assert_eq!(surface.mesh.euler_characteristic(), 2);
//! ```

use std::collections::HashMap;

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{MeshError, Result};
use crate::mesh::SurfaceMesh;
use crate::volume::DensityGrid;

/// Kuhn tetrahedra of a unit cube. Corner `c` sits at `(c & 1, c >> 1 & 1, c >> 2 & 1)`.
const KUHN_TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Interpolation parameters are kept away from the lattice points so no
/// crossing coincides with a sample.
const T_CLAMP: f64 = 1e-4;

/// A second field restricting where triangles are emitted.
#[derive(Debug, Clone, Copy, Default)]
pub enum SecondaryField<'a> {
    /// Emit triangles everywhere.
    #[default]
    None,
    /// Emit triangles only in cubes where `field` exceeds `isovalue` at
    /// one or more corners.
    Present {
        field: &'a DensityGrid,
        isovalue: f32,
    },
}

/// Output of [`marching_cubes`].
#[derive(Debug, Clone, Default)]
pub struct Isosurface {
    /// The extracted surface, in world coordinates.
    pub mesh: SurfaceMesh,
    /// Crossing points in emission order.
    pub samples: Vec<Point3<f64>>,
}

/// Vertices keyed by lattice edge, plus triangles over local indices.
#[derive(Default)]
struct SlabOutput {
    keys: Vec<(usize, usize)>,
    points: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
}

impl SlabOutput {
    fn vertex(
        &mut self,
        lookup: &mut HashMap<(usize, usize), usize>,
        key: (usize, usize),
        point: impl FnOnce() -> Point3<f64>,
    ) -> usize {
        *lookup.entry(key).or_insert_with(|| {
            self.keys.push(key);
            self.points.push(point());
            self.points.len() - 1
        })
    }
}

/// Extract the `isovalue` level set of `grid`.
///
/// Returns an empty mesh when the field never crosses the isovalue.
/// Fails with [`MeshError::InvalidInput`] for a non-finite isovalue or a
/// secondary field whose dimensions differ from `grid`.
pub fn marching_cubes(
    grid: &DensityGrid,
    isovalue: f32,
    secondary: SecondaryField<'_>,
) -> Result<Isosurface> {
    if !isovalue.is_finite() {
        return Err(MeshError::invalid_input(format!(
            "isovalue must be finite, got {}",
            isovalue
        )));
    }
    if let SecondaryField::Present { field, isovalue } = secondary {
        if field.dims() != grid.dims() {
            return Err(MeshError::invalid_input(format!(
                "secondary field dimensions {:?} differ from {:?}",
                field.dims(),
                grid.dims()
            )));
        }
        if !isovalue.is_finite() {
            return Err(MeshError::invalid_input("secondary isovalue must be finite"));
        }
    }

    let [nx, ny, nz] = grid.dims();
    if nx < 2 || ny < 2 || nz < 2 {
        debug!(dims = ?grid.dims(), "Grid has no cubes.");
        return Ok(Isosurface::default());
    }

    let slabs: Vec<SlabOutput> = (0..nz - 1)
        .into_par_iter()
        .map(|k| extract_slab(grid, isovalue as f64, secondary, k))
        .collect();

    // Merge in slab order; edges on a shared plane appear in both slabs.
    let mut global: HashMap<(usize, usize), usize> = HashMap::new();
    let mut points = Vec::new();
    let mut faces = Vec::new();
    for slab in slabs {
        let remap: Vec<usize> = slab
            .keys
            .iter()
            .zip(&slab.points)
            .map(|(key, p)| {
                *global.entry(*key).or_insert_with(|| {
                    points.push(grid.to_world(p));
                    points.len() - 1
                })
            })
            .collect();
        faces.extend(
            slab.triangles
                .iter()
                .map(|t| [remap[t[0]], remap[t[1]], remap[t[2]]]),
        );
    }

    info!(
        vertices = points.len(),
        faces = faces.len(),
        isovalue,
        "Extracted isosurface."
    );
    let samples = points.clone();
    let mesh = SurfaceMesh::from_parts(points, faces)?;
    Ok(Isosurface { mesh, samples })
}

fn extract_slab(
    grid: &DensityGrid,
    iso: f64,
    secondary: SecondaryField<'_>,
    k: usize,
) -> SlabOutput {
    let [nx, ny, _] = grid.dims();
    let data = grid.data();
    let mut out = SlabOutput::default();
    let mut lookup = HashMap::new();

    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let mut ids = [0usize; 8];
            let mut pos = [Point3::origin(); 8];
            for c in 0..8 {
                let (di, dj, dk) = (c & 1, (c >> 1) & 1, (c >> 2) & 1);
                ids[c] = grid.index(i + di, j + dj, k + dk);
                pos[c] = Point3::new((i + di) as f64, (j + dj) as f64, (k + dk) as f64);
            }

            if let SecondaryField::Present { field, isovalue } = secondary {
                let fd = field.data();
                if !ids.iter().any(|&id| fd[id] > isovalue) {
                    continue;
                }
            }

            let values = ids.map(|id| data[id] as f64);
            let inside = values.map(|v| v > iso);
            if inside.iter().all(|&b| b) || inside.iter().all(|&b| !b) {
                continue;
            }

            for tet in &KUHN_TETS {
                polygonize_tet(tet, &ids, &pos, &values, &inside, iso, &mut out, &mut lookup);
            }
        }
    }
    out
}

/// Emit the triangles of one tetrahedron.
#[allow(clippy::too_many_arguments)]
fn polygonize_tet(
    tet: &[usize; 4],
    ids: &[usize; 8],
    pos: &[Point3<f64>; 8],
    values: &[f64; 8],
    inside: &[bool; 8],
    iso: f64,
    out: &mut SlabOutput,
    lookup: &mut HashMap<(usize, usize), usize>,
) {
    let (ins, outs): (Vec<usize>, Vec<usize>) = tet.iter().partition(|&&c| inside[c]);
    if ins.is_empty() || outs.is_empty() {
        return;
    }

    let mut cross = |a: usize, b: usize| -> usize {
        let key = (ids[a].min(ids[b]), ids[a].max(ids[b]));
        out.vertex(lookup, key, || {
            let t = ((iso - values[a]) / (values[b] - values[a])).clamp(T_CLAMP, 1.0 - T_CLAMP);
            pos[a] + (pos[b] - pos[a]) * t
        })
    };

    let mut tris: Vec<[usize; 3]> = Vec::with_capacity(2);
    match (ins.len(), outs.len()) {
        (1, 3) => {
            let a = ins[0];
            tris.push([cross(a, outs[0]), cross(a, outs[1]), cross(a, outs[2])]);
        }
        (3, 1) => {
            let a = outs[0];
            tris.push([cross(ins[0], a), cross(ins[1], a), cross(ins[2], a)]);
        }
        _ => {
            // Quad (ac, ad, bd, bc), split along ac-bd.
            let (a, b) = (ins[0], ins[1]);
            let (c, d) = (outs[0], outs[1]);
            let ac = cross(a, c);
            let ad = cross(a, d);
            let bd = cross(b, d);
            let bc = cross(b, c);
            tris.push([ac, ad, bd]);
            tris.push([ac, bd, bc]);
        }
    }

    // Outward is from the inside corners toward the outside corners.
    let centroid = |cs: &[usize]| {
        cs.iter().fold(nalgebra::Vector3::zeros(), |acc, &c| acc + pos[c].coords) / cs.len() as f64
    };
    let outward = centroid(&outs) - centroid(&ins);
    for mut tri in tris {
        let [p0, p1, p2] = tri.map(|v| out.points[v]);
        if (p1 - p0).cross(&(p2 - p0)).dot(&outward) < 0.0 {
            tri.swap(1, 2);
        }
        out.triangles.push(tri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn ball(n: usize, radius: f64) -> DensityGrid {
        let half = (n - 1) as f64 / 2.0;
        DensityGrid::from_fn(
            [n, n, n],
            Point3::new(-half, -half, -half),
            Vector3::repeat(1.0),
            |p| (radius * radius - p.coords.norm_squared()) as f32,
        )
        .unwrap()
    }

    fn is_closed(mesh: &SurfaceMesh) -> bool {
        let mut count: HashMap<(usize, usize), usize> = HashMap::new();
        for f in mesh.faces() {
            for i in 0..3 {
                let (a, b) = (f[i], f[(i + 1) % 3]);
                *count.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        count.values().all(|&c| c == 2)
    }

    #[test]
    fn test_no_crossing_yields_empty_mesh() {
        let grid = DensityGrid::from_fn([5, 5, 5], Point3::origin(), Vector3::repeat(1.0), |_| 1.0)
            .unwrap();
        let surface = marching_cubes(&grid, 2.5, SecondaryField::None).unwrap();
        assert_eq!(surface.mesh.num_faces(), 0);
        assert!(surface.samples.is_empty());
    }

    #[test]
    fn test_ball_is_closed_sphere() {
        let surface = marching_cubes(&ball(11, 3.3), 0.0, SecondaryField::None).unwrap();
        let mesh = &surface.mesh;
        assert!(is_closed(mesh));
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(mesh.signed_volume() > 0.0);
        let expected = 4.0 / 3.0 * std::f64::consts::PI * 3.3f64.powi(3);
        assert!((mesh.signed_volume() - expected).abs() / expected < 0.15);
        assert_eq!(surface.samples.len(), mesh.num_vertices());
    }

    #[test]
    fn test_isovalue_equal_sample_is_outside() {
        // The centre sample equals the isovalue and must not produce a surface.
        let grid = DensityGrid::from_fn([3, 3, 3], Point3::origin(), Vector3::repeat(1.0), |p| {
            if p == Point3::new(1.0, 1.0, 1.0) {
                2.5
            } else {
                0.0
            }
        })
        .unwrap();
        let surface = marching_cubes(&grid, 2.5, SecondaryField::None).unwrap();
        assert_eq!(surface.mesh.num_faces(), 0);
    }

    #[test]
    fn test_secondary_field_restricts_output() {
        let grid = ball(11, 3.3);
        let mask = DensityGrid::from_fn(
            grid.dims(),
            grid.origin(),
            grid.spacing(),
            |p| if p.x > 0.0 { 1.0 } else { 0.0 },
        )
        .unwrap();
        let full = marching_cubes(&grid, 0.0, SecondaryField::None).unwrap();
        let half = marching_cubes(
            &grid,
            0.0,
            SecondaryField::Present {
                field: &mask,
                isovalue: 0.5,
            },
        )
        .unwrap();
        assert!(half.mesh.num_faces() > 0);
        assert!(half.mesh.num_faces() < full.mesh.num_faces());
        // Only cubes touching x > 0 survive.
        assert!(half.mesh.vertices().iter().all(|p| p.x > -1.0));
    }

    #[test]
    fn test_secondary_dims_mismatch() {
        let grid = ball(7, 2.0);
        let other = ball(5, 2.0);
        let result = marching_cubes(
            &grid,
            0.0,
            SecondaryField::Present {
                field: &other,
                isovalue: 0.0,
            },
        );
        assert!(matches!(result, Err(MeshError::InvalidInput(_))));
    }

    /// Two inside samples on opposite corners of a cube face.
    fn face_diagonal(a: [usize; 3], b: [usize; 3]) -> DensityGrid {
        DensityGrid::from_fn([4, 4, 4], Point3::origin(), Vector3::repeat(1.0), move |p| {
            let at = |c: [usize; 3]| p == Point3::new(c[0] as f64, c[1] as f64, c[2] as f64);
            if at(a) || at(b) {
                10.0
            } else {
                0.0
            }
        })
        .unwrap()
    }

    #[test]
    fn test_ambiguous_face_resolved_by_kuhn_diagonal() {
        // Along the low-to-high face diagonal the corners are joined.
        let joined = marching_cubes(&face_diagonal([1, 1, 1], [2, 2, 1]), 5.0, SecondaryField::None)
            .unwrap();
        assert!(is_closed(&joined.mesh));
        assert_eq!(joined.mesh.euler_characteristic(), 2);

        // Along the other diagonal they are separated: two spheres.
        let split = marching_cubes(&face_diagonal([2, 1, 1], [1, 2, 1]), 5.0, SecondaryField::None)
            .unwrap();
        assert!(is_closed(&split.mesh));
        assert_eq!(split.mesh.euler_characteristic(), 4);

        // Same rule, same result every time.
        let again = marching_cubes(&face_diagonal([2, 1, 1], [1, 2, 1]), 5.0, SecondaryField::None)
            .unwrap();
        assert_eq!(split.mesh.vertices(), again.mesh.vertices());
        assert_eq!(split.mesh.faces(), again.mesh.faces());
    }

    #[test]
    fn test_ambiguous_body_diagonal() {
        let joined = marching_cubes(&face_diagonal([1, 1, 1], [2, 2, 2]), 5.0, SecondaryField::None)
            .unwrap();
        assert!(is_closed(&joined.mesh));
        assert_eq!(joined.mesh.euler_characteristic(), 2);

        let split = marching_cubes(&face_diagonal([2, 1, 1], [1, 2, 2]), 5.0, SecondaryField::None)
            .unwrap();
        assert_eq!(split.mesh.euler_characteristic(), 4);
    }
}
