//! Surface smoothing.
//!
//! Two relaxations that move vertices without touching topology:
//!
//! - [`smooth`]: Laplacian relaxation toward the one-ring centroid
//! - [`normal_smooth`]: face-normal filtering followed by a vertex update
//!   that fits the filtered normals
//!
//! Both sweep vertices sequentially and guard every move: the step is
//! halved until no incident triangle flips or shrinks below a fraction of
//! its previous area, and dropped if no halving succeeds. Smoothing
//! therefore never produces a degenerate or inverted triangle from a valid
//! one.
//!
//! # Example
//!
//! ```
//! use biomesh::mesh::SurfaceMesh;
//! use biomesh::algo::smooth::{smooth, SmoothOptions};
//!
//! let mut mesh = SurfaceMesh::sphere(2);
//! mesh.scale(2.0, 1.0, 1.0);
//! mesh.certify().unwrap();
//!
//! let report = smooth(&mut mesh, &SmoothOptions::default().with_iterations(5)).unwrap();
//! assert!(report.passes <= 5);
//! ```

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::algo::quality::angle_stats;
use crate::config::SmoothConfig;
use crate::error::{MeshError, Result};
use crate::mesh::{Corner, NeighborList, SurfaceMesh, VertexId, MARKER_SENTINEL};

/// Number of times a rejected step is halved before it is dropped.
const MAX_HALVINGS: usize = 4;

/// Options for smoothing.
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Maximum number of passes over all vertices.
    pub iterations: usize,

    /// Fraction of the way toward the target each vertex moves (0.0 to 1.0).
    pub lambda: f64,

    /// Keep boundary vertices and vertices carrying a marker fixed.
    pub hold_marked: bool,

    /// Stop before a pass once every angle lies within `(min, max)` degrees.
    pub angle_gate: Option<(f64, f64)>,

    /// A move is rejected if an incident triangle would keep less than this
    /// fraction of its area.
    pub min_area_ratio: f64,

    /// Normal-similarity threshold (cosine) below which neighboring faces
    /// do not influence a filtered normal. Used by [`normal_smooth`].
    pub normal_threshold: f64,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            lambda: 0.5,
            hold_marked: true,
            angle_gate: None,
            min_area_ratio: 0.1,
            normal_threshold: 0.5,
        }
    }
}

impl SmoothOptions {
    /// Options matching a pipeline configuration, gate enabled.
    pub fn from_config(config: &SmoothConfig) -> Self {
        Self {
            iterations: config.iterations,
            lambda: config.lambda.clamp(0.0, 1.0),
            hold_marked: config.hold_marked,
            angle_gate: Some((config.min_angle, config.max_angle)),
            ..Self::default()
        }
    }

    /// Set the number of passes.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the step factor.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda.clamp(0.0, 1.0);
        self
    }

    /// Let boundary and marked vertices move.
    pub fn allow_marked_movement(mut self) -> Self {
        self.hold_marked = false;
        self
    }

    /// Stop early once all angles lie within the given bounds.
    pub fn with_angle_gate(mut self, min_angle: f64, max_angle: f64) -> Self {
        self.angle_gate = Some((min_angle, max_angle));
        self
    }

    /// Set the normal-similarity threshold used by [`normal_smooth`].
    pub fn with_normal_threshold(mut self, threshold: f64) -> Self {
        self.normal_threshold = threshold.clamp(-1.0, 1.0);
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(MeshError::invalid_param("lambda", self.lambda, "must lie in [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.min_area_ratio) {
            return Err(MeshError::invalid_param(
                "min_area_ratio",
                self.min_area_ratio,
                "must lie in [0, 1)",
            ));
        }
        if let Some((lo, hi)) = self.angle_gate {
            if lo >= hi {
                return Err(MeshError::invalid_param("angle_gate", lo, "min must be below max"));
            }
        }
        Ok(())
    }
}

/// Outcome of a smoothing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SmoothReport {
    /// Passes actually run.
    pub passes: usize,
    /// Accepted vertex moves, summed over passes.
    pub moved: usize,
    /// Whether the angle gate stopped the run.
    pub gate_reached: bool,
}

/// Laplacian smoothing with bounded steps.
///
/// Each pass moves every free vertex `lambda` of the way toward the
/// centroid of its one-ring, subject to the flip/area guard. Requires an
/// up-to-date neighbor list; vertex and face counts never change.
pub fn smooth(mesh: &mut SurfaceMesh, options: &SmoothOptions) -> Result<SmoothReport> {
    options.validate()?;
    let fixed = fixed_vertices(mesh, options.hold_marked)?;
    let neighbors = mesh.take_neighbors()?;
    let report = laplacian_passes(mesh, &neighbors, &fixed, options);
    mesh.restore_neighbors(neighbors);

    info!(
        passes = report.passes,
        moved = report.moved,
        gate_reached = report.gate_reached,
        "Smoothed surface."
    );
    Ok(report)
}

fn laplacian_passes(
    mesh: &mut SurfaceMesh,
    neighbors: &NeighborList,
    fixed: &[bool],
    options: &SmoothOptions,
) -> SmoothReport {
    let mut report = SmoothReport::default();
    for pass in 0..options.iterations {
        if gate_reached(mesh, options) {
            report.gate_reached = true;
            break;
        }
        let mut moved = 0;
        for v in 0..mesh.num_vertices() {
            if fixed[v] {
                continue;
            }
            let ring = neighbors.one_ring(VertexId::new(v));
            if ring.is_empty() {
                continue;
            }
            let centroid = ring
                .iter()
                .fold(Vector3::zeros(), |acc, u| acc + mesh.position(u.index()).coords)
                / ring.len() as f64;
            let p = *mesh.position(v);
            let step = (centroid - p.coords) * options.lambda;
            if let Some(q) = bounded_move(mesh, neighbors, v, step, options.min_area_ratio) {
                mesh.set_position(v, q);
                moved += 1;
            }
        }
        report.passes = pass + 1;
        report.moved += moved;
        debug!(pass, moved, "Smoothing pass.");
        if moved == 0 {
            break;
        }
    }
    if !report.gate_reached && report.passes == options.iterations {
        report.gate_reached = options.angle_gate.is_some() && gate_reached(mesh, options);
    }
    report
}

/// Normal-based smoothing.
///
/// Each pass first filters face normals, weighting each face sharing a
/// vertex with `f` by `max(0, n_f · n_g - threshold)²`, then moves every
/// free vertex toward the planes through the centroids of its incident
/// faces with the filtered normals. Moves use the same guard as [`smooth`].
pub fn normal_smooth(mesh: &mut SurfaceMesh, options: &SmoothOptions) -> Result<SmoothReport> {
    options.validate()?;
    let fixed = fixed_vertices(mesh, options.hold_marked)?;
    let neighbors = mesh.take_neighbors()?;
    let report = normal_passes(mesh, &neighbors, &fixed, options);
    mesh.restore_neighbors(neighbors);

    info!(
        passes = report.passes,
        moved = report.moved,
        "Normal-smoothed surface."
    );
    Ok(report)
}

fn normal_passes(
    mesh: &mut SurfaceMesh,
    neighbors: &NeighborList,
    fixed: &[bool],
    options: &SmoothOptions,
) -> SmoothReport {
    let mut report = SmoothReport::default();
    for pass in 0..options.iterations {
        if gate_reached(mesh, options) {
            report.gate_reached = true;
            break;
        }
        let filtered = filtered_normals(mesh, neighbors, options.normal_threshold);
        let centroids: Vec<Point3<f64>> = (0..mesh.num_faces()).map(|f| mesh.face_centroid(f)).collect();

        let mut moved = 0;
        for v in 0..mesh.num_vertices() {
            if fixed[v] {
                continue;
            }
            let ring = neighbors.ring(VertexId::new(v));
            if ring.is_empty() {
                continue;
            }
            let p = *mesh.position(v);
            let mut delta = Vector3::zeros();
            for c in ring {
                let f = c.face.index();
                let n = filtered[f];
                delta += n * n.dot(&(centroids[f] - p));
            }
            let step = delta / ring.len() as f64 * options.lambda;
            if let Some(q) = bounded_move(mesh, neighbors, v, step, options.min_area_ratio) {
                mesh.set_position(v, q);
                moved += 1;
            }
        }
        report.passes = pass + 1;
        report.moved += moved;
        debug!(pass, moved, "Normal smoothing pass.");
        if moved == 0 {
            break;
        }
    }
    report
}

/// Vertices that must not move.
fn fixed_vertices(mesh: &SurfaceMesh, hold_marked: bool) -> Result<Vec<bool>> {
    let neighbors = mesh.neighbors()?;
    if !hold_marked {
        return Ok(vec![false; mesh.num_vertices()]);
    }
    let markers = mesh.vertex_markers();
    Ok((0..mesh.num_vertices())
        .map(|v| {
            neighbors.is_boundary(VertexId::new(v))
                || markers.is_some_and(|m| m[v] != MARKER_SENTINEL)
        })
        .collect())
}

fn gate_reached(mesh: &SurfaceMesh, options: &SmoothOptions) -> bool {
    match options.angle_gate {
        Some((lo, hi)) => angle_stats(mesh, lo, hi).within_bounds(),
        None => false,
    }
}

/// Try `p + step`, halving the step until every incident triangle keeps
/// its orientation and enough of its area.
fn bounded_move(
    mesh: &SurfaceMesh,
    neighbors: &NeighborList,
    v: usize,
    step: Vector3<f64>,
    min_area_ratio: f64,
) -> Option<Point3<f64>> {
    if !step.iter().all(|c| c.is_finite()) || step.norm_squared() == 0.0 {
        return None;
    }
    let p = *mesh.position(v);
    let ring = neighbors.ring(VertexId::new(v));
    let mut step = step;
    for _ in 0..=MAX_HALVINGS {
        let q = p + step;
        if ring.iter().all(|c| keeps_shape(mesh, c, &p, &q, min_area_ratio)) {
            return Some(q);
        }
        step *= 0.5;
    }
    None
}

/// Whether moving the owner of `corner` from `p` to `q` keeps its triangle
/// facing the same way with at least `ratio` of its area.
fn keeps_shape(
    mesh: &SurfaceMesh,
    corner: &Corner,
    p: &Point3<f64>,
    q: &Point3<f64>,
    ratio: f64,
) -> bool {
    let a = mesh.position(corner.next.index());
    let b = mesh.position(corner.prev.index());
    let before = (a - p).cross(&(b - p));
    let after = (a - q).cross(&(b - q));
    after.dot(&before) > 0.0 && after.norm() >= ratio * before.norm()
}

/// Bilateral-style filtered face normals.
fn filtered_normals(mesh: &SurfaceMesh, neighbors: &NeighborList, threshold: f64) -> Vec<Vector3<f64>> {
    let normals: Vec<Vector3<f64>> = (0..mesh.num_faces()).map(|f| mesh.face_normal(f)).collect();
    let mut seen: Vec<usize> = Vec::new();
    (0..mesh.num_faces())
        .map(|f| {
            let nf = normals[f];
            seen.clear();
            let mut sum = Vector3::zeros();
            for &v in &mesh.faces()[f] {
                for c in neighbors.ring(VertexId::new(v)) {
                    let g = c.face.index();
                    if seen.contains(&g) {
                        continue;
                    }
                    seen.push(g);
                    let w = (nf.dot(&normals[g]) - threshold).max(0.0);
                    sum += normals[g] * (w * w);
                }
            }
            sum.try_normalize(f64::EPSILON).unwrap_or(nf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::quality::min_face_area;

    fn noisy_sphere() -> SurfaceMesh {
        let mut mesh = SurfaceMesh::sphere(3);
        for (i, p) in mesh.positions_mut().iter_mut().enumerate() {
            let bump = 1.0 + 0.05 * ((i * 7919 % 13) as f64 / 13.0 - 0.5);
            *p = Point3::from(p.coords * bump);
        }
        mesh.certify().unwrap();
        mesh
    }

    /// Standard deviation of the vertex radii.
    fn roughness(mesh: &SurfaceMesh) -> f64 {
        let radii: Vec<f64> = mesh.vertices().iter().map(|p| p.coords.norm()).collect();
        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        (radii.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / radii.len() as f64).sqrt()
    }

    #[test]
    fn test_smooth_requires_neighbors() {
        let mut mesh = SurfaceMesh::sphere(1);
        assert!(matches!(
            smooth(&mut mesh, &SmoothOptions::default()),
            Err(MeshError::TopologyInconsistent(_))
        ));
    }

    #[test]
    fn test_smooth_keeps_counts_and_areas() {
        let mut mesh = noisy_sphere();
        let (nv, nf) = (mesh.num_vertices(), mesh.num_faces());
        let report = smooth(&mut mesh, &SmoothOptions::default().with_iterations(5)).unwrap();
        assert!(report.moved > 0);
        assert_eq!(mesh.num_vertices(), nv);
        assert_eq!(mesh.num_faces(), nf);
        assert!(min_face_area(&mesh).unwrap() > 0.0);
        assert!(mesh.neighbors().is_ok());
        for f in 0..mesh.num_faces() {
            assert!(mesh.face_normal(f).dot(&mesh.face_centroid(f).coords) > 0.0);
        }
    }

    #[test]
    fn test_neighbor_list_handed_back() {
        let mut mesh = noisy_sphere();
        let before = mesh.neighbors().unwrap().clone();
        let revision = mesh.revision();
        smooth(&mut mesh, &SmoothOptions::default().with_iterations(3)).unwrap();
        normal_smooth(&mut mesh, &SmoothOptions::default().with_iterations(2)).unwrap();
        assert_eq!(mesh.revision(), revision);
        assert_eq!(mesh.neighbors().unwrap(), &before);
    }

    #[test]
    fn test_normal_smooth_reduces_noise() {
        let mut mesh = noisy_sphere();
        let before = roughness(&mesh);
        let options = SmoothOptions::default().with_iterations(3);
        normal_smooth(&mut mesh, &options).unwrap();
        assert!(roughness(&mesh) < before);
        assert!(min_face_area(&mesh).unwrap() > 0.0);
    }

    #[test]
    fn test_marked_vertices_stay_fixed() {
        let mut mesh = noisy_sphere();
        mesh.create_vertex_markers();
        mesh.vertex_markers_mut().unwrap()[0] = 1;
        let p0 = *mesh.position(0);
        smooth(&mut mesh, &SmoothOptions::default()).unwrap();
        assert_eq!(*mesh.position(0), p0);
    }

    #[test]
    fn test_gate_stops_immediately() {
        let mut mesh = SurfaceMesh::sphere(2);
        mesh.certify().unwrap();
        let options = SmoothOptions::default().with_angle_gate(1.0, 179.0);
        let report = smooth(&mut mesh, &options).unwrap();
        assert!(report.gate_reached);
        assert_eq!(report.passes, 0);
    }

    #[test]
    fn test_open_boundary_held() {
        let mut mesh = SurfaceMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.3),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap();
        mesh.certify().unwrap();
        let before = mesh.vertices().to_vec();
        let report = smooth(&mut mesh, &SmoothOptions::default()).unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(mesh.vertices(), &before[..]);
    }
}
