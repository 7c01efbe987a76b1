//! Edge-collapse coarsening.
//!
//! Short edges in flat regions are collapsed to their midpoints, shortest
//! first, until a pass has removed `ceil(rate * V)` vertices or no edge
//! passes the thresholds:
//!
//! - the edge is shorter than `denseness_weight` times the average edge
//!   length of the mesh at the start of the pass
//! - every face normal around the edge lies within `flatness_angle` of
//!   their mean
//! - no surviving face normal rotates by more than `max_normal_angle`
//!
//! Collapses also respect the link condition, so a closed manifold stays a
//! closed manifold with the same Euler characteristic. Boundary edges are
//! never collapsed.
//!
//! # Example
//!
//! ```
//! use biomesh::mesh::SurfaceMesh;
//! use biomesh::algo::coarsen::{coarsen, CoarsenOptions, CoarsenStatus};
//!
//! let mut mesh = SurfaceMesh::sphere(3);
//! mesh.certify().unwrap();
//! let before = mesh.num_faces();
//!
//! let status = coarsen(&mut mesh, &CoarsenOptions::default()).unwrap();
//! assert_ne!(status, CoarsenStatus::AtFloor);
//! assert!(mesh.num_faces() < before);
//! assert_eq!(mesh.euler_characteristic(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::config::CoarsenConfig;
use crate::error::{MeshError, Result};
use crate::mesh::{MeshStage, SurfaceMesh, VertexId, MARKER_SENTINEL};
use crate::topology::retain_faces;

/// Options for coarsening.
#[derive(Debug, Clone)]
pub struct CoarsenOptions {
    /// Fraction of the vertices a pass tries to remove, in (0, 1).
    pub rate: f64,

    /// Maximum angle (degrees) between a face normal around the edge and
    /// the mean normal there.
    pub flatness_angle: f64,

    /// Edges longer than this multiple of the average edge length are kept.
    pub denseness_weight: f64,

    /// Maximum rotation (degrees) of any face normal that survives a collapse.
    pub max_normal_angle: f64,

    /// Never collapse an edge touching a vertex that carries a marker.
    pub hold_marked: bool,
}

impl Default for CoarsenOptions {
    fn default() -> Self {
        Self::from_config(&CoarsenConfig::default())
    }
}

impl CoarsenOptions {
    /// Options matching a pipeline configuration.
    pub fn from_config(config: &CoarsenConfig) -> Self {
        Self {
            rate: config.rate,
            flatness_angle: config.flatness_angle,
            denseness_weight: config.denseness_weight,
            max_normal_angle: config.max_normal_angle,
            hold_marked: true,
        }
    }

    /// Set the fraction of vertices to remove.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the flatness threshold in degrees.
    pub fn with_flatness_angle(mut self, degrees: f64) -> Self {
        self.flatness_angle = degrees;
        self
    }

    /// Set the edge-length bound as a multiple of the average edge length.
    pub fn with_denseness_weight(mut self, weight: f64) -> Self {
        self.denseness_weight = weight;
        self
    }

    /// Set the normal-rotation bound in degrees.
    pub fn with_max_normal_angle(mut self, degrees: f64) -> Self {
        self.max_normal_angle = degrees;
        self
    }

    /// Allow collapses next to marked vertices.
    pub fn allow_marked_collapse(mut self) -> Self {
        self.hold_marked = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.rate > 0.0 && self.rate < 1.0) {
            return Err(MeshError::invalid_param("rate", self.rate, "must lie in (0, 1)"));
        }
        if !(self.denseness_weight.is_finite() && self.denseness_weight > 0.0) {
            return Err(MeshError::invalid_param(
                "denseness_weight",
                self.denseness_weight,
                "must be positive",
            ));
        }
        for (name, angle) in [
            ("flatness_angle", self.flatness_angle),
            ("max_normal_angle", self.max_normal_angle),
        ] {
            if !(0.0..=180.0).contains(&angle) {
                return Err(MeshError::invalid_param(name, angle, "must lie in [0, 180]"));
            }
        }
        Ok(())
    }
}

/// How far a coarsening pass got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarsenStatus {
    /// The requested number of vertices was removed.
    Reached,
    /// Some vertices were removed before the thresholds stopped the pass.
    Partial,
    /// No edge could be collapsed.
    AtFloor,
}

/// An edge waiting in the collapse queue.
#[derive(Debug, Clone)]
struct EdgeCandidate {
    /// Vertex indices (smaller first).
    v0: usize,
    v1: usize,
    length: f64,
    /// Vertex versions when the entry was pushed.
    stamp: (u32, u32),
}

impl EdgeCandidate {
    fn new(a: usize, b: usize, vertices: &[Point3<f64>], versions: &[u32]) -> Self {
        let (v0, v1) = if a < b { (a, b) } else { (b, a) };
        Self {
            v0,
            v1,
            length: (vertices[v1] - vertices[v0]).norm(),
            stamp: (versions[v0], versions[v1]),
        }
    }

    fn is_current(&self, alive: &[bool], versions: &[u32]) -> bool {
        alive[self.v0]
            && alive[self.v1]
            && self.stamp == (versions[self.v0], versions[self.v1])
    }
}

impl PartialEq for EdgeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeCandidate {}

impl PartialOrd for EdgeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the shortest edge first.
        other
            .length
            .total_cmp(&self.length)
            .then_with(|| (other.v0, other.v1).cmp(&(self.v0, self.v1)))
    }
}

/// Working copy of the mesh during a pass.
struct Collapser {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    alive_faces: Vec<bool>,
    alive: Vec<bool>,
    versions: Vec<u32>,
    /// Faces incident to each vertex; may hold dead faces.
    vertex_faces: Vec<Vec<usize>>,
}

impl Collapser {
    fn new(mesh: &SurfaceMesh) -> Self {
        let mut vertex_faces = vec![Vec::new(); mesh.num_vertices()];
        for (fi, face) in mesh.faces().iter().enumerate() {
            for &v in face {
                vertex_faces[v].push(fi);
            }
        }
        Self {
            vertices: mesh.vertices().to_vec(),
            faces: mesh.faces().to_vec(),
            alive_faces: vec![true; mesh.num_faces()],
            alive: vec![true; mesh.num_vertices()],
            versions: vec![0; mesh.num_vertices()],
            vertex_faces,
        }
    }

    fn star(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v]
            .iter()
            .copied()
            .filter(|&f| self.alive_faces[f])
    }

    /// Sorted one-ring of `v`.
    fn ring(&self, v: usize) -> Vec<usize> {
        let mut ring: Vec<usize> = self
            .star(v)
            .flat_map(|f| self.faces[f])
            .filter(|&u| u != v)
            .collect();
        ring.sort_unstable();
        ring.dedup();
        ring
    }

    fn normal(&self, face: [usize; 3]) -> Vector3<f64> {
        let [a, b, c] = face.map(|v| self.vertices[v]);
        (b - a).cross(&(c - a))
    }

    /// Link condition plus the valence guards that keep the surface a
    /// manifold with the same Euler characteristic.
    fn link_ok(&self, a: usize, b: usize) -> bool {
        let shared = self.star(a).filter(|&f| self.faces[f].contains(&b)).count();
        if shared != 2 {
            return false;
        }
        let ring_a = self.ring(a);
        let ring_b = self.ring(b);
        let common: Vec<usize> = ring_a
            .iter()
            .copied()
            .filter(|u| ring_b.binary_search(u).is_ok())
            .collect();
        if common.len() != 2 {
            return false;
        }
        // An opposite vertex of valence 3 would end up with valence 2.
        if common.iter().any(|&c| self.ring(c).len() <= 3) {
            return false;
        }
        ring_a.len() + ring_b.len() >= 7
    }

    /// Whether the faces around `a`-`b` are flat enough and no surviving
    /// face rotates too far when both ends move to `m`.
    fn shape_ok(&self, a: usize, b: usize, m: &Point3<f64>, cos_flat: f64, cos_turn: f64) -> bool {
        let mut star: Vec<usize> = self.star(a).chain(self.star(b)).collect();
        star.sort_unstable();
        star.dedup();

        let normals: Vec<Vector3<f64>> = star
            .iter()
            .filter_map(|&f| self.normal(self.faces[f]).try_normalize(f64::EPSILON))
            .collect();
        let Some(mean) = normals
            .iter()
            .sum::<Vector3<f64>>()
            .try_normalize(f64::EPSILON)
        else {
            return false;
        };
        if normals.iter().any(|n| n.dot(&mean) < cos_flat) {
            return false;
        }

        for &f in &star {
            let face = self.faces[f];
            if face.contains(&a) && face.contains(&b) {
                continue;
            }
            let Some(before) = self.normal(face).try_normalize(f64::EPSILON) else {
                continue;
            };
            let [p, q, r] = face.map(|v| if v == a || v == b { *m } else { self.vertices[v] });
            let Some(after) = (q - p).cross(&(r - p)).try_normalize(f64::EPSILON) else {
                return false;
            };
            if after.dot(&before) < cos_turn {
                return false;
            }
        }
        true
    }

    /// Merge `b` into `a` at `m`.
    fn collapse(&mut self, a: usize, b: usize, m: Point3<f64>) {
        self.vertices[a] = m;
        self.alive[b] = false;
        self.versions[a] += 1;

        let moved = std::mem::take(&mut self.vertex_faces[b]);
        for f in moved {
            if !self.alive_faces[f] {
                continue;
            }
            if self.faces[f].contains(&a) {
                self.alive_faces[f] = false;
                continue;
            }
            for v in self.faces[f].iter_mut() {
                if *v == b {
                    *v = a;
                }
            }
            self.vertex_faces[a].push(f);
        }
        let alive_faces = &self.alive_faces;
        self.vertex_faces[a].retain(|&f| alive_faces[f]);

        // Entries of the neighbors' other edges may now fail the link test.
        for u in self.ring(a) {
            self.versions[u] += 1;
        }
    }
}

/// Run one coarsening pass.
///
/// Requires an up-to-date neighbor list. The mesh keeps its lifecycle
/// stage and is handed back with fresh adjacency; surviving markers follow
/// their elements, and a merged vertex keeps the first non-sentinel marker
/// of its two ends.
pub fn coarsen(mesh: &mut SurfaceMesh, options: &CoarsenOptions) -> Result<CoarsenStatus> {
    options.validate()?;
    let neighbors = mesh.neighbors()?;
    let boundary: Vec<bool> = (0..mesh.num_vertices())
        .map(|v| neighbors.is_boundary(VertexId::new(v)))
        .collect();

    let target = (options.rate * mesh.num_vertices() as f64).ceil() as usize;
    let max_length = options.denseness_weight * mesh.average_edge_length();
    let cos_flat = options.flatness_angle.to_radians().cos();
    let cos_turn = options.max_normal_angle.to_radians().cos();
    let mut vertex_markers = mesh.vertex_markers().map(<[i32]>::to_vec);
    let held = |v: usize, markers: &Option<Vec<i32>>| {
        boundary[v] || (options.hold_marked && markers.as_ref().is_some_and(|m| m[v] != MARKER_SENTINEL))
    };

    let mut work = Collapser::new(mesh);
    let mut heap: BinaryHeap<EdgeCandidate> = mesh
        .edges()
        .into_iter()
        .map(|(a, b)| EdgeCandidate::new(a, b, &work.vertices, &work.versions))
        .filter(|c| c.length < max_length)
        .collect();

    let mut removed = 0;
    while removed < target {
        let Some(candidate) = heap.pop() else {
            break;
        };
        if !candidate.is_current(&work.alive, &work.versions) {
            // Re-queue edges whose ends only changed version.
            if work.alive[candidate.v0] && work.alive[candidate.v1] {
                let fresh = EdgeCandidate::new(candidate.v0, candidate.v1, &work.vertices, &work.versions);
                if fresh.length < max_length && fresh.stamp != candidate.stamp {
                    heap.push(fresh);
                }
            }
            continue;
        }
        if candidate.length >= max_length {
            break;
        }
        let (a, b) = (candidate.v0, candidate.v1);
        if held(a, &vertex_markers) || held(b, &vertex_markers) || !work.link_ok(a, b) {
            continue;
        }
        let m = Point3::from((work.vertices[a].coords + work.vertices[b].coords) * 0.5);
        if !work.shape_ok(a, b, &m, cos_flat, cos_turn) {
            continue;
        }

        work.collapse(a, b, m);
        if let Some(markers) = &mut vertex_markers {
            if markers[a] == MARKER_SENTINEL {
                markers[a] = markers[b];
            }
        }
        removed += 1;

        for u in work.ring(a) {
            let c = EdgeCandidate::new(a, u, &work.vertices, &work.versions);
            if c.length < max_length {
                heap.push(c);
            }
        }
    }

    let status = match removed {
        0 => CoarsenStatus::AtFloor,
        n if n >= target => CoarsenStatus::Reached,
        _ => CoarsenStatus::Partial,
    };
    if removed == 0 {
        info!(target, "Coarsening found no collapsible edge.");
        return Ok(status);
    }

    let stage = mesh.stage();
    let before = mesh.num_faces();
    let Collapser {
        vertices,
        faces,
        alive_faces,
        ..
    } = work;
    mesh.replace(vertices, faces);
    mesh.set_vertex_markers(vertex_markers);
    retain_faces(mesh, &alive_faces);
    if stage == MeshStage::Raw {
        mesh.rebuild_neighbors()?;
    } else {
        mesh.recertify(stage)?;
    }

    debug!(queue_left = heap.len(), "Coarsening pass finished.");
    info!(
        removed,
        target,
        faces_before = before,
        faces_after = mesh.num_faces(),
        status = ?status,
        "Coarsened surface."
    );
    Ok(status)
}
