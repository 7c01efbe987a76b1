//! Delaunay tetrahedralization on top of the `delaunay` crate.
//!
//! Points are triangulated by the crate's Bowyer-Watson [`Tds`]. For
//! surface input the triangulation is made to conform: every surface
//! triangle missing from the tetrahedra has its longest edge split at the
//! midpoint, the midpoint is inserted, and the check repeats until all
//! surface triangles are tetrahedron faces. Midpoints lie on the surface,
//! so its geometry is unchanged; only its triangles get finer. Tetrahedra
//! are then kept by nesting depth inside the surface shells.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::f64::consts::PI;

use delaunay::core::triangulation_data_structure::Tds;
use delaunay::core::vertex::Vertex;
use delaunay::vertex;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use super::tet_mesh::{orient, radius_edge_ratio, TetMesh, TET_FACES};
use super::{TetInput, TetParams, Tetrahedralizer};
use crate::error::{MeshError, Result};
use crate::mesh::SurfaceMesh;

/// Rounds of edge splitting before surface recovery gives up.
const MAX_RECOVERY_ROUNDS: usize = 24;

type Triangulation = Tds<f64, Option<()>, Option<()>, 3>;

/// The built-in tetrahedralizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelaunayTetrahedralizer;

impl Tetrahedralizer for DelaunayTetrahedralizer {
    fn tetrahedralize(&self, input: TetInput<'_>, params: &str) -> Result<TetMesh> {
        let params = TetParams::parse(params)?;
        let mut surface = match input {
            TetInput::Points(points) => ConformingSurface::points(points),
            TetInput::Surface(surface) => ConformingSurface::from_surface(surface),
        };
        check_spread(&surface.points)?;
        let skipped = surface.weld();

        let mut backend = Backend::new(&surface.points)?;
        let tets = recover_faces(&mut backend, &mut surface)?;
        debug!(
            tets = tets.len(),
            skipped,
            steiner = surface.points.len() - backend.num_input,
            "Delaunay triangulation built."
        );

        let (tets, regions) = match input {
            TetInput::Points(_) => {
                let n = tets.len();
                (tets, vec![0; n])
            }
            TetInput::Surface(source) => classify(&surface.points, tets, source),
        };

        let mut kept = Vec::with_capacity(tets.len());
        let mut kept_regions = Vec::with_capacity(tets.len());
        for (tet, region) in tets.into_iter().zip(regions) {
            let p = tet.map(|v| surface.points[v]);
            if let Some(limit) = params.max_radius_edge {
                if radius_edge_ratio(&p) > limit {
                    continue;
                }
            }
            if let Some(limit) = params.max_volume {
                if orient(&p[0], &p[1], &p[2], &p[3]).abs() / 6.0 > limit {
                    continue;
                }
            }
            kept.push(tet);
            kept_regions.push(region);
        }
        if kept.is_empty() {
            return Err(MeshError::ExternalMesherFailure(
                "no tetrahedra retained".to_string(),
            ));
        }

        let constrained = match input {
            TetInput::Points(_) => None,
            TetInput::Surface(_) => Some(surface.to_mesh()?),
        };
        let (vertices, kept) = compact(surface.points, kept);
        let mut mesh = TetMesh::new(vertices, kept, kept_regions)
            .map_err(|e| MeshError::ExternalMesherFailure(e.to_string()))?;
        if let Some(constrained) = constrained {
            mesh = mesh.with_constrained_surface(constrained);
        }
        info!(
            vertices = mesh.num_vertices(),
            tets = mesh.num_tets(),
            "Tetrahedralized."
        );
        Ok(mesh)
    }
}

/// Reject inputs with fewer than four distinct points or no volume.
fn check_spread(points: &[Point3<f64>]) -> Result<()> {
    let fail = |msg: &str| -> Result<()> { Err(MeshError::ExternalMesherFailure(msg.to_string())) };
    if let Some(i) = points.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
        return fail(&format!("point {} is not finite", i));
    }
    let Some(&a) = points.first() else {
        return fail("need at least 4 points, got 0");
    };
    if points.len() < 4 {
        return fail(&format!("need at least 4 points, got {}", points.len()));
    }
    let scale = points
        .iter()
        .map(|p| (p - a).norm())
        .fold(0.0, f64::max);
    let tol = scale * 1e-10;
    let Some(b) = points.iter().find(|p| (*p - a).norm() > tol) else {
        return fail("all points coincide");
    };
    let ab = b - a;
    let Some(c) = points.iter().find(|p| ab.cross(&(*p - a)).norm() > tol * scale) else {
        return fail("input points are collinear");
    };
    let normal = ab.cross(&(c - a));
    if !points
        .iter()
        .any(|p| normal.dot(&(p - a)).abs() > tol * scale * scale)
    {
        return fail("input points are coplanar");
    }
    Ok(())
}

/// A [`Tds`] with its vertices mapped back to point indices.
struct Backend {
    tds: Triangulation,
    ids: HashMap<Uuid, usize>,
    num_input: usize,
}

impl Backend {
    fn new(points: &[Point3<f64>]) -> Result<Self> {
        let vertices: Vec<Vertex<f64, Option<()>, 3>> =
            points.iter().map(|p| vertex!([p.x, p.y, p.z])).collect();
        let ids = vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (v.uuid(), i))
            .collect();
        let tds = Triangulation::new(&vertices)
            .map_err(|e| MeshError::ExternalMesherFailure(format!("triangulation failed: {}", e)))?;
        Ok(Self {
            tds,
            ids,
            num_input: points.len(),
        })
    }

    fn insert(&mut self, index: usize, p: &Point3<f64>) -> Result<()> {
        let v: Vertex<f64, Option<()>, 3> = vertex!([p.x, p.y, p.z]);
        self.ids.insert(v.uuid(), index);
        self.tds.add(v).map_err(|e| {
            MeshError::ExternalMesherFailure(format!("inserting point {}: {}", index, e))
        })
    }

    /// Cells as point-index quadruples. Flat cells are dropped.
    fn tets(&self, points: &[Point3<f64>]) -> Result<Vec<[usize; 4]>> {
        let mut tets = Vec::with_capacity(self.tds.number_of_cells());
        for cell in self.tds.cells().values() {
            let vertices = cell.vertices();
            if vertices.len() != 4 {
                return Err(MeshError::ExternalMesherFailure(format!(
                    "cell with {} vertices",
                    vertices.len()
                )));
            }
            let mut tet = [0; 4];
            for (slot, v) in tet.iter_mut().zip(vertices) {
                *slot = *self.ids.get(&v.uuid()).ok_or_else(|| {
                    MeshError::ExternalMesherFailure("cell references an unknown vertex".to_string())
                })?;
            }
            let [a, b, c, d] = tet.map(|v| points[v]);
            if orient(&a, &b, &c, &d) != 0.0 {
                tets.push(tet);
            }
        }
        Ok(tets)
    }
}

/// Split surface triangles until each one is a face of the triangulation.
fn recover_faces(backend: &mut Backend, surface: &mut ConformingSurface) -> Result<Vec<[usize; 4]>> {
    let mut round = 0;
    loop {
        let tets = backend.tets(&surface.points)?;
        let present: HashSet<[usize; 3]> = tets
            .iter()
            .flat_map(|tet| TET_FACES.iter().map(move |f| sorted(f.map(|k| tet[k]))))
            .collect();
        let missing: Vec<usize> = (0..surface.faces.len())
            .filter(|&f| !present.contains(&sorted(surface.faces[f])))
            .collect();
        if missing.is_empty() {
            if round > 0 {
                debug!(rounds = round, faces = surface.faces.len(), "Recovered surface triangles.");
            }
            return Ok(tets);
        }
        if round == MAX_RECOVERY_ROUNDS {
            return Err(MeshError::ExternalMesherFailure(format!(
                "{} surface triangles missing after {} recovery rounds",
                missing.len(),
                MAX_RECOVERY_ROUNDS
            )));
        }
        debug!(round, missing = missing.len(), "Splitting missing surface triangles.");

        let edges: BTreeSet<[usize; 2]> = missing
            .iter()
            .map(|&f| surface.longest_edge(f))
            .collect();
        let first = surface.points.len();
        surface.split_edges(&edges);
        for i in first..surface.points.len() {
            let p = surface.points[i];
            backend.insert(i, &p)?;
        }
        round += 1;
    }
}

/// The points being triangulated and the surface triangles that must
/// appear among the tetrahedron faces.
#[derive(Debug, Clone)]
struct ConformingSurface {
    points: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    markers: Option<Vec<i32>>,
}

impl ConformingSurface {
    fn points(points: &[Point3<f64>]) -> Self {
        Self {
            points: points.to_vec(),
            faces: Vec::new(),
            markers: None,
        }
    }

    fn from_surface(surface: &SurfaceMesh) -> Self {
        Self {
            points: surface.vertices().to_vec(),
            faces: surface.faces().to_vec(),
            markers: surface.face_markers().map(<[i32]>::to_vec),
        }
    }

    /// Merge points at identical positions. Returns how many were merged.
    fn weld(&mut self) -> usize {
        let mut first: HashMap<[u64; 3], usize> = HashMap::with_capacity(self.points.len());
        let mut remap = Vec::with_capacity(self.points.len());
        let mut points = Vec::with_capacity(self.points.len());
        for p in &self.points {
            let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
            let index = *first.entry(key).or_insert_with(|| {
                points.push(*p);
                points.len() - 1
            });
            remap.push(index);
        }
        let merged = self.points.len() - points.len();
        self.points = points;
        for face in &mut self.faces {
            *face = face.map(|v| remap[v]);
        }
        merged
    }

    fn longest_edge(&self, f: usize) -> [usize; 2] {
        let face = self.faces[f];
        (0..3)
            .map(|k| [face[k], face[(k + 1) % 3]])
            .max_by(|a, b| {
                let la = (self.points[a[0]] - self.points[a[1]]).norm_squared();
                let lb = (self.points[b[0]] - self.points[b[1]]).norm_squared();
                la.total_cmp(&lb)
            })
            .map(|[a, b]| edge_key(a, b))
            .unwrap_or([face[0], face[1]])
    }

    /// Split every listed edge at its midpoint and bisect the triangles
    /// around it. Orientation and face markers carry over to the pieces.
    fn split_edges(&mut self, edges: &BTreeSet<[usize; 2]>) {
        let mut midpoints = HashMap::with_capacity(edges.len());
        for &[a, b] in edges {
            midpoints.insert([a, b], self.points.len());
            self.points
                .push(nalgebra::center(&self.points[a], &self.points[b]));
        }

        let mut faces = Vec::with_capacity(self.faces.len() + 2 * edges.len());
        let mut markers = self.markers.as_ref().map(|m| Vec::with_capacity(m.len()));
        for (f, &face) in self.faces.iter().enumerate() {
            bisect(face, &midpoints, &mut faces);
            if let (Some(out), Some(source)) = (markers.as_mut(), self.markers.as_ref()) {
                out.resize(faces.len(), source[f]);
            }
        }
        self.faces = faces;
        self.markers = markers;
    }

    fn to_mesh(&self) -> Result<SurfaceMesh> {
        let mut mesh = SurfaceMesh::from_parts(self.points.clone(), self.faces.clone())?;
        if let Some(markers) = &self.markers {
            mesh.create_face_markers();
            if let Some(out) = mesh.face_markers_mut() {
                out.copy_from_slice(markers);
            }
        }
        Ok(mesh)
    }
}

fn bisect(face: [usize; 3], midpoints: &HashMap<[usize; 2], usize>, out: &mut Vec<[usize; 3]>) {
    for k in 0..3 {
        let (a, b, c) = (face[k], face[(k + 1) % 3], face[(k + 2) % 3]);
        if let Some(&m) = midpoints.get(&edge_key(a, b)) {
            bisect([a, m, c], midpoints, out);
            bisect([m, b, c], midpoints, out);
            return;
        }
    }
    out.push(face);
}

#[inline]
fn edge_key(a: usize, b: usize) -> [usize; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

#[inline]
fn sorted(mut face: [usize; 3]) -> [usize; 3] {
    face.sort_unstable();
    face
}

/// Keep referenced vertices in their input order.
fn compact(vertices: Vec<Point3<f64>>, mut tets: Vec<[usize; 4]>) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    let mut used = vec![false; vertices.len()];
    for tet in &tets {
        for &v in tet {
            used[v] = true;
        }
    }
    let mut remap = vec![usize::MAX; vertices.len()];
    let mut kept = Vec::new();
    for (v, p) in vertices.into_iter().enumerate() {
        if used[v] {
            remap[v] = kept.len();
            kept.push(p);
        }
    }
    for tet in &mut tets {
        *tet = tet.map(|v| remap[v]);
    }
    (kept, tets)
}

/// Drop tetrahedra outside the surface and number regions from the
/// innermost shell outward (1 = inside the innermost shell).
fn classify(
    vertices: &[Point3<f64>],
    tets: Vec<[usize; 4]>,
    surface: &SurfaceMesh,
) -> (Vec<[usize; 4]>, Vec<i32>) {
    let shells = shells(surface);
    let depths: Vec<usize> = tets
        .par_iter()
        .map(|tet| {
            let centroid = Point3::from(
                tet.iter().fold(Vector3::zeros(), |acc, &v| acc + vertices[v].coords) / 4.0,
            );
            shells
                .iter()
                .filter(|shell| winding_number(surface, shell, &centroid).abs() > 0.5)
                .count()
        })
        .collect();
    let deepest = depths.iter().copied().max().unwrap_or(0);

    let mut kept = Vec::new();
    let mut regions = Vec::new();
    for (tet, depth) in tets.into_iter().zip(depths) {
        if depth > 0 {
            kept.push(tet);
            regions.push((deepest + 1 - depth) as i32);
        }
    }
    (kept, regions)
}

/// Faces grouped by vertex-connected component.
fn shells(surface: &SurfaceMesh) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..surface.num_vertices()).collect();
    fn find(parent: &mut [usize], mut v: usize) -> usize {
        while parent[v] != v {
            parent[v] = parent[parent[v]];
            v = parent[v];
        }
        v
    }
    for &[a, b, c] in surface.faces() {
        let ra = find(&mut parent, a);
        for x in [b, c] {
            let rx = find(&mut parent, x);
            parent[rx] = ra;
        }
    }
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (f, face) in surface.faces().iter().enumerate() {
        let root = find(&mut parent, face[0]);
        groups.entry(root).or_default().push(f);
    }
    let mut shells: Vec<Vec<usize>> = groups.into_values().collect();
    shells.sort_unstable_by_key(|faces| faces[0]);
    shells
}

/// Generalized winding number of a closed shell around `p`.
fn winding_number(surface: &SurfaceMesh, faces: &[usize], p: &Point3<f64>) -> f64 {
    let mut total = 0.0;
    for &f in faces {
        let [a, b, c] = surface.face_positions(f).map(|q| q - p);
        let (la, lb, lc) = (a.norm(), b.norm(), c.norm());
        let num = a.dot(&b.cross(&c));
        let den = la * lb * lc + a.dot(&b) * lc + a.dot(&c) * lb + b.dot(&c) * la;
        total += 2.0 * num.atan2(den);
    }
    total / (4.0 * PI)
}
