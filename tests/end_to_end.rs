//! Whole-pipeline properties on small synthetic molecules.

use biomesh::prelude::*;
use std::collections::HashSet;

use biomesh::topology::{components, correct_normals, remove_islands};
use biomesh::volumetric::TetInput;
use nalgebra::Point3;

fn sphere_atom() -> AtomSet {
    AtomSet::new(vec![Atom::new(Point3::origin(), 5.0)]).unwrap()
}

fn extract(atoms: &AtomSet) -> (DensityGrid, SurfaceMesh) {
    let options = BlobbyOptions::default()
        .with_resolution(1.99)
        .with_padding_ratio(1.5)
        .with_isovalue(2.5);
    let grid = blobby_density(atoms, &options).unwrap();
    let mesh = marching_cubes(&grid, 2.5, SecondaryField::None).unwrap().mesh;
    (grid, mesh)
}

fn is_closed(mesh: &SurfaceMesh) -> bool {
    let neighbors = mesh.neighbors().unwrap();
    (0..mesh.num_vertices()).all(|v| !neighbors.is_boundary(VertexId::new(v)))
}

#[test]
fn grid_covers_padded_box() {
    let (grid, _) = extract(&sphere_atom());
    // Extended box [-5, 5]^3 scaled by 1.5.
    assert_eq!(grid.dims(), [31, 31, 31]);
    let origin = grid.origin();
    let max = grid.max_corner();
    for a in 0..3 {
        assert!((origin[a] + 7.5).abs() < 1e-9);
        assert!(max[a] >= 7.5 - 1e-9);
    }
}

#[test]
fn single_sphere_is_one_closed_component() {
    let (_, mut mesh) = extract(&sphere_atom());
    assert!(mesh.num_faces() > 100);
    mesh.certify().unwrap();

    let (_, count) = components(&mesh).unwrap();
    assert_eq!(count, 1);
    assert!(is_closed(&mesh));
    assert_eq!(mesh.euler_characteristic(), 2);

    // Vertices lie near the atom sphere.
    for p in mesh.vertices() {
        let r = p.coords.norm();
        assert!((r - 5.0).abs() < 0.6, "vertex at radius {}", r);
    }
}

#[test]
fn coarsening_strictly_reduces_faces() {
    let (_, mut mesh) = extract(&sphere_atom());
    mesh.certify().unwrap();
    correct_normals(&mut mesh).unwrap();
    let before = mesh.num_faces();

    let status = coarsen(&mut mesh, &CoarsenOptions::default()).unwrap();
    assert_ne!(status, CoarsenStatus::AtFloor);
    assert!(mesh.num_faces() < before);
    assert_eq!(mesh.euler_characteristic(), 2);
    assert!(is_closed(&mesh));
    assert!(mesh.signed_volume() > 0.0);
}

#[test]
fn neighbor_list_rebuild_is_idempotent() {
    let (_, mut mesh) = extract(&sphere_atom());
    mesh.build_neighbors().unwrap();
    let first = mesh.neighbors().unwrap().clone();

    mesh.destroy_neighbors();
    assert!(!mesh.has_neighbors());
    mesh.build_neighbors().unwrap();
    assert_eq!(mesh.neighbors().unwrap(), &first);

    mesh.rebuild_neighbors().unwrap();
    assert_eq!(mesh.neighbors().unwrap(), &first);
}

fn kernel(p: &Point3<f64>, center: Point3<f64>, radius: f64) -> f64 {
    2.5 * (-0.2 * ((p - center).norm_squared() / (radius * radius) - 1.0)).exp()
}

fn lattice<F: Fn(Point3<f64>) -> f64>(f: F) -> DensityGrid {
    DensityGrid::from_fn(
        [63, 33, 33],
        Point3::new(-8.0, -8.0, -8.0),
        nalgebra::Vector3::new(0.5, 0.5, 0.5),
        |p| f(p) as f32,
    )
    .unwrap()
}

#[test]
fn island_removal_keeps_the_large_shell() {
    let big = |p: &Point3<f64>| kernel(p, Point3::origin(), 5.0);
    let small = |p: &Point3<f64>| kernel(p, Point3::new(20.0, 0.0, 0.0), 1.0);

    let mut both = marching_cubes(&lattice(|p| big(&p) + small(&p)), 2.5, SecondaryField::None)
        .unwrap()
        .mesh;
    both.certify().unwrap();
    assert_eq!(components(&both).unwrap().1, 2);

    let report = remove_islands(&mut both, 100.0).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.kept, 1);
    assert_eq!(components(&both).unwrap().1, 1);
    assert!(both.vertices().iter().all(|p| p.x < 10.0));

    let mut alone = marching_cubes(&lattice(|p| big(&p)), 2.5, SecondaryField::None)
        .unwrap()
        .mesh;
    alone.certify().unwrap();
    assert_eq!(both.num_vertices(), alone.num_vertices());
    assert_eq!(both.num_faces(), alone.num_faces());
}

#[test]
fn smoothing_keeps_counts_and_positive_areas() {
    let (_, mut mesh) = extract(&sphere_atom());
    mesh.certify().unwrap();
    let (nv, nf) = (mesh.num_vertices(), mesh.num_faces());

    smooth(&mut mesh, &SmoothOptions::default().with_iterations(5)).unwrap();
    assert_eq!(mesh.num_vertices(), nv);
    assert_eq!(mesh.num_faces(), nf);
    assert!((0..nf).all(|f| mesh.face_area(f) > 0.0));
}

#[test]
fn two_touching_atoms_fuse() {
    let atoms = AtomSet::new(vec![
        Atom::new(Point3::new(-1.5, 0.0, 0.0), 2.0),
        Atom::new(Point3::new(1.5, 0.0, 0.0), 2.0),
    ])
    .unwrap();
    let (_, mut mesh) = extract(&atoms);
    mesh.certify().unwrap();
    assert_eq!(components(&mesh).unwrap().1, 1);
    assert_eq!(mesh.euler_characteristic(), 2);
}

#[test]
fn surface_then_volume() {
    let config = MeshConfig::default();
    let outcome = molecular_surface(&sphere_atom(), &[], &config).unwrap();
    assert_eq!(outcome.status, SurfaceStatus::Surface);

    let mut config = config;
    config.sphere_ratio = 3.0;
    config.sphere_level = 2;
    let volume = molecular_volume(&outcome.mesh, &config).unwrap();
    assert!(volume.fe.num_simplices() > 0);
    assert_eq!(volume.fe.num_vertices(), volume.tets.num_vertices());
    let materials: std::collections::BTreeSet<i32> =
        volume.fe.simplices.iter().map(|s| s.material).collect();
    assert!(materials.contains(&1));
    assert!(materials.contains(&2));
}

fn bits(p: &Point3<f64>) -> [u64; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

fn triangle_key(points: [Point3<f64>; 3]) -> [[u64; 3]; 3] {
    let mut key = points.map(|p| bits(&p));
    key.sort_unstable();
    key
}

#[test]
fn fused_pair_surface_is_recovered_in_the_tets() {
    // Two touching atoms fuse through a neck, so the surface is not convex.
    let atoms = AtomSet::new(vec![
        Atom::new(Point3::new(-3.0, 0.0, 0.0), 3.0),
        Atom::new(Point3::new(3.0, 0.0, 0.0), 3.0),
    ])
    .unwrap();
    let surface = molecular_surface(&atoms, &[], &MeshConfig::default()).unwrap().mesh;
    assert_eq!(surface.euler_characteristic(), 2);

    let tets = DelaunayTetrahedralizer
        .tetrahedralize(TetInput::Surface(&surface), "")
        .unwrap();
    let tet_faces: HashSet<[[u64; 3]; 3]> = (0..tets.num_tets())
        .flat_map(|t| (0..4).map(move |i| (t, i)))
        .map(|(t, i)| triangle_key(tets.face(t, i).map(|v| tets.vertices()[v])))
        .collect();
    let tet_vertices: HashSet<[u64; 3]> = tets.vertices().iter().map(bits).collect();

    let constrained = tets.constrained_surface().unwrap();
    for f in 0..constrained.num_faces() {
        assert!(tet_faces.contains(&triangle_key(constrained.face_positions(f))));
    }
    assert!(surface.vertices().iter().all(|p| tet_vertices.contains(&bits(p))));

    let area = surface.surface_area();
    assert!((constrained.surface_area() - area).abs() < 1e-9 * area);
    let volume = surface.signed_volume();
    assert!((tets.volume() - volume).abs() < 1e-9 * volume);
    assert_eq!(tets.surface_extract().unwrap().num_faces(), constrained.num_faces());
}
