//! File-based workflows: structure in, surface and volume meshes out.

use biomesh::io::{self, mcsf, rawiv};
use biomesh::pipeline::{lattice_surface, molecular_surface, molecular_volume, SurfaceStatus};
use biomesh::prelude::*;

const DIPEPTIDE: &str = "\
REMARK two heavy atoms and a water
ATOM      1  N   GLY A   1       0.000   0.000   0.000 -0.3000 1.8240
ATOM      2  CA  GLY A   1       1.450   0.000   0.000  0.2100 1.9080
ATOM      3  C   GLY A   1       2.000   1.400   0.000  0.5970 1.9080
HETATM    4  O   HOH W   2       1.000   0.700   1.300 -0.8340 1.6612
END
";

#[test]
fn pqr_to_off_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pqr = dir.path().join("gly.pqr");
    std::fs::write(&pqr, DIPEPTIDE).unwrap();

    let atoms = io::load_atoms(&pqr).unwrap();
    assert_eq!(atoms.len(), 4);
    let outcome = molecular_surface(&atoms, &[], &MeshConfig::default()).unwrap();
    assert_eq!(outcome.status, SurfaceStatus::Surface);
    assert_eq!(outcome.mesh.euler_characteristic(), 2);

    let off = dir.path().join("gly.off");
    io::save_surface(&outcome.mesh, &off).unwrap();
    let loaded = io::load_surface(&off).unwrap();
    assert_eq!(loaded.faces(), outcome.mesh.faces());
    for (a, b) in loaded.vertices().iter().zip(outcome.mesh.vertices()) {
        assert_eq!(a.coords.map(f64::to_bits), b.coords.map(f64::to_bits));
    }
}

#[test]
fn active_sites_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let pqr = dir.path().join("gly.pqr");
    std::fs::write(&pqr, DIPEPTIDE).unwrap();
    let sites_path = dir.path().join("sites.txt");
    std::fs::write(&sites_path, "1\n-1.8 0.0 0.0 1.5 4\n").unwrap();

    let atoms = io::load_atoms(&pqr).unwrap();
    let sites = io::load_sites(&sites_path).unwrap();
    let outcome = molecular_surface(&atoms, &sites, &MeshConfig::default()).unwrap();
    assert!(outcome.tagged > 0);
    assert!(outcome.mesh.vertex_markers().unwrap().contains(&4));
}

#[test]
fn surface_to_mcsf() {
    let dir = tempfile::tempdir().unwrap();
    let mut surface = SurfaceMesh::sphere(2);
    surface.scale_uniform(3.0);
    surface.certify().unwrap();

    let mut config = MeshConfig::default();
    config.sphere_ratio = 4.0;
    config.sphere_level = 2;
    let volume = molecular_volume(&surface, &config).unwrap();

    let path = dir.path().join("mol.m");
    mcsf::save(&volume.fe, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("mcsf_begin=1;"));
    assert!(text.contains(&format!(" vertices={};", volume.fe.num_vertices())));
    assert!(text.contains(&format!("simplices={};", volume.fe.num_simplices())));
    assert!(text.trim_end().ends_with("mcsf_end=1;"));

    let simplex_lines = text
        .split("simp=[\n")
        .nth(1)
        .and_then(|rest| rest.split("];").next())
        .unwrap()
        .lines()
        .count();
    assert_eq!(simplex_lines, volume.fe.num_simplices());
}

#[test]
fn rawiv_lattice_surface() {
    let dir = tempfile::tempdir().unwrap();
    let atoms = AtomSet::new(vec![Atom::new(nalgebra::Point3::new(1.0, 2.0, 3.0), 4.0)]).unwrap();
    let grid = blobby_density(&atoms, &BlobbyOptions::default()).unwrap();
    let path = dir.path().join("density.rawiv");
    rawiv::save(&grid, &path).unwrap();

    let loaded = rawiv::load(&path).unwrap();
    assert_eq!(loaded.dims(), grid.dims());
    let outcome = lattice_surface(&loaded, 2.5, &MeshConfig::default()).unwrap();
    assert_eq!(outcome.status, SurfaceStatus::Surface);
    assert_eq!(outcome.mesh.euler_characteristic(), 2);
    assert_eq!(outcome.mesh.stage(), MeshStage::Improved);
}

#[test]
fn config_file_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.toml");
    std::fs::write(&path, "dim-scale = 1.0\n\n[coarsen]\nrounds = 0\n").unwrap();
    let config = MeshConfig::from_file(&path).unwrap();
    assert_eq!(config.dim_scale, 1.0);

    let atoms = AtomSet::new(vec![Atom::new(nalgebra::Point3::origin(), 3.0)]).unwrap();
    let outcome = molecular_surface(&atoms, &[], &config).unwrap();
    assert!(outcome.quality.unwrap().rounds.is_empty());
}

#[test]
fn unsupported_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.obj");
    std::fs::write(&path, "v 0 0 0\n").unwrap();
    assert!(matches!(
        io::load_surface(&path),
        Err(MeshError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        io::load_atoms(&path),
        Err(MeshError::UnsupportedFormat { .. })
    ));
}
