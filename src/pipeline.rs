//! End-to-end meshing workflows.
//!
//! Each workflow chains the stages in order and owns the intermediate
//! results until it hands the finished mesh back:
//!
//! - [`molecular_surface`]: atoms → density → isosurface → repair → quality loop
//! - [`lattice_surface`]: a precomputed volume → isosurface → repair → quality loop
//! - [`improve`]: the coarsen/smooth loop on its own
//! - [`molecular_volume`]: surface + bounding sphere → tetrahedra → FE mesh
//!
//! # Example
//!
//! ```
//! use biomesh::atoms::{Atom, AtomSet};
//! use biomesh::config::MeshConfig;
//! use biomesh::pipeline::{molecular_surface, SurfaceStatus};
//! use nalgebra::Point3;
//!
//! let atoms = AtomSet::new(vec![Atom::new(Point3::origin(), 5.0)]).unwrap();
//! let outcome = molecular_surface(&atoms, &[], &MeshConfig::default()).unwrap();
//! assert_eq!(outcome.status, SurfaceStatus::Surface);
//! assert_eq!(outcome.mesh.euler_characteristic(), 2);
//! ```

use tracing::{info, instrument, warn};

use crate::algo::coarsen::{coarsen, CoarsenOptions, CoarsenStatus};
use crate::algo::marching::{marching_cubes, SecondaryField};
use crate::algo::quality::{angle_stats, AngleStats};
use crate::algo::smooth::{smooth, SmoothOptions, SmoothReport};
use crate::atoms::{ActiveSite, AtomSet};
use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::mesh::{MeshStage, SurfaceMesh};
use crate::topology::{assign_active_sites, correct_normals, merge, remove_islands, IslandReport, OrientReport};
use crate::volume::{blobby_density, BlobbyOptions, DensityGrid};
use crate::volumetric::{DelaunayTetrahedralizer, FeMesh, TetInput, TetMesh, Tetrahedralizer};

/// Face marker given to the bounding sphere in [`molecular_volume`].
pub const OUTER_BOUNDARY_MARKER: i32 = 2;

/// Whether extraction produced a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The isosurface has at least one triangle.
    Surface,
    /// The volume never crosses the isovalue.
    Empty,
}

/// Result of the coarsen/smooth loop.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// Coarsening outcome per round actually run.
    pub rounds: Vec<CoarsenStatus>,
    /// Smoothing outcome of the last pass.
    pub smooth: SmoothReport,
    /// Interior angles after the loop, against the smoothing bounds.
    pub angles: AngleStats,
}

/// Everything a surface workflow produces.
#[derive(Debug, Clone)]
pub struct SurfaceOutcome {
    /// The surface, `Improved` unless empty.
    pub mesh: SurfaceMesh,
    /// Whether a surface was found.
    pub status: SurfaceStatus,
    /// Island removal summary.
    pub islands: IslandReport,
    /// Normal correction summary.
    pub orientation: OrientReport,
    /// Vertices tagged with an active-site label.
    pub tagged: usize,
    /// Quality loop summary; `None` for an empty surface.
    pub quality: Option<QualityReport>,
}

/// Tetrahedral and finite-element meshes of a molecule in its bounding sphere.
#[derive(Debug, Clone)]
pub struct VolumeOutcome {
    /// Molecular surface merged with the bounding sphere.
    pub boundary: SurfaceMesh,
    /// Tetrahedralization of the region between them and of the molecule.
    pub tets: TetMesh,
    /// Finite-element projection of `tets`.
    pub fe: FeMesh,
}

/// Mesh the molecular surface of `atoms`.
///
/// Vertices inside an active site are tagged before the quality loop, so
/// with `smooth.hold-marked` they stay in place.
#[instrument(skip_all, name = "surface_workflow", fields(atoms = atoms.len()))]
pub fn molecular_surface(
    atoms: &AtomSet,
    sites: &[ActiveSite],
    config: &MeshConfig,
) -> Result<SurfaceOutcome> {
    config.validate()?;
    let grid = blobby_density(atoms, &BlobbyOptions::from_config(config))?;
    info!(dims = ?grid.dims(), "Density grid built.");
    extract_and_repair(&grid, config.isovalue, sites, config)
}

/// Mesh the isosurface of a precomputed volume, e.g. one read from RAWIV.
#[instrument(skip_all, name = "lattice_workflow", fields(dims = ?grid.dims()))]
pub fn lattice_surface(grid: &DensityGrid, isovalue: f32, config: &MeshConfig) -> Result<SurfaceOutcome> {
    config.validate()?;
    extract_and_repair(grid, isovalue, &[], config)
}

fn extract_and_repair(
    grid: &DensityGrid,
    isovalue: f32,
    sites: &[ActiveSite],
    config: &MeshConfig,
) -> Result<SurfaceOutcome> {
    let mut mesh = marching_cubes(grid, isovalue, SecondaryField::None)?.mesh;
    if mesh.is_empty() {
        warn!(isovalue, "Volume never crosses the isovalue; no surface.");
        return Ok(SurfaceOutcome {
            mesh,
            status: SurfaceStatus::Empty,
            islands: IslandReport::default(),
            orientation: OrientReport::default(),
            tagged: 0,
            quality: None,
        });
    }
    mesh.certify()?;

    let spacing = grid.spacing();
    let voxel_volume = spacing.x * spacing.y * spacing.z;
    let islands = remove_islands(&mut mesh, config.min_volume * voxel_volume)?;
    let orientation = correct_normals(&mut mesh)?;

    let tagged = if sites.is_empty() {
        0
    } else {
        assign_active_sites(&mut mesh, grid, sites)?
    };

    let quality = improve(&mut mesh, config)?;
    Ok(SurfaceOutcome {
        mesh,
        status: SurfaceStatus::Surface,
        islands,
        orientation,
        tagged,
        quality: Some(quality),
    })
}

/// Run `coarsen.rounds` rounds of coarsening each followed by smoothing,
/// then promote the mesh to `Improved`.
///
/// Rounds stop early once coarsening reports the mesh at its floor. With
/// zero rounds the mesh is only smoothed. A `Raw` mesh is certified first.
#[instrument(skip_all, name = "quality_loop", fields(rounds = config.coarsen.rounds))]
pub fn improve(mesh: &mut SurfaceMesh, config: &MeshConfig) -> Result<QualityReport> {
    if mesh.stage() == MeshStage::Raw {
        mesh.certify()?;
    }
    let smooth_options = SmoothOptions::from_config(&config.smooth);
    let coarsen_options = CoarsenOptions::from_config(&config.coarsen);

    let mut rounds = Vec::with_capacity(config.coarsen.rounds);
    let mut last_smooth = SmoothReport::default();
    for _ in 0..config.coarsen.rounds {
        let status = coarsen(mesh, &coarsen_options)?;
        rounds.push(status);
        last_smooth = smooth(mesh, &smooth_options)?;
        if status == CoarsenStatus::AtFloor {
            break;
        }
    }
    if rounds.is_empty() {
        last_smooth = smooth(mesh, &smooth_options)?;
    }
    mesh.promote(MeshStage::Improved)?;

    let angles = angle_stats(mesh, config.smooth.min_angle, config.smooth.max_angle);
    info!(
        vertices = mesh.num_vertices(),
        faces = mesh.num_faces(),
        min_angle = angles.min_angle,
        max_angle = angles.max_angle,
        "Quality loop finished."
    );
    Ok(QualityReport {
        rounds,
        smooth: last_smooth,
        angles,
    })
}

/// Enclose a certified molecular surface in a bounding sphere and mesh the
/// volume with `mesher`.
///
/// The sphere is `SurfaceMesh::sphere(sphere_level)` scaled to
/// `sphere_ratio` times the surface's radius about its centre. Its faces
/// carry [`OUTER_BOUNDARY_MARKER`]; surface faces keep their own markers.
#[instrument(skip_all, name = "volume_workflow", fields(faces = surface.num_faces()))]
pub fn molecular_volume_with(
    surface: &SurfaceMesh,
    config: &MeshConfig,
    mesher: &dyn Tetrahedralizer,
) -> Result<VolumeOutcome> {
    config.validate()?;
    surface.require_certified()?;
    let (center, radius) = surface
        .center_radius()
        .ok_or_else(|| MeshError::invalid_input("cannot mesh the volume of an empty surface"))?;

    let mut sphere = SurfaceMesh::sphere(config.sphere_level);
    sphere.scale_uniform(config.sphere_ratio * radius);
    sphere.translate(center.coords);
    sphere.create_face_markers();
    if let Some(markers) = sphere.face_markers_mut() {
        markers.fill(OUTER_BOUNDARY_MARKER);
    }

    let mut boundary = merge(surface, &sphere);
    boundary.certify()?;
    let tets = mesher.tetrahedralize(TetInput::Surface(&boundary), &config.tet_params)?;
    let fe = FeMesh::from_tet_mesh(&tets, Some(&boundary));
    info!(
        vertices = fe.num_vertices(),
        simplices = fe.num_simplices(),
        "Volume mesh built."
    );
    Ok(VolumeOutcome { boundary, tets, fe })
}

/// [`molecular_volume_with`] using the built-in Delaunay mesher.
pub fn molecular_volume(surface: &SurfaceMesh, config: &MeshConfig) -> Result<VolumeOutcome> {
    molecular_volume_with(surface, config, &DelaunayTetrahedralizer)
}
