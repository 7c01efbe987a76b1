//! # biomesh
//!
//! Mesh generation for biomolecules: from atom coordinates and radii to
//! triangulated molecular surfaces and tetrahedral volume meshes ready for
//! finite-element solvers.
//!
//! ## Features
//!
//! - **Blobby volumes**: Gaussian-like atom kernels rasterized in parallel
//! - **Marching cubes**: crack-free isosurfaces through a six-tetrahedron split
//! - **Topology repair**: island removal, normal correction, welding, active-site markers
//! - **Quality improvement**: angle-gated smoothing, edge-collapse coarsening, refinement
//! - **Volume meshing**: a pluggable [`Tetrahedralizer`](volumetric::Tetrahedralizer)
//!   with a built-in Delaunay backend and MCSF output
//! - **File formats**: PQR, PDB, OFF, RAWIV, MCSF
//!
//! ## Quick Start
//!
//! ```no_run
//! use biomesh::prelude::*;
//!
//! let atoms = biomesh::io::load_atoms("protein.pqr").unwrap();
//! let config = MeshConfig::default();
//!
//! let outcome = molecular_surface(&atoms, &[], &config).unwrap();
//! println!("Faces: {}", outcome.mesh.num_faces());
//! biomesh::io::save_surface(&outcome.mesh, "protein.off").unwrap();
//!
//! let volume = molecular_volume(&outcome.mesh, &config).unwrap();
//! biomesh::io::mcsf::save(&volume.fe, "protein.m").unwrap();
//! ```
//!
//! ## Working With Surfaces
//!
//! Every stage that reads adjacency needs an up-to-date neighbor list, and
//! only certified meshes can be exported:
//!
//! ```
//! use biomesh::prelude::*;
//!
//! let mut mesh = SurfaceMesh::sphere(3);
//! mesh.certify().unwrap();
//!
//! let status = coarsen(&mut mesh, &CoarsenOptions::default()).unwrap();
//! assert_ne!(status, CoarsenStatus::AtFloor);
//! smooth(&mut mesh, &SmoothOptions::default()).unwrap();
//!
//! assert_eq!(mesh.euler_characteristic(), 2);
//! assert!(mesh.require_certified().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod atoms;
pub mod config;
pub mod error;
pub mod io;
pub mod mesh;
pub mod pipeline;
pub mod topology;
pub mod volume;
pub mod volumetric;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use biomesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::coarsen::{coarsen, CoarsenOptions, CoarsenStatus};
    pub use crate::algo::marching::{marching_cubes, SecondaryField};
    pub use crate::algo::smooth::{smooth, SmoothOptions};
    pub use crate::atoms::{ActiveSite, Atom, AtomSet};
    pub use crate::config::MeshConfig;
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{FaceId, MeshStage, SurfaceMesh, TetId, VertexId};
    pub use crate::pipeline::{molecular_surface, molecular_volume, SurfaceStatus};
    pub use crate::volume::{blobby_density, BlobbyOptions, DensityGrid};
    pub use crate::volumetric::{DelaunayTetrahedralizer, FeMesh, TetMesh, Tetrahedralizer};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
