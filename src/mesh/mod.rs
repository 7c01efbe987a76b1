//! Core mesh data structures.
//!
//! # Overview
//!
//! [`SurfaceMesh`] is the triangulated surface that flows through the
//! pipeline: positions and triangles in face-vertex form, optional
//! per-vertex and per-face `i32` markers, and an optional
//! [`NeighborList`] holding vertex/triangle adjacency.
//!
//! Tetrahedral meshes live in [`crate::volumetric`].
//!
//! # Index Types
//!
//! Adjacency records use type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`FaceId`] - Identifies a triangle
//! - [`TetId`] - Identifies a tetrahedron
//!
//! Each has an invalid sentinel for neighbors across an open boundary.
//!
//! # Construction
//!
//! ```
//! use biomesh::mesh::{SurfaceMesh, VertexId};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mut mesh = SurfaceMesh::from_parts(vertices, faces).unwrap();
//! mesh.build_neighbors().unwrap();
//! assert_eq!(mesh.neighbors().unwrap().valence(VertexId::new(0)), 1);
//! ```

mod index;
mod neighbors;
mod surface;

pub use index::{FaceId, TetId, VertexId};
pub use neighbors::{Corner, NeighborList};
pub use surface::{MeshStage, SurfaceMesh, MARKER_SENTINEL};

pub(crate) use surface::{signed_volume_of, triangle_angles, validate_faces};
