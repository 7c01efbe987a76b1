//! Mesh generation and improvement algorithms.
//!
//! - **Extraction**: marching cubes over a density grid ([`marching`])
//! - **Smoothing**: Laplacian and normal-based relaxation ([`smooth`])
//! - **Coarsening**: shortest-first edge collapse ([`coarsen`])
//! - **Refinement**: uniform 1 → 4 split ([`refine`])
//! - **Quality**: angle diagnostics ([`quality`])

pub mod coarsen;
pub mod marching;
pub mod quality;
pub mod refine;
pub mod smooth;
