//! Volumetric meshing.
//!
//! A [`Tetrahedralizer`] turns a point cloud or a closed surface into a
//! [`TetMesh`]. The crate ships [`DelaunayTetrahedralizer`]; other
//! backends plug in through the same trait. [`FeMesh`] projects a
//! tetrahedral mesh into the record layout finite-element solvers read.
//!
//! # Example
//!
//! ```
//! use biomesh::mesh::SurfaceMesh;
//! use biomesh::volumetric::{DelaunayTetrahedralizer, FeMesh, TetInput, Tetrahedralizer};
//!
//! let mut surface = SurfaceMesh::sphere(1);
//! surface.certify().unwrap();
//!
//! let tets = DelaunayTetrahedralizer
//!     .tetrahedralize(TetInput::Surface(&surface), "q3.0")
//!     .unwrap();
//! let fe = FeMesh::from_tet_mesh(&tets, Some(&surface));
//! assert_eq!(fe.num_simplices(), tets.num_tets());
//! ```

mod delaunay;
mod fe;
mod tet_mesh;

pub use delaunay::DelaunayTetrahedralizer;
pub use fe::{FeMesh, FeSimplex, FeVertex, DEFAULT_BOUNDARY_FACE, INTERIOR_FACE};
pub use tet_mesh::TetMesh;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::SurfaceMesh;

/// What to tetrahedralize.
#[derive(Debug, Clone, Copy)]
pub enum TetInput<'a> {
    /// A point cloud; the convex hull is filled.
    Points(&'a [Point3<f64>]),
    /// A closed surface, possibly several nested shells; only the inside
    /// is kept and regions follow the nesting.
    Surface(&'a SurfaceMesh),
}

/// A tetrahedral mesh generator.
pub trait Tetrahedralizer {
    /// Tetrahedralize `input`. `params` is a flag string such as `"q2.0a5"`.
    ///
    /// Failures of the backend, including rejected flags, are reported as
    /// [`MeshError::ExternalMesherFailure`].
    fn tetrahedralize(&self, input: TetInput<'_>, params: &str) -> Result<TetMesh>;
}

/// Parsed tetrahedralization flags.
///
/// - `q<ratio>`: drop tetrahedra whose radius-edge ratio exceeds `ratio`
///   (2.0 when no value is given)
/// - `a<volume>`: drop tetrahedra larger than `volume`
///
/// Whitespace between flags is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TetParams {
    /// Largest radius-edge ratio kept.
    pub max_radius_edge: Option<f64>,
    /// Largest volume kept.
    pub max_volume: Option<f64>,
}

impl TetParams {
    /// Parse a flag string.
    pub fn parse(params: &str) -> Result<Self> {
        let fail = |msg: String| MeshError::ExternalMesherFailure(msg);
        let mut out = Self::default();
        let mut chars = params.chars().peekable();
        while let Some(flag) = chars.next() {
            if flag.is_whitespace() {
                continue;
            }
            let mut number = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    number.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = if number.is_empty() {
                None
            } else {
                Some(
                    number
                        .parse::<f64>()
                        .map_err(|_| fail(format!("bad value '{}' for flag '{}'", number, flag)))?,
                )
            };
            match flag {
                'q' => out.max_radius_edge = Some(value.unwrap_or(2.0)),
                'a' => {
                    out.max_volume =
                        Some(value.ok_or_else(|| fail("flag 'a' needs a volume".to_string()))?)
                }
                other => return Err(fail(format!("unknown flag '{}'", other))),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        assert_eq!(TetParams::parse("").unwrap(), TetParams::default());
        let p = TetParams::parse("q1.5 a0.25").unwrap();
        assert_eq!(p.max_radius_edge, Some(1.5));
        assert_eq!(p.max_volume, Some(0.25));
        assert_eq!(TetParams::parse("q").unwrap().max_radius_edge, Some(2.0));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["x", "a", "q1..2", "q2Y"] {
            assert!(
                matches!(TetParams::parse(bad), Err(MeshError::ExternalMesherFailure(_))),
                "{bad}"
            );
        }
    }
}
