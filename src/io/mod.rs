//! File I/O.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | OFF | `.off` | ✓ | ✓ | Triangle surfaces, bit-exact coordinates |
//! | MCSF | `.m`, `.mcsf` | ✗ | ✓ | Finite-element tetrahedral meshes |
//! | RAWIV | `.rawiv` | ✓ | ✓ | Big-endian scalar volumes |
//! | PQR | `.pqr` | ✓ | ✗ | Atoms with radii |
//! | PDB | `.pdb`, `.ent` | ✓ | ✗ | Atoms, radii from element symbols |
//!
//! Surfaces are written only once certified; see
//! [`SurfaceMesh::certify`](crate::mesh::SurfaceMesh::certify).
//!
//! # Usage
//!
//! ```no_run
//! use biomesh::io::{load_surface, save_surface};
//!
//! let mut mesh = load_surface("input.off").unwrap();
//! mesh.certify().unwrap();
//! save_surface(&mesh, "output.off").unwrap();
//! ```

pub mod mcsf;
pub mod off;
pub mod pqr;
pub mod rawiv;

use std::path::Path;

use crate::error::{MeshError, Result};
use crate::mesh::SurfaceMesh;

pub use pqr::{load_atoms, load_sites};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Object File Format surface.
    Off,
    /// MCSF finite-element mesh.
    Mcsf,
    /// RAWIV volume.
    Rawiv,
    /// PQR atoms.
    Pqr,
    /// PDB atoms.
    Pdb,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "off" => Some(Format::Off),
            "m" | "mcsf" => Some(Format::Mcsf),
            "rawiv" => Some(Format::Rawiv),
            "pqr" => Some(Format::Pqr),
            "pdb" | "ent" => Some(Format::Pdb),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    /// Whether the format holds atoms.
    pub fn is_structure(self) -> bool {
        matches!(self, Format::Pqr | Format::Pdb)
    }
}

fn unsupported(path: &Path) -> MeshError {
    MeshError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    }
}

/// Detect a format, failing for unknown extensions.
pub fn detect<P: AsRef<Path>>(path: P) -> Result<Format> {
    let path = path.as_ref();
    Format::from_path(path).ok_or_else(|| unsupported(path))
}

/// Load a surface mesh; only OFF holds surfaces.
pub fn load_surface<P: AsRef<Path>>(path: P) -> Result<SurfaceMesh> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Off => off::load(path),
        _ => Err(unsupported(path)),
    }
}

/// Save a certified surface mesh; only OFF holds surfaces.
pub fn save_surface<P: AsRef<Path>>(mesh: &SurfaceMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Off => off::save(mesh, path),
        _ => Err(MeshError::SaveError {
            path: path.to_path_buf(),
            message: "surfaces can only be saved as OFF".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(Format::from_path("a/b/MOL.PQR"), Some(Format::Pqr));
        assert_eq!(Format::from_path("mesh.m"), Some(Format::Mcsf));
        assert_eq!(Format::from_path("noext"), None);
        assert!(matches!(
            detect("mesh.stl"),
            Err(MeshError::UnsupportedFormat { extension }) if extension == "stl"
        ));
    }

    #[test]
    fn test_surface_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut mesh = SurfaceMesh::sphere(1);
        mesh.certify().unwrap();
        let path = dir.path().join("s.off");
        save_surface(&mesh, &path).unwrap();
        assert_eq!(load_surface(&path).unwrap().num_faces(), mesh.num_faces());
        assert!(matches!(
            save_surface(&mesh, dir.path().join("s.rawiv")),
            Err(MeshError::SaveError { .. })
        ));
    }
}
