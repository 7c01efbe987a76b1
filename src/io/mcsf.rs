//! MCSF finite-element mesh output.
//!
//! The file lists a header with the manifold dimensions and element counts,
//! one `id chart x y z` record per vertex and one
//! `id grp mat fa fb fc fd v0 v1 v2 v3` record per simplex:
//!
//! ```text
//! mcsf_begin=1;
//!
//!       dim=3;
//!     dimii=3;
//!  vertices=4;
//! simplices=1;
//!
//! vert=[
//! 0 0 0 0 0
//! ...
//! ];
//!
//! simp=[
//! 0 0 1 1 1 1 1 0 1 2 3
//! ];
//!
//! mcsf_end=1;
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::volumetric::FeMesh;

/// Save a finite-element mesh.
pub fn save<P: AsRef<Path>>(mesh: &FeMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(mesh, &mut writer)?;
    writer.flush()?;
    debug!(
        path = %path.display(),
        vertices = mesh.num_vertices(),
        simplices = mesh.num_simplices(),
        "Saved MCSF mesh."
    );
    Ok(())
}

/// Write MCSF text.
pub fn write<W: Write>(mesh: &FeMesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "mcsf_begin=1;")?;
    writeln!(writer)?;
    writeln!(writer, "      dim={};", mesh.dim)?;
    writeln!(writer, "    dimii={};", mesh.dimii)?;
    writeln!(writer, " vertices={};", mesh.num_vertices())?;
    writeln!(writer, "simplices={};", mesh.num_simplices())?;
    writeln!(writer)?;

    writeln!(writer, "vert=[")?;
    for v in &mesh.vertices {
        writeln!(
            writer,
            "{} {} {} {} {}",
            v.id, v.chart, v.position.x, v.position.y, v.position.z
        )?;
    }
    writeln!(writer, "];")?;
    writeln!(writer)?;

    writeln!(writer, "simp=[")?;
    for s in &mesh.simplices {
        let [fa, fb, fc, fd] = s.face_types;
        let [v0, v1, v2, v3] = s.vertices;
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {} {} {}",
            s.id, s.group, s.material, fa, fb, fc, fd, v0, v1, v2, v3
        )?;
    }
    writeln!(writer, "];")?;
    writeln!(writer)?;
    writeln!(writer, "mcsf_end=1;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volumetric::TetMesh;
    use nalgebra::Point3;

    fn unit_tet() -> FeMesh {
        let tet = TetMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2, 3]],
            vec![1],
        )
        .unwrap();
        FeMesh::from_tet_mesh(&tet, None)
    }

    #[test]
    fn test_layout() {
        let mut out = Vec::new();
        write(&unit_tet(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "mcsf_begin=1;");
        assert!(text.contains("      dim=3;\n    dimii=3;\n vertices=4;\nsimplices=1;\n"));
        assert!(text.contains("vert=[\n0 0 0 0 0\n1 0 1 0 0\n"));
        assert!(text.contains("simp=[\n0 0 1 1 1 1 1 0 1 2 3\n];"));
        assert_eq!(lines.last(), Some(&"mcsf_end=1;"));
    }

    #[test]
    fn test_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tet.m");
        save(&unit_tet(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("mcsf_begin=1;"));
    }
}
