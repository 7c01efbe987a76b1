//! OFF (Object File Format) support.
//!
//! ```text
//! OFF
//! nv nf 0
//! x y z          (nv lines)
//! 3 a b c        (nf lines)
//! ```
//!
//! Coordinates are written with the shortest representation that parses
//! back to the same `f64`, so a save/load cycle is bit-exact. Faces with
//! more than three corners are fan-triangulated on load; `#` starts a
//! comment.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::mesh::SurfaceMesh;

/// Load a surface from an OFF file. The mesh comes back `Raw`.
///
/// # Example
///
/// ```no_run
/// use biomesh::io::off;
///
/// let mut mesh = off::load("protein.off").unwrap();
/// mesh.certify().unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<SurfaceMesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mesh = read(BufReader::new(file)).map_err(|e| match e {
        MeshError::InvalidInput(message) => MeshError::load(path, message),
        other => other,
    })?;
    debug!(
        path = %path.display(),
        vertices = mesh.num_vertices(),
        faces = mesh.num_faces(),
        "Loaded OFF surface."
    );
    Ok(mesh)
}

/// Parse OFF text.
pub fn read<R: BufRead>(reader: R) -> Result<SurfaceMesh> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let content = line.split('#').next().unwrap_or("").trim().to_string();
        if !content.is_empty() {
            lines.push(content);
        }
    }
    let mut lines = lines.iter().map(|l| l.split_whitespace().collect::<Vec<_>>());

    let mut header = lines
        .next()
        .ok_or_else(|| MeshError::invalid_input("empty OFF file"))?;
    if header.first() != Some(&"OFF") {
        return Err(MeshError::invalid_input("missing OFF header"));
    }
    header.remove(0);
    let counts = if header.is_empty() {
        lines
            .next()
            .ok_or_else(|| MeshError::invalid_input("missing OFF counts"))?
    } else {
        header
    };
    if counts.len() < 2 {
        return Err(MeshError::invalid_input("OFF counts need vertex and face numbers"));
    }
    let nv: usize = parse(counts[0], "vertex count")?;
    let nf: usize = parse(counts[1], "face count")?;

    let mut vertices = Vec::with_capacity(nv);
    for i in 0..nv {
        let tokens = lines
            .next()
            .ok_or_else(|| MeshError::invalid_input(format!("expected {} vertices, got {}", nv, i)))?;
        if tokens.len() < 3 {
            return Err(MeshError::invalid_input(format!("vertex {} has fewer than 3 coordinates", i)));
        }
        vertices.push(Point3::new(
            parse(tokens[0], "coordinate")?,
            parse(tokens[1], "coordinate")?,
            parse(tokens[2], "coordinate")?,
        ));
    }

    let mut faces = Vec::with_capacity(nf);
    for i in 0..nf {
        let tokens = lines
            .next()
            .ok_or_else(|| MeshError::invalid_input(format!("expected {} faces, got {}", nf, i)))?;
        let n: usize = parse(tokens[0], "face size")?;
        if n < 3 || tokens.len() < n + 1 {
            return Err(MeshError::invalid_input(format!("face {} is malformed", i)));
        }
        let indices = tokens[1..=n]
            .iter()
            .map(|t| parse::<usize>(t, "vertex index"))
            .collect::<Result<Vec<_>>>()?;
        for k in 1..n - 1 {
            faces.push([indices[0], indices[k], indices[k + 1]]);
        }
    }

    SurfaceMesh::from_parts(vertices, faces)
}

fn parse<T: std::str::FromStr>(token: &str, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| MeshError::invalid_input(format!("invalid {} '{}'", what, token)))
}

/// Save a certified surface to an OFF file.
///
/// Fails with [`MeshError::TopologyInconsistent`] for a mesh that was never
/// certified or was mutated since.
pub fn save<P: AsRef<Path>>(mesh: &SurfaceMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    mesh.require_certified()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(mesh, &mut writer)?;
    writer.flush()?;
    debug!(path = %path.display(), faces = mesh.num_faces(), "Saved OFF surface.");
    Ok(())
}

/// Write OFF text. Performs no certification check.
pub fn write<W: Write>(mesh: &SurfaceMesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "OFF")?;
    writeln!(writer, "{} {} 0", mesh.num_vertices(), mesh.num_faces())?;
    for v in mesh.vertices() {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }
    for f in mesh.faces() {
        writeln!(writer, "3 {} {} {}", f[0], f[1], f[2])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.off");

        let mut mesh = SurfaceMesh::sphere(2);
        mesh.translate(nalgebra::Vector3::new(0.1, 1.0 / 3.0, -7.25e-9));
        mesh.certify().unwrap();
        save(&mesh, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.faces(), mesh.faces());
        for (a, b) in loaded.vertices().iter().zip(mesh.vertices()) {
            for k in 0..3 {
                assert_eq!(a[k].to_bits(), b[k].to_bits());
            }
        }
    }

    #[test]
    fn test_uncertified_export_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = SurfaceMesh::sphere(0);
        let result = save(&mesh, dir.path().join("raw.off"));
        assert!(matches!(result, Err(MeshError::TopologyInconsistent(_))));
    }

    #[test]
    fn test_read_polygon_and_comments() {
        let text = "OFF # header\n4 1 0\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n\n4 0 1 2 3\n";
        let mesh = read(text.as_bytes()).unwrap();
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_read_header_with_counts() {
        let text = "OFF 3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        assert_eq!(read(text.as_bytes()).unwrap().num_faces(), 1);
    }

    #[test]
    fn test_bad_index() {
        let text = "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 9\n";
        assert!(matches!(
            read(text.as_bytes()),
            Err(MeshError::InvalidVertexIndex { face: 0, vertex: 9 })
        ));
    }

    #[test]
    fn test_truncated_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.off");
        std::fs::write(&path, "OFF\n3 1 0\n0 0 0\n").unwrap();
        assert!(matches!(load(&path), Err(MeshError::LoadError { .. })));
    }
}
