//! Molecular structure input.
//!
//! - PQR: `ATOM`/`HETATM` records, whitespace tokenised; the last five
//!   fields are `x y z charge radius`.
//! - PDB: fixed columns 31-54 hold the coordinates; the radius comes from
//!   the element symbol (columns 77-78, or the atom name when blank).
//! - Active sites: a count line, then `x y z radius label` per site.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::atoms::{element_radius, ActiveSite, Atom, AtomSet};
use crate::error::{MeshError, Result};
use crate::mesh::MARKER_SENTINEL;

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn is_atom_record(line: &str) -> bool {
    matches!(slice_and_trim(line, 0, 6), "ATOM" | "HETATM")
}

fn parse_float(token: &str, line: usize, what: &str) -> Result<f64> {
    token.parse().map_err(|_| {
        MeshError::invalid_input(format!("line {}: invalid {} '{}'", line, what, token))
    })
}

/// Parse PQR records.
pub fn read_pqr<R: BufRead>(reader: R) -> Result<AtomSet> {
    let mut atoms = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_num = index + 1;
        if !is_atom_record(&line) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(MeshError::invalid_input(format!(
                "line {}: PQR record has {} fields",
                line_num,
                tokens.len()
            )));
        }
        let tail = &tokens[tokens.len() - 5..];
        let x = parse_float(tail[0], line_num, "x")?;
        let y = parse_float(tail[1], line_num, "y")?;
        let z = parse_float(tail[2], line_num, "z")?;
        let radius = parse_float(tail[4], line_num, "radius")?;
        atoms.push(Atom::new(Point3::new(x, y, z), radius));
    }
    AtomSet::new(atoms)
}

/// Parse PDB records.
pub fn read_pdb<R: BufRead>(reader: R) -> Result<AtomSet> {
    let mut atoms = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_num = index + 1;
        if !is_atom_record(&line) {
            continue;
        }
        if line.len() < 54 {
            return Err(MeshError::invalid_input(format!(
                "line {}: PDB record is too short for coordinates",
                line_num
            )));
        }
        let x = parse_float(slice_and_trim(&line, 30, 38), line_num, "x")?;
        let y = parse_float(slice_and_trim(&line, 38, 46), line_num, "y")?;
        let z = parse_float(slice_and_trim(&line, 46, 54), line_num, "z")?;
        let element = match slice_and_trim(&line, 76, 78) {
            "" => slice_and_trim(&line, 12, 16)
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .get(..1)
                .unwrap_or(""),
            symbol => symbol,
        };
        atoms.push(Atom::new(Point3::new(x, y, z), element_radius(element)));
    }
    AtomSet::new(atoms)
}

/// Load atoms, choosing PQR or PDB parsing by extension.
pub fn load_atoms<P: AsRef<Path>>(path: P) -> Result<AtomSet> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let reader = BufReader::new(File::open(path)?);
    let atoms = match ext.as_str() {
        "pqr" => read_pqr(reader),
        "pdb" | "ent" => read_pdb(reader),
        _ => return Err(MeshError::UnsupportedFormat { extension: ext }),
    }
    .map_err(|e| match e {
        MeshError::InvalidInput(message) => MeshError::load(path, message),
        other => other,
    })?;
    if atoms.is_empty() {
        warn!(path = %path.display(), "Structure file holds no atoms.");
    }
    debug!(path = %path.display(), atoms = atoms.len(), "Loaded atoms.");
    Ok(atoms)
}

/// Parse an active-site list.
pub fn read_sites<R: BufRead>(reader: R) -> Result<Vec<ActiveSite>> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| MeshError::invalid_input("empty active-site file"))??;
    let count: usize = header
        .trim()
        .parse()
        .map_err(|_| MeshError::invalid_input(format!("invalid site count '{}'", header.trim())))?;

    let mut sites = Vec::with_capacity(count);
    for line in lines {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let line_num = sites.len() + 2;
        if tokens.len() < 5 {
            return Err(MeshError::invalid_input(format!(
                "line {}: expected 'x y z radius label'",
                line_num
            )));
        }
        let center = Point3::new(
            parse_float(tokens[0], line_num, "x")?,
            parse_float(tokens[1], line_num, "y")?,
            parse_float(tokens[2], line_num, "z")?,
        );
        let radius = parse_float(tokens[3], line_num, "radius")?;
        let label: i32 = tokens[4].parse().map_err(|_| {
            MeshError::invalid_input(format!("line {}: invalid label '{}'", line_num, tokens[4]))
        })?;
        if label == MARKER_SENTINEL {
            return Err(MeshError::invalid_input(format!(
                "line {}: label {} is reserved",
                line_num, MARKER_SENTINEL
            )));
        }
        sites.push(ActiveSite {
            center,
            radius,
            label,
        });
        if sites.len() == count {
            break;
        }
    }
    if sites.len() != count {
        return Err(MeshError::invalid_input(format!(
            "expected {} sites, found {}",
            count,
            sites.len()
        )));
    }
    Ok(sites)
}

/// Load an active-site file.
pub fn load_sites<P: AsRef<Path>>(path: P) -> Result<Vec<ActiveSite>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read_sites(BufReader::new(file)).map_err(|e| match e {
        MeshError::InvalidInput(message) => MeshError::load(path, message),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PQR: &str = "\
REMARK generated
ATOM      1  N   MET A   1      -1.000   2.500   0.125 -0.3000 1.8240
ATOM      2  CA  MET     1       0.000   0.000   0.000  0.2100 1.9080
HETATM    3  O   HOH     2  10.0 11.0 12.0 -0.8 1.52
TER
";

    const PDB: &str = "\
ATOM      1  N   MET A   1      11.104   6.134  -6.504  1.00  0.00           N
ATOM      2  CA  MET A   1      11.639   6.071  -5.147  1.00  0.00
HETATM    3 FE   HEM A   2       0.000   0.000   0.000  1.00  0.00          FE
";

    #[test]
    fn test_pqr_tail_fields() {
        let atoms = read_pqr(PQR.as_bytes()).unwrap();
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms.atoms()[0].position, Point3::new(-1.0, 2.5, 0.125));
        assert_eq!(atoms.atoms()[0].radius, 1.824);
        assert_eq!(atoms.atoms()[2].radius, 1.52);
    }

    #[test]
    fn test_pdb_columns_and_radii() {
        let atoms = read_pdb(PDB.as_bytes()).unwrap();
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms.atoms()[0].position, Point3::new(11.104, 6.134, -6.504));
        assert_eq!(atoms.atoms()[0].radius, 1.55);
        // No element column: taken from the atom name.
        assert_eq!(atoms.atoms()[1].radius, 1.70);
        assert_eq!(atoms.atoms()[2].radius, 1.94);
    }

    #[test]
    fn test_bad_radius() {
        let text = "ATOM      1  N   MET A   1  1.0 2.0 3.0 0.0 -1.0\n";
        assert!(matches!(read_pqr(text.as_bytes()), Err(MeshError::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atoms.xyz");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_atoms(&path), Err(MeshError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_load_pqr_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mol.PQR");
        std::fs::write(&path, PQR).unwrap();
        assert_eq!(load_atoms(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_sites() {
        let text = "2\n0 0 0 1.5 3\n\n1 2 3 0.5 -4\n";
        let sites = read_sites(text.as_bytes()).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[1].center, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(sites[1].label, -4);
    }

    #[test]
    fn test_sites_count_mismatch_and_sentinel() {
        assert!(read_sites("3\n0 0 0 1 1\n".as_bytes()).is_err());
        assert!(read_sites("1\n0 0 0 1 0\n".as_bytes()).is_err());
    }
}
