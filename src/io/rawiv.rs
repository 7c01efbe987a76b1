//! RAWIV volume files.
//!
//! A 68-byte big-endian header followed by `nx * ny * nz` big-endian `f32`
//! samples with `x` varying fastest:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0-11  | min corner, 3 × f32 |
//! | 12-23 | max corner, 3 × f32 |
//! | 24-27 | vertex count, u32 |
//! | 28-31 | cell count, u32 |
//! | 32-43 | dimensions, 3 × u32 |
//! | 44-55 | origin, 3 × f32 |
//! | 56-67 | spacing, 3 × f32 |

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::volume::DensityGrid;

/// Header size in bytes.
pub const HEADER_LEN: usize = 68;

/// Load a volume.
pub fn load<P: AsRef<Path>>(path: P) -> Result<DensityGrid> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let grid = read(BufReader::new(file)).map_err(|e| match e {
        MeshError::InvalidInput(message) => MeshError::load(path, message),
        MeshError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            MeshError::load(path, "file is shorter than its header declares")
        }
        other => other,
    })?;
    debug!(path = %path.display(), dims = ?grid.dims(), "Loaded RAWIV volume.");
    Ok(grid)
}

/// Parse a volume from a byte stream.
pub fn read<R: Read>(mut reader: R) -> Result<DensityGrid> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let f32_at = |offset: usize| {
        f32::from_be_bytes([header[offset], header[offset + 1], header[offset + 2], header[offset + 3]])
    };
    let u32_at = |offset: usize| {
        u32::from_be_bytes([header[offset], header[offset + 1], header[offset + 2], header[offset + 3]])
    };

    let dims = [u32_at(32), u32_at(36), u32_at(40)].map(|d| d as usize);
    let origin = Point3::new(f32_at(44), f32_at(48), f32_at(52)).cast::<f64>();
    let span = Vector3::new(f32_at(56), f32_at(60), f32_at(64)).cast::<f64>();
    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| MeshError::invalid_input(format!("dimensions {:?} overflow", dims)))?;
    if u32_at(24) as usize != count {
        return Err(MeshError::invalid_input(format!(
            "vertex count {} does not match dimensions {:?}",
            u32_at(24),
            dims
        )));
    }

    // The header is untrusted; let the stream bound the allocation.
    let expected = count
        .checked_mul(4)
        .ok_or_else(|| MeshError::invalid_input(format!("dimensions {:?} overflow", dims)))?;
    let mut bytes = Vec::new();
    reader.by_ref().take(expected as u64).read_to_end(&mut bytes)?;
    if bytes.len() != expected {
        return Err(MeshError::invalid_input(format!(
            "sample data truncated: {} of {} bytes",
            bytes.len(),
            expected
        )));
    }
    let data = bytes
        .chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    DensityGrid::new(dims, origin, span, data)
}

/// Save a volume.
pub fn save<P: AsRef<Path>>(grid: &DensityGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(grid, &mut writer)?;
    writer.flush()?;
    debug!(path = %path.display(), dims = ?grid.dims(), "Saved RAWIV volume.");
    Ok(())
}

/// Write a volume to a byte stream.
pub fn write<W: Write>(grid: &DensityGrid, writer: &mut W) -> Result<()> {
    let dims = grid.dims();
    let too_large = || MeshError::invalid_param("dims", format!("{:?}", dims), "exceeds u32 range");
    let vertices = u32::try_from(grid.len()).map_err(|_| too_large())?;
    let cells = u32::try_from(
        dims.iter()
            .map(|&d| d.saturating_sub(1))
            .product::<usize>(),
    )
    .map_err(|_| too_large())?;

    let origin = grid.origin();
    let max = grid.max_corner();
    let spacing = grid.spacing();
    for v in [origin.x, origin.y, origin.z, max.x, max.y, max.z] {
        writer.write_all(&(v as f32).to_be_bytes())?;
    }
    writer.write_all(&vertices.to_be_bytes())?;
    writer.write_all(&cells.to_be_bytes())?;
    for d in dims {
        let d = u32::try_from(d).map_err(|_| too_large())?;
        writer.write_all(&d.to_be_bytes())?;
    }
    for v in [origin.x, origin.y, origin.z, spacing.x, spacing.y, spacing.z] {
        writer.write_all(&(v as f32).to_be_bytes())?;
    }
    for &sample in grid.data() {
        writer.write_all(&sample.to_be_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> DensityGrid {
        DensityGrid::from_fn(
            [3, 4, 5],
            Point3::new(-1.0, 0.5, 2.0),
            Vector3::new(0.5, 0.25, 2.0),
            |p| (p.x + 2.0 * p.y - p.z) as f32,
        )
        .unwrap()
    }

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        write(&ramp(), &mut out).unwrap();
        assert_eq!(out.len(), HEADER_LEN + 60 * 4);
        assert_eq!(&out[24..28], &60u32.to_be_bytes());
        assert_eq!(&out[28..32], &24u32.to_be_bytes());
        assert_eq!(&out[32..36], &3u32.to_be_bytes());
        assert_eq!(&out[12..16], &0.0f32.to_be_bytes());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.rawiv");
        let grid = ramp();
        save(&grid, &path).unwrap();
        assert_eq!(load(&path).unwrap(), grid);
    }

    #[test]
    fn test_truncated() {
        let mut out = Vec::new();
        write(&ramp(), &mut out).unwrap();
        out.truncate(HEADER_LEN + 10);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.rawiv");
        std::fs::write(&path, &out).unwrap();
        assert!(matches!(load(&path), Err(MeshError::LoadError { .. })));
    }

    #[test]
    fn test_oversized_header_is_bounded_by_data() {
        let mut out = Vec::new();
        write(&ramp(), &mut out).unwrap();
        // Claim a 1024^3 lattice (4 GiB of samples) over the same 60 samples.
        let side = 1024u32;
        for offset in [32, 36, 40] {
            out[offset..offset + 4].copy_from_slice(&side.to_be_bytes());
        }
        out[24..28].copy_from_slice(&side.pow(3).to_be_bytes());
        assert!(matches!(read(&out[..]), Err(MeshError::InvalidInput(_))));
    }
}
