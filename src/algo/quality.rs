//! Triangle quality diagnostics.

use crate::mesh::SurfaceMesh;

/// Interior-angle statistics of a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleStats {
    /// Smallest interior angle, in degrees.
    pub min_angle: f64,
    /// Largest interior angle, in degrees.
    pub max_angle: f64,
    /// Triangles with an angle below the lower bound.
    pub below: usize,
    /// Triangles with an angle above the upper bound.
    pub above: usize,
}

impl AngleStats {
    /// Whether no triangle violates either bound.
    pub fn within_bounds(&self) -> bool {
        self.below == 0 && self.above == 0
    }
}

/// Scan every triangle and count those with an angle below `lower` or
/// above `upper` (degrees). An empty mesh reports `min = 180`, `max = 0`.
pub fn angle_stats(mesh: &SurfaceMesh, lower: f64, upper: f64) -> AngleStats {
    let mut stats = AngleStats {
        min_angle: 180.0,
        max_angle: 0.0,
        below: 0,
        above: 0,
    };
    for f in 0..mesh.num_faces() {
        let angles = mesh.face_angles(f);
        let lo = angles.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = angles.iter().copied().fold(0.0, f64::max);
        stats.min_angle = stats.min_angle.min(lo);
        stats.max_angle = stats.max_angle.max(hi);
        if lo < lower {
            stats.below += 1;
        }
        if hi > upper {
            stats.above += 1;
        }
    }
    stats
}

/// Smallest triangle area, or `None` for an empty mesh.
pub fn min_face_area(mesh: &SurfaceMesh) -> Option<f64> {
    (0..mesh.num_faces())
        .map(|f| mesh.face_area(f))
        .fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.min(a))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_equilateral() {
        let h = 3f64.sqrt() / 2.0;
        let mesh = SurfaceMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, h, 0.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let stats = angle_stats(&mesh, 30.0, 120.0);
        assert!((stats.min_angle - 60.0).abs() < 1e-9);
        assert!((stats.max_angle - 60.0).abs() < 1e-9);
        assert!(stats.within_bounds());
    }

    #[test]
    fn test_counts_violations() {
        let mesh = SurfaceMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(5.0, 0.1, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 1, 3]],
        )
        .unwrap();
        let stats = angle_stats(&mesh, 15.0, 150.0);
        assert_eq!(stats.below, 2);
        assert_eq!(stats.above, 1);
        assert!(stats.max_angle > 170.0);
    }

    #[test]
    fn test_empty_mesh() {
        let stats = angle_stats(&SurfaceMesh::new(), 15.0, 150.0);
        assert_eq!(stats.below, 0);
        assert_eq!(min_face_area(&SurfaceMesh::new()), None);
    }
}
