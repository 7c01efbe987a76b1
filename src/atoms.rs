//! Atoms and active sites.
//!
//! An [`AtomSet`] is the input of the volume builder. Atoms are immutable
//! once loaded; construction validates every coordinate and radius so that
//! later stages can assume finite, positive data.

use nalgebra::Point3;

use crate::error::{MeshError, Result};

/// A single atom: centre and van der Waals radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    /// Centre.
    pub position: Point3<f64>,
    /// Radius; always positive in a validated set.
    pub radius: f64,
}

impl Atom {
    /// Create an atom.
    pub fn new(position: Point3<f64>, radius: f64) -> Self {
        Self { position, radius }
    }
}

/// An ordered, validated collection of atoms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomSet {
    atoms: Vec<Atom>,
}

impl AtomSet {
    /// Validate and wrap a list of atoms.
    ///
    /// Fails with [`MeshError::InvalidInput`] on a non-finite coordinate or
    /// a radius that is not strictly positive. An empty list is accepted
    /// here; the volume builder rejects it.
    pub fn new(atoms: Vec<Atom>) -> Result<Self> {
        for (i, atom) in atoms.iter().enumerate() {
            if !atom.position.iter().all(|c| c.is_finite()) {
                return Err(MeshError::invalid_input(format!(
                    "atom {} has a non-finite coordinate",
                    i
                )));
            }
            if !(atom.radius.is_finite() && atom.radius > 0.0) {
                return Err(MeshError::invalid_input(format!(
                    "atom {} has invalid radius {}",
                    i, atom.radius
                )));
            }
        }
        Ok(Self { atoms })
    }

    /// Number of atoms.
    #[inline]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the set holds no atoms.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// All atoms in input order.
    #[inline]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Iterate over the atoms.
    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    /// Bounding box of the radius-extended spheres.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.atoms.first()?;
        let mut min = first.position;
        let mut max = first.position;
        for atom in &self.atoms {
            for i in 0..3 {
                min[i] = min[i].min(atom.position[i] - atom.radius);
                max[i] = max[i].max(atom.position[i] + atom.radius);
            }
        }
        Some((min, max))
    }

    /// Centre of the extended bounding box and the radius of the smallest
    /// sphere about it that contains every atom sphere.
    pub fn center_radius(&self) -> Option<(Point3<f64>, f64)> {
        let (min, max) = self.bounds()?;
        let center = nalgebra::center(&min, &max);
        let radius = self
            .atoms
            .iter()
            .map(|a| (a.position - center).norm() + a.radius)
            .fold(0.0, f64::max);
        Some((center, radius))
    }
}

impl<'a> IntoIterator for &'a AtomSet {
    type Item = &'a Atom;
    type IntoIter = std::slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}

/// A labelled spherical region used to tag surface vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSite {
    /// Site center.
    pub center: Point3<f64>,
    /// Site radius.
    pub radius: f64,
    /// Marker written to vertices inside the site. Never the sentinel `0`.
    pub label: i32,
}

/// Van der Waals radius by element symbol, used when a structure file
/// carries no radius column. Unknown elements get 1.5.
pub fn element_radius(symbol: &str) -> f64 {
    match symbol.trim().to_ascii_uppercase().as_str() {
        "H" => 1.20,
        "C" => 1.70,
        "N" => 1.55,
        "O" => 1.52,
        "F" => 1.47,
        "P" => 1.80,
        "S" => 1.80,
        "CL" => 1.75,
        "NA" => 2.27,
        "MG" => 1.73,
        "K" => 2.75,
        "CA" => 2.31,
        "FE" => 1.94,
        "ZN" => 1.39,
        "SE" => 1.90,
        _ => 1.50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_radius() {
        let atoms = vec![Atom::new(Point3::origin(), 0.0)];
        assert!(matches!(AtomSet::new(atoms), Err(MeshError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_nan() {
        let atoms = vec![Atom::new(Point3::new(f64::NAN, 0.0, 0.0), 1.0)];
        assert!(AtomSet::new(atoms).is_err());
    }

    #[test]
    fn test_bounds_include_radius() {
        let set = AtomSet::new(vec![
            Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0),
            Atom::new(Point3::new(4.0, 0.0, 0.0), 2.0),
        ])
        .unwrap();
        let (min, max) = set.bounds().unwrap();
        assert_eq!(min, Point3::new(-1.0, -2.0, -2.0));
        assert_eq!(max, Point3::new(6.0, 2.0, 2.0));
        let (center, radius) = set.center_radius().unwrap();
        assert_eq!(center, Point3::new(2.5, 0.0, 0.0));
        assert!((radius - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_element_radius() {
        assert_eq!(element_radius("c"), 1.70);
        assert_eq!(element_radius(" O"), 1.52);
        assert_eq!(element_radius("Xx"), 1.50);
    }
}
