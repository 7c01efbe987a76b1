//! Density volumes.
//!
//! A [`DensityGrid`] is a regular lattice of `f32` samples. The blobby
//! builder rasterizes an [`AtomSet`] into one: every atom contributes
//!
//! ```text
//! isovalue * exp(blobbiness * (d² / r² - 1))
//! ```
//!
//! at distance `d` from its centre, so an isolated atom's isosurface at
//! `isovalue` is exactly its own sphere. Contributions smaller than
//! `1e-3 * isovalue` are dropped.
//!
//! # Example
//!
//! ```
//! use biomesh::atoms::{Atom, AtomSet};
//! use biomesh::volume::{blobby_density, BlobbyOptions};
//! use nalgebra::Point3;
//!
//! let atoms = AtomSet::new(vec![Atom::new(Point3::origin(), 2.0)]).unwrap();
//! let grid = blobby_density(&atoms, &BlobbyOptions::default()).unwrap();
//! assert!(grid.dims().iter().all(|&d| d > 2));
//! ```

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::atoms::AtomSet;
use crate::config::{MeshConfig, BLOBBINESS, DIM_SCALE, ISO_VALUE};
use crate::error::{MeshError, Result};

/// Relative kernel value below which an atom's contribution is dropped.
const KERNEL_CUTOFF: f64 = 1e-3;

/// A 3-D lattice of scalar samples with its placement in world space.
///
/// Sample `(i, j, k)` sits at `origin + (i, j, k) ⊙ spacing` and is stored
/// at linear index `k * nx * ny + j * nx + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    dims: [usize; 3],
    origin: Point3<f64>,
    spacing: Vector3<f64>,
    data: Vec<f32>,
}

impl DensityGrid {
    /// Wrap existing samples.
    pub fn new(
        dims: [usize; 3],
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        data: Vec<f32>,
    ) -> Result<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(MeshError::invalid_input(format!(
                "grid dimensions must be positive, got {:?}",
                dims
            )));
        }
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(MeshError::invalid_input(format!(
                "grid spacing must be positive, got {:?}",
                spacing.as_slice()
            )));
        }
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(MeshError::invalid_input(format!(
                "grid of {:?} needs {} samples, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            dims,
            origin,
            spacing,
            data,
        })
    }

    /// A grid filled with zeros.
    pub fn zeros(dims: [usize; 3], origin: Point3<f64>, spacing: Vector3<f64>) -> Result<Self> {
        Self::new(dims, origin, spacing, vec![0.0; dims[0] * dims[1] * dims[2]])
    }

    /// Sample a function at every lattice point.
    pub fn from_fn<F>(
        dims: [usize; 3],
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        f: F,
    ) -> Result<Self>
    where
        F: Fn(Point3<f64>) -> f32,
    {
        let mut grid = Self::zeros(dims, origin, spacing)?;
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let p = grid.point(i, j, k);
                    let idx = grid.index(i, j, k);
                    grid.data[idx] = f(p);
                }
            }
        }
        Ok(grid)
    }

    /// Samples per axis.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// World position of sample `(0, 0, 0)`.
    #[inline]
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Distance between samples along each axis.
    #[inline]
    pub fn spacing(&self) -> Vector3<f64> {
        self.spacing
    }

    /// Samples in linear order.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable samples in linear order.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Total number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the grid holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of sample `(i, j, k)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.dims[0] * self.dims[1] + j * self.dims[0] + i
    }

    /// Sample at `(i, j, k)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.index(i, j, k)]
    }

    /// Overwrite the sample at `(i, j, k)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f32) {
        let idx = self.index(i, j, k);
        self.data[idx] = value;
    }

    /// World position of sample `(i, j, k)`.
    #[inline]
    pub fn point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.to_world(&Point3::new(i as f64, j as f64, k as f64))
    }

    /// Map a point in lattice coordinates to world space.
    #[inline]
    pub fn to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        self.origin + p.coords.component_mul(&self.spacing)
    }

    /// Map a world-space point to (fractional) lattice coordinates.
    #[inline]
    pub fn to_lattice(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p - self.origin).component_div(&self.spacing))
    }

    /// World-space corner opposite the origin.
    pub fn max_corner(&self) -> Point3<f64> {
        self.point(self.dims[0] - 1, self.dims[1] - 1, self.dims[2] - 1)
    }

    /// Smallest and largest sample.
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// Options for [`blobby_density`].
#[derive(Debug, Clone)]
pub struct BlobbyOptions {
    /// Samples per unit length.
    pub resolution: f64,
    /// Scale factor of the atoms' extended bounding box (at least 1).
    pub padding_ratio: f64,
    /// Kernel amplitude; the surface of an isolated atom sits at this value.
    pub isovalue: f32,
    /// Kernel decay (negative).
    pub blobbiness: f32,
}

impl Default for BlobbyOptions {
    fn default() -> Self {
        Self {
            resolution: DIM_SCALE,
            padding_ratio: 1.5,
            isovalue: ISO_VALUE,
            blobbiness: BLOBBINESS,
        }
    }
}

impl BlobbyOptions {
    /// Options matching a pipeline configuration.
    pub fn from_config(config: &MeshConfig) -> Self {
        Self {
            resolution: config.dim_scale,
            padding_ratio: config.padding_ratio,
            isovalue: config.isovalue,
            blobbiness: config.blobbiness,
        }
    }

    /// Set the samples per unit length.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the bounding-box scale factor.
    pub fn with_padding_ratio(mut self, ratio: f64) -> Self {
        self.padding_ratio = ratio;
        self
    }

    /// Set the kernel amplitude.
    pub fn with_isovalue(mut self, isovalue: f32) -> Self {
        self.isovalue = isovalue;
        self
    }

    /// Set the kernel decay.
    pub fn with_blobbiness(mut self, blobbiness: f32) -> Self {
        self.blobbiness = blobbiness;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(MeshError::invalid_input(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.padding_ratio.is_finite() && self.padding_ratio >= 1.0) {
            return Err(MeshError::invalid_param(
                "padding_ratio",
                self.padding_ratio,
                "must be at least 1.0",
            ));
        }
        if !(self.blobbiness < 0.0) {
            return Err(MeshError::invalid_param(
                "blobbiness",
                self.blobbiness,
                "must be negative",
            ));
        }
        if !(self.isovalue.is_finite() && self.isovalue > 0.0) {
            return Err(MeshError::invalid_param(
                "isovalue",
                self.isovalue,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Rasterize atoms into a blobby density grid.
///
/// The lattice covers the bounding box of all radius-extended atoms,
/// scaled about its centre by `padding_ratio`, with
/// `ceil(extent * resolution) + 1` samples per axis. Z-slabs are filled in
/// parallel; within a slab atoms are accumulated in input order, so the
/// result does not depend on the thread count.
pub fn blobby_density(atoms: &AtomSet, options: &BlobbyOptions) -> Result<DensityGrid> {
    options.validate()?;
    let (min, max) = atoms
        .bounds()
        .ok_or_else(|| MeshError::invalid_input("atom set is empty"))?;

    let center = nalgebra::center(&min, &max);
    let half = (max - min) * (0.5 * options.padding_ratio);
    let origin = center - half;
    let h = 1.0 / options.resolution;
    let mut dims = [0usize; 3];
    for a in 0..3 {
        dims[a] = (2.0 * half[a] * options.resolution).ceil() as usize + 1;
    }
    let spacing = Vector3::new(h, h, h);
    debug!(?dims, origin = ?origin, spacing = h, "Allocating density grid.");

    let iso = options.isovalue as f64;
    let b = options.blobbiness as f64;
    // d²/r² beyond which the kernel is below the cutoff.
    let reach2 = 1.0 + KERNEL_CUTOFF.ln() / b;

    let (nx, ny, nz) = (dims[0], dims[1], dims[2]);
    let mut data = vec![0.0f32; nx * ny * nz];
    let lattice_range = |lo: f64, hi: f64, o: f64, n: usize| -> Option<(usize, usize)> {
        let first = ((lo - o) / h).ceil().max(0.0);
        let last = ((hi - o) / h).floor().min((n - 1) as f64);
        (first <= last).then(|| (first as usize, last as usize))
    };

    data.par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            let z = origin.z + k as f64 * h;
            for atom in atoms {
                let r2 = atom.radius * atom.radius;
                let cutoff2 = r2 * reach2;
                let dz = z - atom.position.z;
                let rem = cutoff2 - dz * dz;
                if rem <= 0.0 {
                    continue;
                }
                let reach = rem.sqrt();
                let Some((j0, j1)) = lattice_range(
                    atom.position.y - reach,
                    atom.position.y + reach,
                    origin.y,
                    ny,
                ) else {
                    continue;
                };
                let Some((i0, i1)) = lattice_range(
                    atom.position.x - reach,
                    atom.position.x + reach,
                    origin.x,
                    nx,
                ) else {
                    continue;
                };
                for j in j0..=j1 {
                    let dy = origin.y + j as f64 * h - atom.position.y;
                    for i in i0..=i1 {
                        let dx = origin.x + i as f64 * h - atom.position.x;
                        let d2 = dx * dx + dy * dy + dz * dz;
                        if d2 > cutoff2 {
                            continue;
                        }
                        slab[j * nx + i] += (iso * (b * (d2 / r2 - 1.0)).exp()) as f32;
                    }
                }
            }
        });

    info!(
        atoms = atoms.len(),
        dims = ?dims,
        "Built blobby density grid."
    );
    DensityGrid::new(dims, origin, spacing, data)
}
