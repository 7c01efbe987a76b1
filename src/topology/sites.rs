//! Active-site tagging by seeded region growing.
//!
//! Each [`ActiveSite`] seeds a front on the voxel lattice of a density
//! grid. Fronts advance in order of distance (a multi-source Dijkstra
//! over the 26-neighborhood with chamfer steps), so every voxel ends up
//! owned by the nearest site that reaches it within its radius. Surface
//! vertices then take the label of the voxel they fall in.

use nalgebra::Point3;
use tracing::info;

use crate::atoms::ActiveSite;
use crate::error::{MeshError, Result};
use crate::mesh::{SurfaceMesh, MARKER_SENTINEL};
use crate::volume::DensityGrid;

/// One frontier voxel popped from a [`DistanceHeap`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapEntry {
    /// Voxel x index.
    pub x: u32,
    /// Voxel y index.
    pub y: u32,
    /// Voxel z index.
    pub z: u32,
    /// Index of the originating site.
    pub seed: u32,
    /// Path distance from the seed.
    pub dist: f32,
}

/// Binary min-heap keyed by distance, stored as parallel arrays.
///
/// Ties are broken by seed index so that the growth order is fixed.
#[derive(Debug, Clone, Default)]
pub struct DistanceHeap {
    x: Vec<u32>,
    y: Vec<u32>,
    z: Vec<u32>,
    seed: Vec<u32>,
    dist: Vec<f32>,
}

impl DistanceHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty heap with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            seed: Vec::with_capacity(capacity),
            dist: Vec::with_capacity(capacity),
        }
    }

    /// Number of queued entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.dist.len()
    }

    /// Whether the heap is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dist.is_empty()
    }

    /// Insert an entry.
    pub fn push(&mut self, entry: HeapEntry) {
        self.x.push(entry.x);
        self.y.push(entry.y);
        self.z.push(entry.z);
        self.seed.push(entry.seed);
        self.dist.push(entry.dist);
        self.sift_up(self.len() - 1);
    }

    /// Remove and return the entry with the smallest distance.
    pub fn pop(&mut self) -> Option<HeapEntry> {
        if self.is_empty() {
            return None;
        }
        let last = self.len() - 1;
        self.swap(0, last);
        let top = HeapEntry {
            x: self.x.pop()?,
            y: self.y.pop()?,
            z: self.z.pop()?,
            seed: self.seed.pop()?,
            dist: self.dist.pop()?,
        };
        if !self.is_empty() {
            self.sift_down(0);
        }
        Some(top)
    }

    /// The entry with the smallest distance.
    pub fn peek(&self) -> Option<HeapEntry> {
        (!self.is_empty()).then(|| self.entry(0))
    }

    fn entry(&self, i: usize) -> HeapEntry {
        HeapEntry {
            x: self.x[i],
            y: self.y[i],
            z: self.z[i],
            seed: self.seed[i],
            dist: self.dist[i],
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.dist[a], self.seed[a]) < (self.dist[b], self.seed[b])
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.x.swap(a, b);
        self.y.swap(a, b);
        self.z.swap(a, b);
        self.seed.swap(a, b);
        self.dist.swap(a, b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < n && self.less(left, smallest) {
                smallest = left;
            }
            if right < n && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

/// Label every voxel of `grid`'s lattice with the site that reaches it
/// first, or the sentinel if none does. Returned in grid sample order.
pub fn partition_sites(grid: &DensityGrid, sites: &[ActiveSite]) -> Result<Vec<i32>> {
    for (i, site) in sites.iter().enumerate() {
        if site.label == MARKER_SENTINEL {
            return Err(MeshError::invalid_input(format!(
                "active site {} uses the reserved label {}",
                i, MARKER_SENTINEL
            )));
        }
        if !(site.radius.is_finite() && site.radius > 0.0)
            || !site.center.iter().all(|c| c.is_finite())
        {
            return Err(MeshError::invalid_input(format!(
                "active site {} has invalid geometry",
                i
            )));
        }
    }

    let [nx, ny, nz] = grid.dims();
    let spacing = grid.spacing();
    let mut best = vec![f32::INFINITY; grid.len()];
    let mut labels = vec![MARKER_SENTINEL; grid.len()];
    let mut heap = DistanceHeap::new();

    for (s, site) in sites.iter().enumerate() {
        let [x, y, z] = nearest_voxel(grid, &site.center);
        let d = (grid.point(x as usize, y as usize, z as usize) - site.center).norm() as f32;
        if d as f64 > site.radius {
            continue;
        }
        let idx = grid.index(x as usize, y as usize, z as usize);
        if d < best[idx] {
            best[idx] = d;
            labels[idx] = site.label;
            heap.push(HeapEntry { x, y, z, seed: s as u32, dist: d });
        }
    }

    while let Some(e) = heap.pop() {
        let idx = grid.index(e.x as usize, e.y as usize, e.z as usize);
        if e.dist > best[idx] {
            continue;
        }
        let site = &sites[e.seed as usize];
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let (x, y, z) = (e.x as i64 + dx, e.y as i64 + dy, e.z as i64 + dz);
                    if x < 0 || y < 0 || z < 0 || x >= nx as i64 || y >= ny as i64 || z >= nz as i64
                    {
                        continue;
                    }
                    let step = ((dx as f64 * spacing.x).powi(2)
                        + (dy as f64 * spacing.y).powi(2)
                        + (dz as f64 * spacing.z).powi(2))
                    .sqrt();
                    let nd = e.dist + step as f32;
                    if nd as f64 > site.radius {
                        continue;
                    }
                    let n = grid.index(x as usize, y as usize, z as usize);
                    if nd < best[n] {
                        best[n] = nd;
                        labels[n] = site.label;
                        heap.push(HeapEntry {
                            x: x as u32,
                            y: y as u32,
                            z: z as u32,
                            seed: e.seed,
                            dist: nd,
                        });
                    }
                }
            }
        }
    }
    Ok(labels)
}

/// Tag surface vertices (and faces whose corners agree) with active-site
/// labels. Creates markers if absent; vertices outside every site keep
/// their current marker.
///
/// Returns the number of vertices tagged.
pub fn assign_active_sites(
    mesh: &mut SurfaceMesh,
    grid: &DensityGrid,
    sites: &[ActiveSite],
) -> Result<usize> {
    let labels = partition_sites(grid, sites)?;
    let vertex_labels: Vec<i32> = mesh
        .vertices()
        .iter()
        .map(|p| {
            let [x, y, z] = nearest_voxel(grid, p);
            labels[grid.index(x as usize, y as usize, z as usize)]
        })
        .collect();

    if mesh.vertex_markers().is_none() {
        mesh.create_vertex_markers();
    }
    if mesh.face_markers().is_none() {
        mesh.create_face_markers();
    }

    let mut tagged = 0;
    if let Some(markers) = mesh.vertex_markers_mut() {
        for (m, &l) in markers.iter_mut().zip(&vertex_labels) {
            if l != MARKER_SENTINEL {
                *m = l;
                tagged += 1;
            }
        }
    }
    let face_labels: Vec<i32> = mesh
        .faces()
        .iter()
        .map(|f| {
            let l = vertex_labels[f[0]];
            if f.iter().all(|&v| vertex_labels[v] == l) {
                l
            } else {
                MARKER_SENTINEL
            }
        })
        .collect();
    if let Some(markers) = mesh.face_markers_mut() {
        for (m, &l) in markers.iter_mut().zip(&face_labels) {
            if l != MARKER_SENTINEL {
                *m = l;
            }
        }
    }

    info!(sites = sites.len(), tagged, "Assigned active sites.");
    Ok(tagged)
}

/// Lattice point closest to `p`, clamped into the grid.
fn nearest_voxel(grid: &DensityGrid, p: &Point3<f64>) -> [u32; 3] {
    let q = grid.to_lattice(p);
    let dims = grid.dims();
    let mut out = [0u32; 3];
    for a in 0..3 {
        out[a] = q[a].round().clamp(0.0, (dims[a] - 1) as f64) as u32;
    }
    out
}
