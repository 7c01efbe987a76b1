//! Connected components and island removal.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::error::{MeshError, Result};
use crate::mesh::{signed_volume_of, FaceId, SurfaceMesh};

/// Outcome of [`remove_islands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IslandReport {
    /// Components found before removal.
    pub components: usize,
    /// Components removed.
    pub removed: usize,
    /// Components kept.
    pub kept: usize,
    /// Faces removed.
    pub removed_faces: usize,
}

/// Label every face with its component, by breadth-first search over
/// face adjacency. Returns the labels and the component count.
///
/// Requires an up-to-date neighbor list.
pub fn components(mesh: &SurfaceMesh) -> Result<(Vec<usize>, usize)> {
    let neighbors = mesh.neighbors()?;
    let mut label = vec![usize::MAX; mesh.num_faces()];
    let mut count = 0;
    let mut queue = VecDeque::new();
    for seed in 0..mesh.num_faces() {
        if label[seed] != usize::MAX {
            continue;
        }
        label[seed] = count;
        queue.push_back(seed);
        while let Some(f) = queue.pop_front() {
            for g in neighbors.face_neighbors(FaceId::new(f)) {
                if let Some(g) = g.get() {
                    if label[g] == usize::MAX {
                        label[g] = count;
                        queue.push_back(g);
                    }
                }
            }
        }
        count += 1;
    }
    Ok((label, count))
}

/// Remove components whose enclosed volume is below `min_volume`.
///
/// Volumes come from the divergence theorem and are compared by absolute
/// value. The component with the largest volume is always kept, so a
/// non-empty mesh never becomes empty. The mesh is recertified afterwards.
pub fn remove_islands(mesh: &mut SurfaceMesh, min_volume: f64) -> Result<IslandReport> {
    if !(min_volume.is_finite() && min_volume >= 0.0) {
        return Err(MeshError::invalid_param(
            "min_volume",
            min_volume,
            "must be non-negative",
        ));
    }
    let (label, count) = components(mesh)?;
    if count == 0 {
        return Ok(IslandReport::default());
    }

    let mut members: Vec<Vec<[usize; 3]>> = vec![Vec::new(); count];
    for (f, &c) in label.iter().enumerate() {
        members[c].push(mesh.faces()[f]);
    }
    let volumes: Vec<f64> = members
        .iter()
        .map(|faces| signed_volume_of(mesh.vertices(), faces.iter()).abs())
        .collect();
    let largest = volumes
        .iter()
        .enumerate()
        .fold(0, |best, (c, &v)| if v > volumes[best] { c } else { best });

    let keep_component: Vec<bool> = volumes
        .iter()
        .enumerate()
        .map(|(c, &v)| c == largest || v >= min_volume)
        .collect();
    for (c, v) in volumes.iter().enumerate() {
        debug!(component = c, volume = v, kept = keep_component[c], "Island.");
    }

    let keep: Vec<bool> = label.iter().map(|&c| keep_component[c]).collect();
    let removed = keep_component.iter().filter(|&&k| !k).count();
    let removed_faces = keep.iter().filter(|&&k| !k).count();
    if removed > 0 {
        super::retain_faces(mesh, &keep);
    }
    mesh.certify()?;

    info!(
        components = count,
        removed,
        removed_faces,
        "Removed islands."
    );
    Ok(IslandReport {
        components: count,
        removed,
        kept: count - removed,
        removed_faces,
    })
}
