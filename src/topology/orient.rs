//! Consistent, outward face orientation.

use std::collections::VecDeque;

use tracing::info;

use crate::error::Result;
use crate::mesh::{signed_volume_of, FaceId, MeshStage, SurfaceMesh};

/// Outcome of [`correct_normals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientReport {
    /// Components visited.
    pub components: usize,
    /// Faces whose winding was reversed.
    pub flipped_faces: usize,
    /// Components turned inside out to face outward.
    pub inverted_components: usize,
}

/// Make winding consistent within each component, then turn every
/// component with negative signed volume inside out.
///
/// Each component is seeded at its lowest-numbered face and oriented by
/// breadth-first search: a neighbor is flipped when it traverses the
/// shared edge in the same direction as the face it was reached from.
/// Requires an up-to-date neighbor list. A certified mesh stays certified.
pub fn correct_normals(mesh: &mut SurfaceMesh) -> Result<OrientReport> {
    let neighbors = mesh.neighbors()?;
    let faces = mesh.faces();
    let n = faces.len();
    let mut flip = vec![false; n];
    let mut component = vec![usize::MAX; n];
    let mut count = 0;
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if component[seed] != usize::MAX {
            continue;
        }
        component[seed] = count;
        queue.push_back(seed);
        while let Some(f) = queue.pop_front() {
            let adj = neighbors.face_neighbors(FaceId::new(f));
            for i in 0..3 {
                let Some(g) = adj[i].get() else { continue };
                if component[g] != usize::MAX {
                    continue;
                }
                let (mut a, mut b) = (faces[f][i], faces[f][(i + 1) % 3]);
                if flip[f] {
                    std::mem::swap(&mut a, &mut b);
                }
                // `g` must traverse the edge as b -> a.
                flip[g] = has_directed_edge(&faces[g], a, b);
                component[g] = count;
                queue.push_back(g);
            }
        }
        count += 1;
    }

    let mut oriented: Vec<Vec<[usize; 3]>> = vec![Vec::new(); count];
    for f in 0..n {
        let mut face = faces[f];
        if flip[f] {
            face.swap(1, 2);
        }
        oriented[component[f]].push(face);
    }
    let inverted: Vec<bool> = oriented
        .iter()
        .map(|fs| signed_volume_of(mesh.vertices(), fs.iter()) < 0.0)
        .collect();
    for f in 0..n {
        if inverted[component[f]] {
            flip[f] = !flip[f];
        }
    }

    let flipped_faces = flip.iter().filter(|&&x| x).count();
    let report = OrientReport {
        components: count,
        flipped_faces,
        inverted_components: inverted.iter().filter(|&&x| x).count(),
    };
    if flipped_faces > 0 {
        let stage = mesh.stage();
        for (face, &x) in mesh.faces_mut().iter_mut().zip(&flip) {
            if x {
                face.swap(1, 2);
            }
        }
        if stage == MeshStage::Raw {
            mesh.rebuild_neighbors()?;
        } else {
            mesh.recertify(stage)?;
        }
    }
    info!(
        components = report.components,
        flipped = report.flipped_faces,
        "Corrected face orientation."
    );
    Ok(report)
}

fn has_directed_edge(face: &[usize; 3], a: usize, b: usize) -> bool {
    (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b)
}
