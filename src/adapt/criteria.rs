//! Per-block error proxies driving refinement.
//!
//! Both criteria read the primary component only, after clamping it to the
//! optional maximum admissible magnitude.

use crate::mesh::block::{Scalar, primary};
use crate::mesh::store::SparseBlockMesh;
use crate::topology::block_key::BlockKey;
use crate::topology::hierarchy::{self, FACES, Face};

/// Clamp `value` to `[-cap, cap]` when a cap is configured.
#[inline]
pub fn clamp_to_cap(value: f64, cap: Option<f64>) -> f64 {
    match cap {
        Some(cap) => value.max(-cap).min(cap),
        None => value,
    }
}

/// Whether `value` exceeds the configured cap in magnitude.
#[inline]
pub fn exceeds_cap(value: f64, cap: Option<f64>) -> bool {
    cap.is_some_and(|cap| value.abs() > cap)
}

/// Magnitude of the block's primary value; 0 for a block that is not stored.
pub fn maximum_value<T: Scalar, const W: usize>(
    mesh: &SparseBlockMesh<T, W>,
    key: BlockKey,
    cap: Option<f64>,
) -> f64 {
    mesh.data(key)
        .map_or(0.0, |d| clamp_to_cap(primary(d).as_f64(), cap).abs())
}

/// Largest absolute difference between the block's primary value and that
/// of each face neighbour.
///
/// Neighbours are resolved with [`SparseBlockMesh::covering`], so a coarser
/// leaf stands in for a missing same-level neighbour. Missing neighbours
/// and the outside of the domain count as vacuum (0).
pub fn maximum_gradient<T: Scalar, const W: usize>(
    mesh: &SparseBlockMesh<T, W>,
    key: BlockKey,
    cap: Option<f64>,
) -> f64 {
    let center = clamp_to_cap(mesh.data(key).map_or(0.0, |d| primary(d).as_f64()), cap);
    face_values(mesh, key)
        .iter()
        .map(|n| (center - clamp_to_cap(primary(n).as_f64(), cap)).abs())
        .fold(0.0, f64::max)
}

/// Payloads across each face of `key` in [`Face::all`] order; zero where
/// the neighbour region is vacuum.
pub(crate) fn face_values<T: Scalar, const W: usize>(
    mesh: &SparseBlockMesh<T, W>,
    key: BlockKey,
) -> [[T; W]; FACES] {
    let mut out = [[T::zero(); W]; FACES];
    for (slot, face) in out.iter_mut().zip(Face::all()) {
        let data = hierarchy::face_neighbor(mesh.lattice(), key, face)
            .and_then(|nb| mesh.covering(nb))
            .and_then(|cov| mesh.data(cov));
        if let Some(data) = data {
            *slot = *data;
        }
    }
    out
}
