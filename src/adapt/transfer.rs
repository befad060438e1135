//! Data transfer between a parent block and its children.
//!
//! Refinement fills the children through a caller-chosen [`Prolongation`]
//! strategy. Unrefinement collapses a sibling group with a fixed
//! [`Aggregation`] rule, which defines what quantity the mesh conserves.
//!
//! | Payload | Prolongation | Aggregation | Conserved |
//! |---|---|---|---|
//! | density | [`CopyProlongation`], [`LinearProlongation`] | [`Aggregation::Mean`] | `Σ f·V` |
//! | per-block total | [`SplitProlongation`] | [`Aggregation::Sum`] | `Σ f` |
//!
//! Densities are per unit velocity volume `V`.
//!
//! Each pair is an exact inverse: refining and immediately unrefining gives
//! back the parent payload (up to rounding for the linear slopes).

use crate::adapt::criteria::face_values;
use crate::geometry::lattice::AXES;
use crate::mesh::block::Scalar;
use crate::mesh::store::SparseBlockMesh;
use crate::topology::block_key::BlockKey;
use crate::topology::hierarchy::CHILDREN;

/// Strategy producing a child payload from its parent.
pub trait Prolongation<T, const W: usize> {
    /// Payload of the child in `octant` (see [`crate::topology::hierarchy`])
    /// of `parent`, whose payload is `data`. The mesh is in its
    /// pre-refinement state for this parent.
    fn prolong(
        &self,
        mesh: &SparseBlockMesh<T, W>,
        parent: BlockKey,
        data: &[T; W],
        octant: usize,
    ) -> [T; W];
}

/// Every child receives a copy of the parent payload.
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyProlongation;

impl<T: Scalar, const W: usize> Prolongation<T, W> for CopyProlongation {
    #[inline]
    fn prolong(&self, _: &SparseBlockMesh<T, W>, _: BlockKey, data: &[T; W], _: usize) -> [T; W] {
        *data
    }
}

/// Every child receives `1 / 2^3` of the parent payload.
#[derive(Copy, Clone, Debug, Default)]
pub struct SplitProlongation;

impl<T: Scalar, const W: usize> Prolongation<T, W> for SplitProlongation {
    #[inline]
    fn prolong(&self, _: &SparseBlockMesh<T, W>, _: BlockKey, data: &[T; W], _: usize) -> [T; W] {
        let share = child_fraction::<T>();
        data.map(|v| v * share)
    }
}

/// Piecewise-linear reconstruction with minmod-limited slopes.
///
/// Slopes come from the face neighbours (vacuum where none is stored). The
/// limiter keeps children non-negative for non-negative data, and the
/// symmetric offsets make the children's mean equal to the parent.
#[derive(Copy, Clone, Debug, Default)]
pub struct LinearProlongation;

impl<T: Scalar, const W: usize> Prolongation<T, W> for LinearProlongation {
    fn prolong(
        &self,
        mesh: &SparseBlockMesh<T, W>,
        parent: BlockKey,
        data: &[T; W],
        octant: usize,
    ) -> [T; W] {
        let neighbors = face_values(mesh, parent);
        // child centers sit a quarter of the parent width from its center
        let quarter = half::<T>() * half::<T>();
        let mut out = *data;
        for axis in 0..AXES {
            let low = &neighbors[2 * axis];
            let high = &neighbors[2 * axis + 1];
            let sign = if (octant >> axis) & 1 == 1 {
                T::one()
            } else {
                -T::one()
            };
            for c in 0..W {
                let slope = minmod(data[c] - low[c], high[c] - data[c]);
                out[c] = out[c] + sign * quarter * slope;
            }
        }
        out
    }
}

/// Wrap a closure as a [`Prolongation`].
#[derive(Copy, Clone, Debug)]
pub struct ProlongWith<F>(pub F);

impl<T, const W: usize, F> Prolongation<T, W> for ProlongWith<F>
where
    F: Fn(&SparseBlockMesh<T, W>, BlockKey, &[T; W], usize) -> [T; W],
{
    #[inline]
    fn prolong(
        &self,
        mesh: &SparseBlockMesh<T, W>,
        parent: BlockKey,
        data: &[T; W],
        octant: usize,
    ) -> [T; W] {
        (self.0)(mesh, parent, data, octant)
    }
}

/// Rule combining a complete sibling group into the parent payload.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Aggregation {
    /// Arithmetic mean of the children (payloads are densities).
    #[default]
    Mean,
    /// Sum of the children (payloads are per-block totals).
    Sum,
}

impl Aggregation {
    /// Combine the payloads of a full sibling group, in octant order.
    ///
    /// Sums pairwise, so eight identical payloads aggregate exactly.
    pub fn aggregate<T: Scalar, const W: usize>(&self, children: &[[T; W]; CHILDREN]) -> [T; W] {
        let mut partial = *children;
        let mut width = CHILDREN;
        while width > 1 {
            width /= 2;
            for i in 0..width {
                for c in 0..W {
                    partial[i][c] = partial[2 * i][c] + partial[2 * i + 1][c];
                }
            }
        }
        let acc = partial[0];
        match self {
            Aggregation::Sum => acc,
            Aggregation::Mean => {
                let share = child_fraction::<T>();
                acc.map(|v| v * share)
            }
        }
    }
}

#[inline]
fn half<T: Scalar>() -> T {
    T::one() / (T::one() + T::one())
}

/// `1 / 2^AXES`, the volume fraction of one child.
#[inline]
fn child_fraction<T: Scalar>() -> T {
    half::<T>().powi(AXES as i32)
}

#[inline]
fn minmod<T: Scalar>(a: T, b: T) -> T {
    if a * b <= T::zero() {
        T::zero()
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}
