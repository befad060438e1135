//! Parent/child/sibling navigation as index arithmetic.
//!
//! The refinement hierarchy is never stored as edges. A block at
//! `(i, j, k)` on level `ℓ` has the parent `(i/2, j/2, k/2)` on `ℓ - 1` and
//! the children `(2i + a, 2j + b, 2k + c)` on `ℓ + 1`, where the octant
//! `o = a + 2b + 4c` fixes the child order.

use crate::geometry::lattice::{AXES, Lattice};
use crate::topology::block_key::{BlockKey, Indices, NOT_FOUND};
use std::iter;

/// Number of children of a refined block (`2^AXES`).
pub const CHILDREN: usize = 1 << AXES;

/// Number of face-adjacent neighbours of a block.
pub const FACES: usize = 2 * AXES;

/// Face directions in neighbour order: `-x, +x, -y, +y, -z, +z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face {
    /// Axis normal to the face.
    pub axis: usize,
    /// Whether the face points toward increasing index.
    pub positive: bool,
}

impl Face {
    /// All faces in neighbour order.
    pub fn all() -> impl Iterator<Item = Face> {
        (0..FACES).map(|f| Face {
            axis: f / 2,
            positive: f % 2 == 1,
        })
    }
}

fn valid_indices(lattice: &Lattice, key: BlockKey) -> Option<Indices> {
    lattice
        .contains_key(key)
        .then(|| lattice.indices(key.level, key.id))
}

/// Returns the parent of `key`, or `None` on level 0 or for an invalid key.
pub fn parent(lattice: &Lattice, key: BlockKey) -> Option<BlockKey> {
    if key.level == 0 {
        return None;
    }
    let indices = valid_indices(lattice, key)?;
    let level = key.level - 1;
    let id = lattice.block_id(level, indices.map(|i| i / 2));
    (id != NOT_FOUND).then_some(BlockKey::new(level, id))
}

/// Position of `key` within its sibling group.
pub fn octant(lattice: &Lattice, key: BlockKey) -> Option<usize> {
    if key.level == 0 {
        return None;
    }
    let indices = valid_indices(lattice, key)?;
    Some(
        indices
            .iter()
            .enumerate()
            .map(|(axis, i)| ((i & 1) as usize) << axis)
            .sum(),
    )
}

/// Returns the `2^AXES` children of `key` in octant order.
///
/// `None` for an invalid key or when the next level is not representable.
pub fn children(lattice: &Lattice, key: BlockKey) -> Option<[BlockKey; CHILDREN]> {
    let indices = valid_indices(lattice, key)?;
    let level = key.level.checked_add(1)?;
    lattice.len_at(level)?;
    let mut out = [BlockKey::new(level, NOT_FOUND); CHILDREN];
    for (octant, child) in out.iter_mut().enumerate() {
        let mut fine = [0u64; AXES];
        for axis in 0..AXES {
            let bit = ((octant >> axis) & 1) as u64;
            fine[axis] = indices[axis] * 2 + bit;
        }
        child.id = lattice.block_id(level, fine);
    }
    Some(out)
}

/// Returns the full sibling group of `key` (including `key` itself).
pub fn siblings(lattice: &Lattice, key: BlockKey) -> Option<[BlockKey; CHILDREN]> {
    children(lattice, parent(lattice, key)?)
}

/// Iterator over the strict ancestors of `key`, finest first.
pub fn ancestors(lattice: &Lattice, key: BlockKey) -> impl Iterator<Item = BlockKey> + '_ {
    iter::successors(parent(lattice, key), move |k| parent(lattice, *k))
}

/// The level-0 block containing `key` (`key` itself on level 0).
pub fn root_ancestor(lattice: &Lattice, key: BlockKey) -> Option<BlockKey> {
    if key.level == 0 {
        return lattice.contains_key(key).then_some(key);
    }
    ancestors(lattice, key).last()
}

/// Same-level neighbour across `face`, or `None` at the domain boundary.
pub fn face_neighbor(lattice: &Lattice, key: BlockKey, face: Face) -> Option<BlockKey> {
    let mut indices = valid_indices(lattice, key)?;
    let axis = face.axis;
    indices[axis] = if face.positive {
        indices[axis].checked_add(1)?
    } else {
        indices[axis].checked_sub(1)?
    };
    let id = lattice.block_id(key.level, indices);
    (id != NOT_FOUND).then_some(BlockKey::new(key.level, id))
}

/// All same-level face neighbours of `key` in [`Face::all`] order.
pub fn face_neighbors(lattice: &Lattice, key: BlockKey) -> [Option<BlockKey>; FACES] {
    let mut out = [None; FACES];
    for (slot, face) in out.iter_mut().zip(Face::all()) {
        *slot = face_neighbor(lattice, key, face);
    }
    out
}
