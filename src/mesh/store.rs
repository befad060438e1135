//! SparseBlockMesh: sparse `(level, id) → payload` storage over a lattice.
//!
//! The mesh keeps only non-negligible blocks. An identifier absent from
//! storage is implicitly empty for geometric queries ([`sample`]), but
//! [`get`] on it is an error so callers never read stale zeros where
//! presence matters.
//!
//! Leaf/interior status is derived, not stored: a block is interior when at
//! least one of its children is stored. Replaying [`set`] for every
//! enumerated block therefore reproduces the hierarchy too.
//!
//! [`get`]: SparseBlockMesh::get
//! [`set`]: SparseBlockMesh::set
//! [`sample`]: SparseBlockMesh::sample

use crate::debug_invariants::DebugInvariants;
use crate::geometry::lattice::{AXES, Lattice};
use crate::mesh::block::{Block, Scalar, primary};
use crate::mesh_error::VMeshError;
use crate::topology::block_key::{BlockKey, CellId, Indices, Level, NOT_FOUND};
use crate::topology::hierarchy::{self, CHILDREN};
use hashbrown::{HashMap, HashSet};
use itertools::{Itertools, iproduct};

/// Clipping threshold of a freshly constructed mesh.
pub const DEFAULT_THRESHOLD: f64 = 1.0e-2;

/// Sparse, hierarchical block store.
///
/// # Invariants
///
/// - `n_blocks == blocks.len() == order.len() - tombstones`.
/// - Each live key appears exactly once in `order`, at the position its
///   slot records, and `order` lists exactly the keys of `blocks`.
///
/// These are checked after every mutating batch in debug builds and when the
/// `check-invariants` feature is enabled.
#[derive(Clone, Debug)]
pub struct SparseBlockMesh<T = f64, const W: usize = 4> {
    lattice: Lattice,
    blocks: HashMap<BlockKey, Slot<T, W>>,
    /// Insertion order, for deterministic enumeration. Removed keys leave a
    /// `None` until the next compaction.
    order: Vec<Option<BlockKey>>,
    tombstones: usize,
    n_blocks: usize,
    threshold: f64,
}

/// Stored payload plus its position in the insertion order.
#[derive(Clone, Copy, Debug)]
struct Slot<T, const W: usize> {
    data: [T; W],
    pos: usize,
}

/// Velocity-space mesh: one density plus three auxiliary components.
pub type VelocityMesh = SparseBlockMesh<f64, 4>;

/// Mesh carrying only the density.
pub type ScalarMesh = SparseBlockMesh<f64, 1>;

impl<T: Scalar, const W: usize> Default for SparseBlockMesh<T, W> {
    fn default() -> Self {
        Self::with_lattice(Lattice::default())
    }
}

impl<T: Scalar, const W: usize> SparseBlockMesh<T, W> {
    /// Empty mesh without geometry; call [`fill`](Self::fill) next.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty mesh over an existing lattice.
    ///
    /// This is the starting point for replaying `set` calls exported from a
    /// mesh with identical geometry.
    pub fn with_lattice(lattice: Lattice) -> Self {
        Self {
            lattice,
            blocks: HashMap::new(),
            order: Vec::new(),
            tombstones: 0,
            n_blocks: 0,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    // ---------------------------------------------------------------------
    // Geometry and bookkeeping
    // ---------------------------------------------------------------------

    /// Populate a dense level-0 lattice, one zero block per cell.
    ///
    /// Cells are created in index order (x fastest). Existing blocks are
    /// neither cleared nor moved: level-0 blocks with colliding identifiers
    /// are overwritten in place. Returns the number of level-0 cells.
    ///
    /// # Errors
    /// `DegenerateGeometry` (see [`Lattice::try_new`]), also when the cell
    /// count cannot be allocated; the mesh is left untouched in that case.
    pub fn fill(
        &mut self,
        mins: [f64; AXES],
        maxs: [f64; AXES],
        pitch: [f64; AXES],
    ) -> Result<usize, VMeshError> {
        let lattice = Lattice::try_new(mins, maxs, pitch)?;
        let [nx, ny, nz] = lattice.n_cells();
        let too_large = || VMeshError::DegenerateGeometry {
            axis: AXES - 1,
            reason: format!("{nx}x{ny}x{nz} cells do not fit in memory"),
        };
        let total = usize::try_from(nx * ny * nz).map_err(|_| too_large())?;
        self.blocks.try_reserve(total).map_err(|_| too_large())?;
        self.order.try_reserve(total).map_err(|_| too_large())?;
        self.lattice = lattice;
        let mut created = 0usize;
        for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
            let id = self.lattice.block_id(0, [i, j, k]);
            self.upsert(BlockKey::root(id), [T::zero(); W]);
            created += 1;
        }
        log::debug!(
            "filled {nx}x{ny}x{nz} lattice, {} blocks stored",
            self.n_blocks
        );
        crate::debug_invariants!(
            self.validate_invariants(),
            "SparseBlockMesh invalid after fill"
        );
        Ok(created)
    }

    /// Drop every block, keeping geometry and threshold.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.order.clear();
        self.tombstones = 0;
        self.n_blocks = 0;
    }

    /// Geometry of the mesh.
    #[inline]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Level-0 cell counts per axis.
    #[inline]
    pub fn n_cells(&self) -> Indices {
        self.lattice.n_cells()
    }

    /// Number of stored blocks (leaves and interior nodes).
    #[inline]
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.n_blocks, self.blocks.len());
        self.n_blocks
    }

    /// Whether no block is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_blocks == 0
    }

    /// Clipping threshold used by [`clip_to_threshold`](Self::clip_to_threshold).
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Set the clipping threshold.
    #[inline]
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    // ---------------------------------------------------------------------
    // Index math
    // ---------------------------------------------------------------------

    /// Level-0 identifier of `indices`, or [`NOT_FOUND`] out of range.
    #[inline]
    pub fn get_block_id(&self, indices: Indices) -> CellId {
        self.lattice.block_id(0, indices)
    }

    /// Identifier of `indices` on `level`, or [`NOT_FOUND`] out of range.
    #[inline]
    pub fn get_block_id_at(&self, level: Level, indices: Indices) -> CellId {
        self.lattice.block_id(level, indices)
    }

    /// Level-0 indices of `id`; the invalid-index triple for [`NOT_FOUND`].
    #[inline]
    pub fn get_indices(&self, id: CellId) -> Indices {
        self.lattice.indices(0, id)
    }

    /// Indices of `id` on `level`.
    #[inline]
    pub fn get_indices_at(&self, level: Level, id: CellId) -> Indices {
        self.lattice.indices(level, id)
    }

    /// Physical center of a block, or `None` if the key is not addressable.
    pub fn get_center(&self, key: impl Into<BlockKey>) -> Option<[f64; AXES]> {
        let key = key.into();
        self.lattice
            .contains_key(key)
            .then(|| self.lattice.center(key.level, self.lattice.indices(key.level, key.id)))
    }

    /// Physical size of a block: the pitch scaled by `2^-level`.
    pub fn get_extent(&self, key: impl Into<BlockKey>) -> Option<[f64; AXES]> {
        let key = key.into();
        self.lattice
            .contains_key(key)
            .then(|| self.lattice.extent(key.level))
    }

    /// Identifier of the `level` cell containing `position`.
    #[inline]
    pub fn locate(&self, level: Level, position: [f64; AXES]) -> CellId {
        self.lattice.locate(level, position)
    }

    // ---------------------------------------------------------------------
    // Point access
    // ---------------------------------------------------------------------

    /// Whether a block is stored under `key`.
    #[inline]
    pub fn contains(&self, key: impl Into<BlockKey>) -> bool {
        self.blocks.contains_key(&key.into())
    }

    /// Copy of the block stored under `key`.
    ///
    /// # Errors
    /// `NotFound` if nothing is stored there.
    pub fn get(&self, key: impl Into<BlockKey>) -> Result<Block<T, W>, VMeshError> {
        let key = key.into();
        self.blocks
            .get(&key)
            .map(|slot| Block::new(slot.data, key.level))
            .ok_or(VMeshError::NotFound(key))
    }

    /// Borrow the payload stored under `key`.
    #[inline]
    pub fn data(&self, key: impl Into<BlockKey>) -> Option<&[T; W]> {
        self.blocks.get(&key.into()).map(|slot| &slot.data)
    }

    /// Mutably borrow the payload stored under `key`.
    #[inline]
    pub fn data_mut(&mut self, key: impl Into<BlockKey>) -> Option<&mut [T; W]> {
        self.blocks.get_mut(&key.into()).map(|slot| &mut slot.data)
    }

    /// Insert or overwrite the payload under `key`; returns the previous one.
    ///
    /// # Errors
    /// `InvalidBlockId` if `key` does not address a lattice cell.
    pub fn set(
        &mut self,
        key: impl Into<BlockKey>,
        data: [T; W],
    ) -> Result<Option<[T; W]>, VMeshError> {
        let key = key.into();
        if !self.lattice.contains_key(key) {
            return Err(VMeshError::InvalidBlockId(key));
        }
        Ok(self.upsert(key, data))
    }

    /// Remove the block under `key`, returning its payload.
    pub fn remove(&mut self, key: impl Into<BlockKey>) -> Option<[T; W]> {
        let data = self.take(key.into())?;
        self.compact_if_sparse();
        Some(data)
    }

    pub(crate) fn upsert(&mut self, key: BlockKey, data: [T; W]) -> Option<[T; W]> {
        if let Some(slot) = self.blocks.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.data, data));
        }
        let pos = self.order.len();
        self.order.push(Some(key));
        self.blocks.insert(key, Slot { data, pos });
        self.n_blocks += 1;
        None
    }

    /// Remove a batch of keys; compaction runs at most once.
    pub(crate) fn remove_many(&mut self, keys: impl IntoIterator<Item = BlockKey>) -> usize {
        let removed = keys.into_iter().filter(|k| self.take(*k).is_some()).count();
        self.compact_if_sparse();
        crate::debug_invariants!(
            self.validate_invariants(),
            "SparseBlockMesh invalid after removal"
        );
        removed
    }

    /// Unlink `key`, leaving a tombstone in the insertion order.
    fn take(&mut self, key: BlockKey) -> Option<[T; W]> {
        let slot = self.blocks.remove(&key)?;
        self.order[slot.pos] = None;
        self.tombstones += 1;
        self.n_blocks -= 1;
        Some(slot.data)
    }

    /// Drop tombstones once they make up half of the order vector, so
    /// removal stays amortized O(1).
    fn compact_if_sparse(&mut self) {
        if self.tombstones == 0 || self.tombstones * 2 < self.order.len() {
            return;
        }
        self.order.retain(Option::is_some);
        for (pos, key) in self.order.iter().enumerate() {
            let Some(key) = key else {
                continue;
            };
            if let Some(slot) = self.blocks.get_mut(key) {
                slot.pos = pos;
            }
        }
        self.tombstones = 0;
    }

    fn live_keys(&self) -> impl Iterator<Item = BlockKey> + '_ {
        self.order.iter().flatten().copied()
    }

    // ---------------------------------------------------------------------
    // Enumeration
    // ---------------------------------------------------------------------

    /// Snapshot of every stored key.
    ///
    /// Insertion order unless `sorted`, in which case keys ascend by level,
    /// then identifier. The returned vector does not borrow the mesh.
    pub fn enumerate_ids(&self, sorted: bool) -> Vec<BlockKey> {
        if sorted {
            self.live_keys().sorted_unstable().collect()
        } else {
            self.live_keys().collect()
        }
    }

    /// Snapshot of the stored leaves, ordered like
    /// [`enumerate_ids`](Self::enumerate_ids).
    pub fn enumerate_leaves(&self, sorted: bool) -> Vec<BlockKey> {
        let mut leaves: Vec<_> = self
            .live_keys()
            .filter(|k| !self.has_stored_children(*k))
            .collect();
        if sorted {
            leaves.sort_unstable();
        }
        leaves
    }

    /// Borrowing iterator over `(key, payload)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockKey, &[T; W])> + '_ {
        self.live_keys().map(move |k| (k, &self.blocks[&k].data))
    }

    // ---------------------------------------------------------------------
    // Hierarchy
    // ---------------------------------------------------------------------

    /// Whether `key` is stored and none of its children are.
    pub fn is_leaf(&self, key: impl Into<BlockKey>) -> bool {
        let key = key.into();
        self.blocks.contains_key(&key) && !self.has_stored_children(key)
    }

    fn has_stored_children(&self, key: BlockKey) -> bool {
        hierarchy::children(&self.lattice, key)
            .is_some_and(|kids| kids.iter().any(|c| self.blocks.contains_key(c)))
    }

    /// Number of stored children of `key`.
    pub fn stored_children(&self, key: impl Into<BlockKey>) -> usize {
        hierarchy::children(&self.lattice, key.into())
            .map_or(0, |kids| kids.iter().filter(|c| self.blocks.contains_key(*c)).count())
    }

    /// Parent key of `key` (whether stored or not).
    #[inline]
    pub fn parent(&self, key: impl Into<BlockKey>) -> Option<BlockKey> {
        hierarchy::parent(&self.lattice, key.into())
    }

    /// Level-0 ancestor of `key`.
    #[inline]
    pub fn root_parent(&self, key: impl Into<BlockKey>) -> Option<BlockKey> {
        hierarchy::root_ancestor(&self.lattice, key.into())
    }

    /// The `2^3` child keys of `key` (whether stored or not).
    #[inline]
    pub fn children(&self, key: impl Into<BlockKey>) -> Option<[BlockKey; CHILDREN]> {
        hierarchy::children(&self.lattice, key.into())
    }

    /// The sibling group of `key`, including `key`.
    #[inline]
    pub fn siblings(&self, key: impl Into<BlockKey>) -> Option<[BlockKey; CHILDREN]> {
        hierarchy::siblings(&self.lattice, key.into())
    }

    /// Finest level holding a stored block (0 for an empty mesh).
    pub fn top_refinement_level(&self) -> Level {
        self.live_keys().map(|k| k.level).max().unwrap_or(0)
    }

    /// Deepest level whose identifiers fit in a `u64`.
    #[inline]
    pub fn maximum_possible_refinement_level(&self) -> Level {
        self.lattice.max_level()
    }

    /// The block under `key`, or else under its nearest stored ancestor.
    pub fn get_from_roots(&self, key: impl Into<BlockKey>) -> Option<Block<T, W>> {
        let key = key.into();
        iter_self_and_ancestors(&self.lattice, key)
            .find_map(|k| self.blocks.get(&k).map(|slot| Block::new(slot.data, k.level)))
    }

    /// The stored block whose value represents the region of `key`.
    ///
    /// That is `key` itself when stored, else its nearest stored ancestor if
    /// that ancestor is a leaf. `None` means the region is vacuum: either no
    /// ancestor is stored, or the nearest one is refined and the child
    /// covering `key` has been removed.
    pub fn covering(&self, key: BlockKey) -> Option<BlockKey> {
        if self.blocks.contains_key(&key) {
            return Some(key);
        }
        let ancestor = hierarchy::ancestors(&self.lattice, key)
            .find(|k| self.blocks.contains_key(k))?;
        self.is_leaf(ancestor).then_some(ancestor)
    }

    /// Payload of the finest stored leaf containing `position`; zero where no
    /// leaf covers it or outside the lattice.
    pub fn sample(&self, position: [f64; AXES]) -> [T; W] {
        let zero = [T::zero(); W];
        for level in (0..=self.top_refinement_level()).rev() {
            let id = self.lattice.locate(level, position);
            if id == NOT_FOUND {
                return zero;
            }
            let key = BlockKey::new(level, id);
            if let Some(slot) = self.blocks.get(&key) {
                return if self.has_stored_children(key) {
                    zero
                } else {
                    slot.data
                };
            }
        }
        zero
    }

    // ---------------------------------------------------------------------
    // Compaction
    // ---------------------------------------------------------------------

    /// Remove every block whose primary value is strictly below `threshold`.
    ///
    /// Applies to leaves and interior nodes alike. Returns the number of
    /// removed blocks; clipping an empty mesh is a no-op.
    pub fn clip(&mut self, threshold: f64) -> usize {
        let before = self.n_blocks;
        let order = &mut self.order;
        self.blocks.retain(|_, slot| {
            let keep = !(primary(&slot.data).as_f64() < threshold);
            if !keep {
                order[slot.pos] = None;
            }
            keep
        });
        let removed = before - self.blocks.len();
        self.tombstones += removed;
        self.n_blocks = self.blocks.len();
        self.compact_if_sparse();
        log::debug!("clipped {removed} of {before} blocks below {threshold:e}");
        crate::debug_invariants!(
            self.validate_invariants(),
            "SparseBlockMesh invalid after clip"
        );
        removed
    }

    /// [`clip`](Self::clip) with the mesh's stored threshold.
    #[inline]
    pub fn clip_to_threshold(&mut self) -> usize {
        self.clip(self.threshold)
    }
}

fn iter_self_and_ancestors(
    lattice: &Lattice,
    key: BlockKey,
) -> impl Iterator<Item = BlockKey> + '_ {
    std::iter::once(key).chain(hierarchy::ancestors(lattice, key))
}

impl<T: Scalar, const W: usize> DebugInvariants for SparseBlockMesh<T, W> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SparseBlockMesh invalid");
    }

    fn validate_invariants(&self) -> Result<(), VMeshError> {
        let live = self.order.len().checked_sub(self.tombstones);
        if self.n_blocks != self.blocks.len() || live != Some(self.blocks.len()) {
            return Err(VMeshError::InvariantViolation(format!(
                "count {} / map {} / order {} - {} tombstones disagree",
                self.n_blocks,
                self.blocks.len(),
                self.order.len(),
                self.tombstones
            )));
        }
        let mut seen = HashSet::with_capacity(self.blocks.len());
        for (pos, key) in self.order.iter().enumerate() {
            let Some(key) = key else {
                continue;
            };
            if !seen.insert(*key) {
                return Err(VMeshError::InvariantViolation(format!(
                    "block {key} listed twice in insertion order"
                )));
            }
            match self.blocks.get(key) {
                None => {
                    return Err(VMeshError::InvariantViolation(format!(
                        "block {key} ordered but not stored"
                    )));
                }
                Some(slot) if slot.pos != pos => {
                    return Err(VMeshError::InvariantViolation(format!(
                        "block {key} at order position {pos} records position {}",
                        slot.pos
                    )));
                }
                Some(_) => {}
            }
        }
        if seen.len() != self.blocks.len() {
            return Err(VMeshError::InvariantViolation(format!(
                "{} blocks stored but {} ordered",
                self.blocks.len(),
                seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::block_key::INVALID_INDICES;

    fn filled() -> ScalarMesh {
        let mut mesh = ScalarMesh::new();
        mesh.fill([0.0; 3], [2.0; 3], [1.0; 3]).unwrap();
        mesh
    }

    #[test]
    fn fill_creates_dense_level_zero() {
        let mesh = filled();
        assert_eq!(mesh.len(), 8);
        assert_eq!(mesh.n_cells(), [2, 2, 2]);
        assert_eq!(
            mesh.enumerate_ids(false),
            (1..=8).map(BlockKey::root).collect::<Vec<_>>()
        );
        assert!(mesh.iter().all(|(_, d)| d[0] == 0.0));
    }

    #[test]
    fn degenerate_fill_leaves_mesh_untouched() {
        let mut mesh = filled();
        mesh.set(3u64, [1.0]).unwrap();
        let err = mesh.fill([0.0; 3], [2.0; 3], [1.0, 0.0, 1.0]).unwrap_err();
        assert!(matches!(err, VMeshError::DegenerateGeometry { axis: 1, .. }));
        assert_eq!(mesh.len(), 8);
        assert_eq!(mesh.get(3u64).unwrap().data, [1.0]);
    }

    #[test]
    fn refill_overwrites_without_duplicating() {
        let mut mesh = filled();
        mesh.set(2u64, [5.0]).unwrap();
        mesh.fill([0.0; 3], [2.0; 3], [1.0; 3]).unwrap();
        assert_eq!(mesh.len(), 8);
        assert_eq!(mesh.get(2u64).unwrap().data, [0.0]);
    }

    #[test]
    fn get_absent_is_not_found() {
        let mut mesh = filled();
        mesh.remove(4u64);
        assert_eq!(mesh.get(4u64), Err(VMeshError::NotFound(BlockKey::root(4))));
        assert!(!mesh.contains(4u64));
        assert_eq!(mesh.len(), 7);
    }

    #[test]
    fn set_rejects_unaddressable_keys() {
        let mut mesh = filled();
        assert!(matches!(mesh.set(0u64, [1.0]), Err(VMeshError::InvalidBlockId(_))));
        assert!(matches!(mesh.set(9u64, [1.0]), Err(VMeshError::InvalidBlockId(_))));
        assert!(mesh.set(BlockKey::new(1, 64), [1.0]).is_ok());
        assert_eq!(mesh.len(), 9);
    }

    #[test]
    fn indices_and_sentinels() {
        let mesh = filled();
        assert_eq!(mesh.get_block_id([1, 1, 1]), 8);
        assert_eq!(mesh.get_block_id([2, 0, 0]), NOT_FOUND);
        assert_eq!(mesh.get_indices(NOT_FOUND), INVALID_INDICES);
        assert_eq!(mesh.get_indices(6u64), [1, 0, 1]);
    }

    #[test]
    fn center_and_extent_follow_level() {
        let mesh = filled();
        assert_eq!(mesh.get_center(1u64), Some([0.5; 3]));
        assert_eq!(mesh.get_extent(1u64), Some([1.0; 3]));
        let fine = BlockKey::new(1, mesh.get_block_id_at(1, [3, 0, 0]));
        assert_eq!(mesh.get_center(fine), Some([1.75, 0.25, 0.25]));
        assert_eq!(mesh.get_extent(fine), Some([0.5; 3]));
        assert_eq!(mesh.get_center(NOT_FOUND), None);
    }

    #[test]
    fn clip_removes_strictly_below() {
        let mut mesh = filled();
        for id in 1..=8u64 {
            mesh.set(id, [id as f64 * 0.1]).unwrap();
        }
        let removed = mesh.clip(0.4);
        assert_eq!(removed, 3);
        assert_eq!(mesh.len(), 5);
        assert!(mesh.contains(4u64));
        assert_eq!(mesh.clip(0.4), 0);
        assert_eq!(ScalarMesh::new().clip(1.0), 0);
    }

    #[test]
    fn clip_to_threshold_uses_stored_threshold() {
        let mut mesh = filled();
        mesh.set(1u64, [0.5]).unwrap();
        assert_eq!(mesh.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(mesh.clip_to_threshold(), 7);
        mesh.set_threshold(1.0);
        assert_eq!(mesh.clip_to_threshold(), 1);
        assert!(mesh.is_empty());
    }

    #[test]
    fn sorted_enumeration_is_ascending() {
        let mut mesh = ScalarMesh::with_lattice(*filled().lattice());
        for id in [5u64, 2, 7, 1] {
            mesh.set(id, [1.0]).unwrap();
        }
        mesh.set(BlockKey::new(1, 3), [1.0]).unwrap();
        let ids: Vec<_> = mesh.enumerate_ids(false).iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![5, 2, 7, 1, 3]);
        let sorted = mesh.enumerate_ids(true);
        assert_eq!(
            sorted,
            vec![
                BlockKey::root(1),
                BlockKey::root(2),
                BlockKey::root(5),
                BlockKey::root(7),
                BlockKey::new(1, 3)
            ]
        );
    }

    #[test]
    fn snapshot_of_ids_survives_mutation() {
        let mut mesh = filled();
        let ids = mesh.enumerate_ids(false);
        for key in &ids {
            mesh.remove(*key);
        }
        assert!(mesh.is_empty());
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn leaf_status_is_derived_from_children() {
        let mut mesh = filled();
        let kids = mesh.children(1u64).unwrap();
        assert!(mesh.is_leaf(1u64));
        mesh.set(kids[3], [1.0]).unwrap();
        assert!(!mesh.is_leaf(1u64));
        assert!(mesh.is_leaf(kids[3]));
        assert_eq!(mesh.stored_children(1u64), 1);
        assert_eq!(mesh.top_refinement_level(), 1);
        let leaves = mesh.enumerate_leaves(true);
        assert_eq!(leaves.len(), 8);
        assert!(!leaves.contains(&BlockKey::root(1)));
    }

    #[test]
    fn get_from_roots_falls_back_to_ancestor() {
        let mut mesh = filled();
        mesh.set(1u64, [2.0]).unwrap();
        let grandchild = mesh.children(mesh.children(1u64).unwrap()[0]).unwrap()[5];
        let block = mesh.get_from_roots(grandchild).unwrap();
        assert_eq!(block.data, [2.0]);
        assert_eq!(block.level, 0);
        mesh.remove(1u64);
        assert!(mesh.get_from_roots(grandchild).is_none());
    }

    #[test]
    fn sample_is_zero_outside_and_in_vacuum() {
        let mut mesh = filled();
        mesh.set(1u64, [3.0]).unwrap();
        assert_eq!(mesh.sample([0.5, 0.5, 0.5]), [3.0]);
        assert_eq!(mesh.sample([-1.0, 0.5, 0.5]), [0.0]);
        let kids = mesh.children(1u64).unwrap();
        mesh.set(kids[0], [4.0]).unwrap();
        assert_eq!(mesh.sample([0.25, 0.25, 0.25]), [4.0]);
        // inside block 1 but in a child that is not stored
        assert_eq!(mesh.sample([0.75, 0.75, 0.75]), [0.0]);
    }

    #[test]
    fn invariants_hold_after_batches() {
        let mut mesh = filled();
        mesh.remove_many([BlockKey::root(1), BlockKey::root(2), BlockKey::root(42)]);
        assert_eq!(mesh.len(), 6);
        assert!(mesh.validate_invariants().is_ok());
        assert!(mesh.invariants_hold());
        mesh.debug_assert_invariants();
    }

    #[test]
    fn corrupted_bookkeeping_is_reported() {
        let mut mesh = filled();
        mesh.n_blocks += 1;
        assert!(matches!(
            mesh.validate_invariants(),
            Err(VMeshError::InvariantViolation(_))
        ));
        assert!(!mesh.invariants_hold());
        mesh.n_blocks -= 1;
        mesh.order.push(Some(BlockKey::root(1)));
        mesh.n_blocks += 1;
        mesh.blocks.insert(BlockKey::root(42), Slot { data: [0.0], pos: 8 });
        assert!(!mesh.invariants_hold());

        let mut mesh = filled();
        mesh.order.swap(0, 1);
        assert!(matches!(
            mesh.validate_invariants(),
            Err(VMeshError::InvariantViolation(msg)) if msg.contains("records position")
        ));
    }

    #[test]
    fn fill_rejects_unallocatable_lattice() {
        let mut mesh = filled();
        mesh.set(3u64, [1.0]).unwrap();
        let err = mesh.fill([0.0; 3], [1.0; 3], [1e-6; 3]).unwrap_err();
        assert!(matches!(err, VMeshError::DegenerateGeometry { .. }));
        assert_eq!(mesh.len(), 8);
        assert_eq!(mesh.n_cells(), [2, 2, 2]);
        assert_eq!(mesh.get(3u64).unwrap().data, [1.0]);
    }

    #[test]
    fn removal_keeps_insertion_order_across_compaction() {
        let mut mesh = ScalarMesh::new();
        mesh.fill([0.0; 3], [4.0; 3], [1.0; 3]).unwrap();
        // remove every other block one at a time, crossing the compaction point
        for id in (1..=64u64).step_by(2) {
            assert_eq!(mesh.remove(id), Some([0.0]));
            assert!(mesh.validate_invariants().is_ok());
        }
        assert!(mesh.tombstones * 2 < mesh.order.len().max(1));
        let expected: Vec<_> = (2..=64u64).step_by(2).map(BlockKey::root).collect();
        assert_eq!(mesh.enumerate_ids(false), expected);
        assert_eq!(mesh.iter().count(), 32);
        assert_eq!(mesh.remove(1u64), None);

        // re-inserted keys go to the back; overwrites keep their place
        mesh.set(1u64, [1.0]).unwrap();
        mesh.set(2u64, [2.0]).unwrap();
        let ids = mesh.enumerate_ids(false);
        assert_eq!(ids.first(), Some(&BlockKey::root(2)));
        assert_eq!(ids.last(), Some(&BlockKey::root(1)));
        assert!(mesh.invariants_hold());
    }

    #[test]
    fn clip_and_batch_removal_leave_consistent_positions() {
        let mut mesh = ScalarMesh::new();
        mesh.fill([0.0; 3], [4.0; 3], [1.0; 3]).unwrap();
        for id in 1..=64u64 {
            mesh.set(id, [(id % 4) as f64]).unwrap();
        }
        // one in four clipped: below the compaction point, tombstones stay
        assert_eq!(mesh.clip(0.5), 16);
        assert_eq!(mesh.tombstones, 16);
        assert!(mesh.validate_invariants().is_ok());
        let batch: Vec<_> = (1..=64u64)
            .filter(|id| id % 4 == 1)
            .map(BlockKey::root)
            .collect();
        assert_eq!(mesh.remove_many(batch), 16);
        assert_eq!(mesh.tombstones, 0);
        assert_eq!(mesh.order.len(), 32);
        let ids: Vec<_> = mesh.enumerate_ids(false).iter().map(|k| k.id).collect();
        let expected: Vec<_> = (1..=64u64).filter(|id| id % 4 >= 2).collect();
        assert_eq!(ids, expected);
        mesh.clear();
        assert!(mesh.order.is_empty() && mesh.tombstones == 0);
    }
}
