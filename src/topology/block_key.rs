//! `BlockKey`: the `(level, id)` handle addressing one block in the mesh
//!
//! A cell identifier is a `u64` that is unique only within one refinement
//! level. Identifiers start at 1 so that 0 can act as the canonical
//! "not found" value; the maximum `u64` is reserved as the "invalid index"
//! value returned when decoding fails. Neither sentinel ever addresses a
//! stored block.

use std::fmt;

/// Identifier of a cell within one refinement level.
pub type CellId = u64;

/// Integer lattice coordinates `(i, j, k)` of a cell within one level.
pub type Indices = [u64; 3];

/// Refinement level; 0 is the coarsest (the filled lattice).
pub type Level = u8;

/// Identifier returned when indices fall outside the lattice.
pub const NOT_FOUND: CellId = 0;

/// Per-axis index returned when an identifier cannot be decoded.
pub const INVALID_INDEX: u64 = u64::MAX;

/// Index triple returned for [`NOT_FOUND`] and for undecodable identifiers.
pub const INVALID_INDICES: Indices = [INVALID_INDEX; 3];

/// Address of a block: the refinement level plus the per-level identifier.
///
/// Keys order by level first, then identifier, so a sorted key list is a
/// coarse-to-fine sweep with each level in row-major order.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct BlockKey {
    /// Refinement level of the block.
    pub level: Level,
    /// Identifier within `level`.
    pub id: CellId,
}

impl BlockKey {
    /// Key of `id` on `level`.
    #[inline]
    pub const fn new(level: Level, id: CellId) -> Self {
        Self { level, id }
    }

    /// Key of `id` on the coarsest level.
    #[inline]
    pub const fn root(id: CellId) -> Self {
        Self { level: 0, id }
    }

    /// Whether the identifier is the "not found" sentinel.
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        self.id == NOT_FOUND
    }
}

impl From<CellId> for BlockKey {
    #[inline]
    fn from(id: CellId) -> Self {
        Self::root(id)
    }
}

impl From<(Level, CellId)> for BlockKey {
    #[inline]
    fn from((level, id): (Level, CellId)) -> Self {
        Self::new(level, id)
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlockKey")
            .field(&self.level)
            .field(&self.id)
            .finish()
    }
}

/// Prints as `id@level`.
impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.level)
    }
}
