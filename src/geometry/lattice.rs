//! Rectilinear level-0 lattice and its refined levels.
//!
//! A [`Lattice`] is fixed by three per-axis triples: minimum bound, maximum
//! bound and cell pitch. Cell counts are derived from them, never supplied.
//! Level `ℓ` halves the pitch `ℓ` times, so it has `n_axis · 2^ℓ` cells per
//! axis. Cells are numbered row-major (x fastest) and biased by one:
//!
//! ```text
//! id = 1 + k·ny·nx + j·nx + i
//! ```
//!
//! which leaves 0 free for [`NOT_FOUND`].

use crate::mesh_error::VMeshError;
use crate::topology::block_key::{
    BlockKey, CellId, INVALID_INDICES, Indices, Level, NOT_FOUND,
};

/// Number of spatial axes of the lattice.
pub const AXES: usize = 3;

/// Slack added to `(max - min) / pitch` before flooring, so a pitch that
/// divides the extent exactly is not lost to rounding (e.g. `0.3 / 0.1`).
const CELL_COUNT_SLACK: f64 = 1.0e-9;

/// Geometry of the coarsest level plus derived cell counts.
///
/// The default lattice has no cells: every index maps to [`NOT_FOUND`].
///
/// Deserialization goes through [`Lattice::try_new`], so a decoded lattice
/// is either the default one or a valid geometry whose stored cell counts
/// match its bounds and pitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "LatticeSerde", into = "LatticeSerde")]
pub struct Lattice {
    mins: [f64; AXES],
    maxs: [f64; AXES],
    pitch: [f64; AXES],
    n_cells: Indices,
}

/// Wire form of [`Lattice`]; same fields, checked on the way in.
#[derive(Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
struct LatticeSerde {
    mins: [f64; AXES],
    maxs: [f64; AXES],
    pitch: [f64; AXES],
    n_cells: Indices,
}

impl From<Lattice> for LatticeSerde {
    fn from(value: Lattice) -> Self {
        Self {
            mins: value.mins,
            maxs: value.maxs,
            pitch: value.pitch,
            n_cells: value.n_cells,
        }
    }
}

impl TryFrom<LatticeSerde> for Lattice {
    type Error = VMeshError;

    fn try_from(value: LatticeSerde) -> Result<Self, Self::Error> {
        if value == LatticeSerde::default() {
            return Ok(Lattice::default());
        }
        let lattice = Lattice::try_new(value.mins, value.maxs, value.pitch)?;
        if let Some(axis) = (0..AXES).find(|&a| lattice.n_cells[a] != value.n_cells[a]) {
            return Err(VMeshError::DegenerateGeometry {
                axis,
                reason: format!(
                    "stored cell count {} disagrees with derived {}",
                    value.n_cells[axis], lattice.n_cells[axis]
                ),
            });
        }
        Ok(lattice)
    }
}

impl Lattice {
    /// Build a lattice from bounds and pitch.
    ///
    /// # Errors
    /// `DegenerateGeometry` if any bound or pitch is non-finite, a pitch is
    /// non-positive, or an axis ends up with zero cells.
    pub fn try_new(
        mins: [f64; AXES],
        maxs: [f64; AXES],
        pitch: [f64; AXES],
    ) -> Result<Self, VMeshError> {
        let mut n_cells = [0u64; AXES];
        for axis in 0..AXES {
            let degenerate = |reason: String| VMeshError::DegenerateGeometry { axis, reason };
            if !(mins[axis].is_finite() && maxs[axis].is_finite()) {
                return Err(degenerate(format!(
                    "non-finite bounds [{}, {}]",
                    mins[axis], maxs[axis]
                )));
            }
            if !pitch[axis].is_finite() || pitch[axis] <= 0.0 {
                return Err(degenerate(format!("non-positive pitch {}", pitch[axis])));
            }
            let count = ((maxs[axis] - mins[axis]) / pitch[axis] + CELL_COUNT_SLACK).floor();
            if count < 1.0 {
                return Err(degenerate(format!(
                    "bounds [{}, {}] hold no cell of pitch {}",
                    mins[axis], maxs[axis], pitch[axis]
                )));
            }
            if count >= u64::MAX as f64 {
                return Err(degenerate(format!("cell count {count} overflows u64")));
            }
            n_cells[axis] = count as u64;
        }
        let lattice = Self {
            mins,
            maxs,
            pitch,
            n_cells,
        };
        if lattice.len_at(0).is_none() {
            return Err(VMeshError::DegenerateGeometry {
                axis: AXES - 1,
                reason: format!("{n_cells:?} cells overflow the identifier space"),
            });
        }
        Ok(lattice)
    }

    /// Minimum bound per axis.
    #[inline]
    pub fn mins(&self) -> [f64; AXES] {
        self.mins
    }

    /// Maximum bound per axis, as supplied.
    #[inline]
    pub fn maxs(&self) -> [f64; AXES] {
        self.maxs
    }

    /// Level-0 cell pitch per axis.
    #[inline]
    pub fn pitch(&self) -> [f64; AXES] {
        self.pitch
    }

    /// Level-0 cell counts per axis.
    #[inline]
    pub fn n_cells(&self) -> Indices {
        self.n_cells
    }

    /// Whether the lattice has no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_cells.iter().any(|&n| n == 0)
    }

    /// Cell counts per axis on `level`, or `None` if they overflow.
    pub fn cells_at(&self, level: Level) -> Option<Indices> {
        if u32::from(level) >= u64::BITS {
            return None;
        }
        let scale = 1u64 << level;
        let mut out = [0u64; AXES];
        for axis in 0..AXES {
            out[axis] = self.n_cells[axis].checked_mul(scale)?;
        }
        Some(out)
    }

    /// Total cell count on `level`, or `None` if identifiers on that level
    /// would collide with the invalid-index sentinel.
    pub fn len_at(&self, level: Level) -> Option<u64> {
        let [nx, ny, nz] = self.cells_at(level)?;
        let total = nx.checked_mul(ny)?.checked_mul(nz)?;
        (total < u64::MAX).then_some(total)
    }

    /// Deepest level whose identifiers still fit in a `u64`.
    pub fn max_level(&self) -> Level {
        if self.is_empty() {
            return 0;
        }
        let mut level: Level = 0;
        while level < Level::MAX && self.len_at(level + 1).is_some() {
            level += 1;
        }
        level
    }

    /// Identifier of `indices` on `level`, or [`NOT_FOUND`] if any index is
    /// outside `[0, n_axis)` for that level.
    pub fn block_id(&self, level: Level, indices: Indices) -> CellId {
        let Some([nx, ny, nz]) = self.cells_at(level) else {
            return NOT_FOUND;
        };
        if self.len_at(level).is_none() {
            return NOT_FOUND;
        }
        let [i, j, k] = indices;
        if i >= nx || j >= ny || k >= nz {
            return NOT_FOUND;
        }
        1 + k * ny * nx + j * nx + i
    }

    /// Inverse of [`block_id`](Self::block_id).
    ///
    /// Returns [`INVALID_INDICES`] for [`NOT_FOUND`] and for identifiers past
    /// the level's cell total.
    pub fn indices(&self, level: Level, id: CellId) -> Indices {
        if id == NOT_FOUND {
            return INVALID_INDICES;
        }
        let (Some([nx, ny, _]), Some(total)) = (self.cells_at(level), self.len_at(level)) else {
            return INVALID_INDICES;
        };
        if id > total {
            return INVALID_INDICES;
        }
        let raw = id - 1;
        [raw % nx, (raw / nx) % ny, raw / (nx * ny)]
    }

    /// Whether `key` addresses a cell of this lattice.
    #[inline]
    pub fn contains_key(&self, key: BlockKey) -> bool {
        key.id != NOT_FOUND && self.len_at(key.level).is_some_and(|total| key.id <= total)
    }

    /// Physical size of a cell on `level`: the pitch scaled by `2^-level`.
    pub fn extent(&self, level: Level) -> [f64; AXES] {
        let scale = 0.5f64.powi(i32::from(level));
        self.pitch.map(|p| p * scale)
    }

    /// Physical center of the cell at `indices` on `level`.
    pub fn center(&self, level: Level, indices: Indices) -> [f64; AXES] {
        let size = self.extent(level);
        let mut out = [0.0; AXES];
        for axis in 0..AXES {
            out[axis] = self.mins[axis] + size[axis] * (indices[axis] as f64 + 0.5);
        }
        out
    }

    /// Identifier of the cell on `level` containing `position`, or
    /// [`NOT_FOUND`] outside the lattice.
    pub fn locate(&self, level: Level, position: [f64; AXES]) -> CellId {
        let size = self.extent(level);
        let mut indices = [0u64; AXES];
        for axis in 0..AXES {
            let t = (position[axis] - self.mins[axis]) / size[axis];
            if !t.is_finite() || t < 0.0 {
                return NOT_FOUND;
            }
            // Saturating cast; out-of-range indices are rejected by block_id.
            indices[axis] = t.floor() as u64;
        }
        self.block_id(level, indices)
    }
}
