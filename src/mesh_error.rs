//! VMeshError: Unified error type for vmesh public APIs
//!
//! Index arithmetic never errors: out-of-range indices map to the sentinel
//! identifiers in [`crate::topology::block_key`]. This type covers the
//! failures that callers must not silently ignore: reading a block that is
//! not stored, configuring a degenerate lattice, and restoring malformed
//! snapshots.

use crate::topology::block_key::BlockKey;
use thiserror::Error;

/// Unified error type for vmesh operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VMeshError {
    /// `get` on a block that is not present in storage.
    #[error("block {0} not found in mesh")]
    NotFound(BlockKey),
    /// Lattice bounds or pitch do not describe a usable level-0 grid.
    #[error("degenerate geometry on axis {axis}: {reason}")]
    DegenerateGeometry {
        /// Offending axis (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// Human-readable description of the problem.
        reason: String,
    },
    /// Identifier outside its level's range, or a level past the deepest
    /// representable one.
    #[error("block {0} is not addressable on this lattice")]
    InvalidBlockId(BlockKey),
    /// A serialized payload does not have the mesh's block width.
    #[error("payload width mismatch for block {key}: expected {expected}, found {found}")]
    PayloadWidthMismatch {
        /// Block whose payload was malformed.
        key: BlockKey,
        /// Block width of the receiving mesh.
        expected: usize,
        /// Length of the serialized payload.
        found: usize,
    },
    /// A serialized value cannot be represented in the mesh scalar type.
    #[error("value {value} of block {key} is not representable in the mesh scalar type")]
    ScalarConversion {
        /// Block whose payload was malformed.
        key: BlockKey,
        /// Offending value.
        value: f64,
    },
    /// Refinement configuration rejected by validation.
    #[error("invalid refinement configuration: {0}")]
    InvalidConfig(String),
    /// Internal bookkeeping does not match storage.
    #[error("mesh invariant violated: {0}")]
    InvariantViolation(String),
}
