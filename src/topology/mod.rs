//! Block identifiers and the refinement hierarchy.
//!
//! Identifiers are per-level bijections of `(i, j, k)` indices; parent,
//! child, sibling and neighbour relations are derived from them by index
//! arithmetic and never stored.

pub mod block_key;
pub mod hierarchy;

pub use block_key::{BlockKey, CellId, INVALID_INDEX, Indices, Level, NOT_FOUND};
pub use hierarchy::{CHILDREN, FACES, Face};
