//! Rectilinear level-0 geometry and its refined levels.

pub mod lattice;

pub use lattice::{AXES, Lattice};
