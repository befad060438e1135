#![cfg_attr(docsrs, feature(doc_cfg))]
//! # vmesh
//!
//! vmesh is an adaptive, sparse, hierarchical block mesh for the
//! velocity-space distribution functions of kinetic plasma codes. Blocks are
//! stored only where the distribution is non-negligible and can be refined or
//! merged locally as the simulation evolves, so memory and work follow the
//! structure of the data rather than the size of a dense grid.
//!
//! ## Features
//! - [`SparseBlockMesh`]: sparse `(level, id) → payload` store over a
//!   rectilinear lattice with a deterministic, invertible cell index
//! - Parent/child/sibling/neighbour navigation by index arithmetic
//!   ([`topology::hierarchy`])
//! - Threshold clipping of negligible blocks
//! - [`RefinementAdapter`]: value and gradient criteria, refine/unrefine
//!   passes with pluggable prolongation and a fixed aggregation rule
//! - Serializable [`MeshSnapshot`] for checkpoint writers and tile exchange
//!
//! ## Determinism
//!
//! Enumeration follows insertion order, or ascending `(level, id)` order on
//! request; adapter passes process blocks in ascending order, so identical
//! inputs produce identical meshes. Property tests fix their seeds.
//!
//! ## Usage
//!
//! ```
//! use vmesh::prelude::*;
//!
//! let mut mesh = VelocityMesh::new();
//! mesh.fill([-1.0; 3], [1.0; 3], [0.5; 3])?;
//! let id = mesh.locate(0, [0.1, 0.1, 0.1]);
//! mesh.set(id, [1.0, 0.0, 0.0, 0.0])?;
//! mesh.clip_to_threshold();
//!
//! let mut adapter = RefinementAdapter::new(RefinementConfig::default())?;
//! let report = adapter.adapt(&mut mesh);
//! assert_eq!(report.created, 8);
//! # Ok::<(), vmesh::mesh_error::VMeshError>(())
//! ```
//!
//! ## Concurrency
//!
//! A mesh is a single-writer structure without internal locking. Snapshots
//! returned by [`SparseBlockMesh::enumerate_ids`] do not borrow the mesh, so
//! the mesh may be mutated while iterating one.

pub mod adapt;
pub mod debug_invariants;
pub mod geometry;
pub mod mesh;
pub mod mesh_error;
pub mod topology;

pub use adapt::{RefinementAdapter, RefinementConfig};
pub use debug_invariants::DebugInvariants;
pub use mesh::{MeshSnapshot, SparseBlockMesh};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::{
        AdaptationReport, AdaptivitySelection, Aggregation, CopyProlongation, LinearProlongation,
        ProlongWith, Prolongation, RefinementAdapter, RefinementConfig, SplitProlongation,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::geometry::lattice::Lattice;
    pub use crate::mesh::{
        Block, BlockRecord, MeshSnapshot, Scalar, ScalarMesh, SparseBlockMesh, VelocityMesh,
    };
    pub use crate::mesh_error::VMeshError;
    pub use crate::topology::block_key::{BlockKey, CellId, Indices, Level, NOT_FOUND};
    pub use crate::topology::hierarchy::{CHILDREN, Face};
}
