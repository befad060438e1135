//! Sparse block storage.
//!
//! [`SparseBlockMesh`] owns every block; callers receive copies
//! ([`Block`]) or borrows bounded by the mesh lifetime.

pub mod block;
pub mod snapshot;
pub mod store;

pub use block::{Block, Scalar};
pub use snapshot::{BlockRecord, MeshSnapshot};
pub use store::{DEFAULT_THRESHOLD, ScalarMesh, SparseBlockMesh, VelocityMesh};
