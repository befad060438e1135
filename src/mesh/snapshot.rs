//! Serializable dump of mesh state.
//!
//! The crate defines no file format of its own. A [`MeshSnapshot`] is the
//! `(level, id, payload)` list an external checkpoint writer or a cross-tile
//! exchange needs, plus the geometry required to rebuild an identical empty
//! mesh. Restoring replays [`SparseBlockMesh::set`] for each record, so a
//! restored mesh matches the original block for block.

use crate::debug_invariants::DebugInvariants;
use crate::geometry::lattice::Lattice;
use crate::mesh::block::Scalar;
use crate::mesh::store::SparseBlockMesh;
use crate::mesh_error::VMeshError;
use crate::topology::block_key::{BlockKey, CellId, Level};

/// One stored block in serialized form.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockRecord {
    /// Refinement level.
    pub level: Level,
    /// Identifier within `level`.
    pub id: CellId,
    /// Payload components, widened to `f64`.
    pub data: Vec<f64>,
}

impl BlockRecord {
    /// Key addressed by this record.
    #[inline]
    pub fn key(&self) -> BlockKey {
        BlockKey::new(self.level, self.id)
    }
}

/// Geometry, clipping threshold and every stored block in insertion order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeshSnapshot {
    /// Level-0 geometry.
    pub lattice: Lattice,
    /// Clipping threshold of the mesh.
    pub threshold: f64,
    /// Stored blocks.
    pub blocks: Vec<BlockRecord>,
}

impl<T: Scalar, const W: usize> SparseBlockMesh<T, W> {
    /// Export the full mesh state.
    pub fn snapshot(&self) -> MeshSnapshot {
        let blocks = self
            .iter()
            .map(|(key, data)| BlockRecord {
                level: key.level,
                id: key.id,
                data: data.iter().map(|v| v.as_f64()).collect(),
            })
            .collect();
        MeshSnapshot {
            lattice: *self.lattice(),
            threshold: self.threshold(),
            blocks,
        }
    }

    /// Rebuild a mesh from a snapshot.
    ///
    /// The lattice was already checked when the snapshot was deserialized.
    ///
    /// # Errors
    /// `PayloadWidthMismatch` if a record's payload length differs from `W`,
    /// `ScalarConversion` if a value does not fit `T`, and `InvalidBlockId`
    /// if a record does not address a cell of the snapshot's lattice.
    pub fn from_snapshot(snapshot: &MeshSnapshot) -> Result<Self, VMeshError> {
        let mut mesh = Self::with_lattice(snapshot.lattice);
        mesh.set_threshold(snapshot.threshold);
        mesh.extend_from_records(&snapshot.blocks)?;
        Ok(mesh)
    }

    /// Insert or overwrite every record, e.g. blocks received from a
    /// neighbouring tile. Returns the number of records applied.
    pub fn extend_from_records(
        &mut self,
        records: &[BlockRecord],
    ) -> Result<usize, VMeshError> {
        for record in records {
            let key = record.key();
            let payload = decode_payload::<T, W>(key, &record.data)?;
            self.set(key, payload)?;
        }
        crate::debug_invariants!(
            self.validate_invariants(),
            "SparseBlockMesh invalid after restore"
        );
        Ok(records.len())
    }
}

fn decode_payload<T: Scalar, const W: usize>(
    key: BlockKey,
    values: &[f64],
) -> Result<[T; W], VMeshError> {
    if values.len() != W {
        return Err(VMeshError::PayloadWidthMismatch {
            key,
            expected: W,
            found: values.len(),
        });
    }
    let mut out = [T::zero(); W];
    for (slot, &value) in out.iter_mut().zip(values) {
        *slot = T::try_from_f64(value).ok_or(VMeshError::ScalarConversion { key, value })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::store::VelocityMesh;

    fn sample_mesh() -> VelocityMesh {
        let mut mesh = VelocityMesh::new();
        mesh.fill([-1.0; 3], [1.0; 3], [1.0; 3]).unwrap();
        mesh.set(3u64, [1.0, 2.0, 3.0, 4.0]).unwrap();
        let kid = mesh.children(5u64).unwrap()[2];
        mesh.set(kid, [0.5, 0.0, 0.0, -1.0]).unwrap();
        mesh.set_threshold(0.25);
        mesh
    }

    #[test]
    fn snapshot_restores_every_block() {
        let mesh = sample_mesh();
        let snap = mesh.snapshot();
        assert_eq!(snap.blocks.len(), mesh.len());
        let restored = VelocityMesh::from_snapshot(&snap).unwrap();
        assert_eq!(restored.len(), mesh.len());
        assert_eq!(restored.enumerate_ids(false), mesh.enumerate_ids(false));
        for key in mesh.enumerate_ids(false) {
            assert_eq!(restored.get(key).unwrap(), mesh.get(key).unwrap());
        }
        assert_eq!(restored.threshold(), 0.25);
        assert_eq!(restored.lattice(), mesh.lattice());
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut snap = sample_mesh().snapshot();
        snap.blocks[0].data.pop();
        let err = VelocityMesh::from_snapshot(&snap).unwrap_err();
        assert!(matches!(
            err,
            VMeshError::PayloadWidthMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn unaddressable_record_is_rejected() {
        let mut snap = sample_mesh().snapshot();
        snap.blocks.push(BlockRecord {
            level: 0,
            id: 1000,
            data: vec![0.0; 4],
        });
        assert!(matches!(
            VelocityMesh::from_snapshot(&snap),
            Err(VMeshError::InvalidBlockId(_))
        ));
    }

    #[test]
    fn json_roundtrip() {
        let snap = sample_mesh().snapshot();
        let s = serde_json::to_string(&snap).unwrap();
        let back: MeshSnapshot = serde_json::from_str(&s).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn bincode_roundtrip() {
        let snap = sample_mesh().snapshot();
        let bytes = bincode::serialize(&snap).unwrap();
        let back: MeshSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn degenerate_lattice_fails_to_decode() {
        let json = r#"{
            "lattice": {
                "mins": [0.0, 0.0, 0.0],
                "maxs": [5.0, 5.0, 5.0],
                "pitch": [0.0, 1.0, 1.0],
                "n_cells": [5, 5, 5]
            },
            "threshold": 0.01,
            "blocks": [{ "level": 0, "id": 1, "data": [1.0, 0.0, 0.0, 0.0] }]
        }"#;
        let err = serde_json::from_str::<MeshSnapshot>(json).unwrap_err();
        assert!(err.to_string().contains("degenerate geometry on axis 0"));
    }

    #[test]
    fn inconsistent_cell_counts_fail_to_decode() {
        let mut value = serde_json::to_value(sample_mesh().snapshot()).unwrap();
        value["lattice"]["n_cells"] = serde_json::json!([2, 2, 7]);
        let err = serde_json::from_value::<MeshSnapshot>(value).unwrap_err();
        assert!(err.to_string().contains("axis 2"));
    }

    #[test]
    fn empty_mesh_snapshot_roundtrips() {
        let snap = VelocityMesh::new().snapshot();
        let bytes = bincode::serialize(&snap).unwrap();
        let back: MeshSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, snap);
        let restored = VelocityMesh::from_snapshot(&back).unwrap();
        assert!(restored.is_empty());
        assert!(restored.lattice().is_empty());
    }
}
