//! RefinementAdapter: value/gradient driven refine and unrefine passes.
//!
//! A pass is `check` (read-only selection), then `refine` and `unrefine`
//! applying the selection. [`RefinementAdapter::adapt`] runs the whole
//! sequence after refreshing interior payloads with
//! [`RefinementAdapter::restrict_interior`].
//!
//! Requests that would break the hierarchy (refining a non-leaf or a block
//! at the maximum level, merging an incomplete or partly refined sibling
//! group, merging level 0) are skipped without error. They show up only as
//! unchanged counters.

use crate::adapt::config::{RefinementConfig, check_cap, check_tolerance};
use crate::adapt::criteria::{self, exceeds_cap};
use crate::adapt::transfer::{Aggregation, CopyProlongation, Prolongation};
use crate::debug_invariants::DebugInvariants;
use crate::geometry::lattice::Lattice;
use crate::mesh::block::{Scalar, primary};
use crate::mesh::store::SparseBlockMesh;
use crate::mesh_error::VMeshError;
use crate::topology::block_key::{BlockKey, Level};
use crate::topology::hierarchy::CHILDREN;
use hashbrown::HashSet;
use itertools::Itertools;

/// Blocks selected by [`RefinementAdapter::check`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdaptivitySelection {
    /// Leaves to subdivide, ascending.
    pub refine_blocks: Vec<BlockKey>,
    /// Members of complete, uniformly quiet sibling groups, one group after
    /// another in ascending parent order.
    pub unrefine_blocks: Vec<BlockKey>,
    /// Leaves whose primary value exceeded the configured cap.
    pub clamped: usize,
}

impl AdaptivitySelection {
    /// Whether the pass would leave the mesh unchanged.
    pub fn is_empty(&self) -> bool {
        self.refine_blocks.is_empty() && self.unrefine_blocks.is_empty()
    }
}

/// Outcome of [`RefinementAdapter::adapt`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdaptationReport {
    /// What `check` selected.
    pub selection: AdaptivitySelection,
    /// Interior blocks whose payload was refreshed from their children.
    pub restricted: usize,
    /// Blocks created by refinement.
    pub created: usize,
    /// Blocks removed by unrefinement.
    pub removed: usize,
}

/// Refinement controller for a [`SparseBlockMesh`].
///
/// `P` fills the children of a refined block; the default copies the
/// parent payload into every child, which together with
/// [`Aggregation::Mean`] makes refine-then-unrefine exact.
#[derive(Clone, Debug)]
pub struct RefinementAdapter<P = CopyProlongation> {
    config: RefinementConfig,
    prolongation: P,
    cells_created: u64,
    cells_removed: u64,
}

impl Default for RefinementAdapter {
    fn default() -> Self {
        Self {
            config: RefinementConfig::default(),
            prolongation: CopyProlongation,
            cells_created: 0,
            cells_removed: 0,
        }
    }
}

impl RefinementAdapter {
    /// Adapter with copy prolongation.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn new(config: RefinementConfig) -> Result<Self, VMeshError> {
        Self::with_prolongation(config, CopyProlongation)
    }
}

impl<P> RefinementAdapter<P> {
    /// Adapter with a custom prolongation strategy.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn with_prolongation(
        config: RefinementConfig,
        prolongation: P,
    ) -> Result<Self, VMeshError> {
        config.validate()?;
        Ok(Self {
            config,
            prolongation,
            cells_created: 0,
            cells_removed: 0,
        })
    }

    /// Current configuration.
    #[inline]
    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Prolongation strategy used by [`refine`](Self::refine).
    #[inline]
    pub fn prolongation(&self) -> &P {
        &self.prolongation
    }

    /// Threshold both refinement criteria are compared against.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.config.tolerance
    }

    /// Set the refinement tolerance.
    ///
    /// # Errors
    /// `InvalidConfig` for a negative or NaN tolerance.
    pub fn set_tolerance(&mut self, tolerance: f64) -> Result<(), VMeshError> {
        check_tolerance(tolerance)?;
        self.config.tolerance = tolerance;
        Ok(())
    }

    /// Clamp applied to primary values, if any.
    #[inline]
    pub fn maximum_data_value(&self) -> Option<f64> {
        self.config.maximum_data_value
    }

    /// Clamp primary values to `[-cap, cap]` before evaluating criteria.
    ///
    /// # Errors
    /// `InvalidConfig` for a non-positive or NaN cap.
    pub fn set_maximum_data_value(&mut self, cap: f64) -> Result<(), VMeshError> {
        check_cap(cap)?;
        self.config.maximum_data_value = Some(cap);
        Ok(())
    }

    /// Stop clamping primary values.
    pub fn clear_maximum_data_value(&mut self) {
        self.config.maximum_data_value = None;
    }

    /// Deepest level refinement may create, before the lattice's own limit.
    pub fn set_maximum_refinement_level(&mut self, level: Level) {
        self.config.max_refinement_level = level;
    }

    /// Rule used by [`unrefine`](Self::unrefine) and
    /// [`restrict_interior`](Self::restrict_interior).
    pub fn set_aggregation(&mut self, aggregation: Aggregation) {
        self.config.aggregation = aggregation;
    }

    /// Blocks created by refinement since construction or the last reset.
    #[inline]
    pub fn cells_created(&self) -> u64 {
        self.cells_created
    }

    /// Blocks removed by unrefinement since construction or the last reset.
    #[inline]
    pub fn cells_removed(&self) -> u64 {
        self.cells_removed
    }

    /// Zero both block counters.
    pub fn reset_counters(&mut self) {
        self.cells_created = 0;
        self.cells_removed = 0;
    }

    /// Deepest level refinement may create on `lattice`.
    fn level_cap(&self, lattice: &Lattice) -> Level {
        self.config.max_refinement_level.min(lattice.max_level())
    }

    /// Magnitude of the clamped primary value of `key` (0 if absent).
    pub fn maximum_value<T: Scalar, const W: usize>(
        &self,
        mesh: &SparseBlockMesh<T, W>,
        key: impl Into<BlockKey>,
    ) -> f64 {
        criteria::maximum_value(mesh, key.into(), self.config.maximum_data_value)
    }

    /// Largest clamped first difference between `key` and its face
    /// neighbours, with vacuum where no neighbour covers the face.
    pub fn maximum_gradient<T: Scalar, const W: usize>(
        &self,
        mesh: &SparseBlockMesh<T, W>,
        key: impl Into<BlockKey>,
    ) -> f64 {
        criteria::maximum_gradient(mesh, key.into(), self.config.maximum_data_value)
    }

    /// Evaluate every stored leaf against both criteria.
    ///
    /// A leaf is selected for refinement when either metric exceeds the
    /// tolerance and it sits below the level cap. A sibling group is
    /// selected for unrefinement when all of its members are stored leaves
    /// with both metrics strictly below the tolerance. The mesh is not
    /// modified.
    pub fn check<T: Scalar, const W: usize>(
        &self,
        mesh: &SparseBlockMesh<T, W>,
    ) -> AdaptivitySelection {
        let tolerance = self.config.tolerance;
        let cap = self.config.maximum_data_value;
        let level_cap = self.level_cap(mesh.lattice());
        let mut selection = AdaptivitySelection::default();
        let mut quiet = HashSet::new();

        let leaves = mesh.enumerate_leaves(true);
        for &key in &leaves {
            let Some(data) = mesh.data(key) else {
                continue;
            };
            if exceeds_cap(primary(data).as_f64(), cap) {
                selection.clamped += 1;
            }
            let value = criteria::maximum_value(mesh, key, cap);
            let gradient = criteria::maximum_gradient(mesh, key, cap);
            if value > tolerance || gradient > tolerance {
                if key.level < level_cap {
                    selection.refine_blocks.push(key);
                }
            } else if key.level > 0 && value < tolerance && gradient < tolerance {
                quiet.insert(key);
            }
        }

        let parents = quiet
            .iter()
            .filter_map(|k| mesh.parent(*k))
            .sorted_unstable()
            .dedup();
        for parent in parents {
            if let Some(kids) = mesh.children(parent) {
                if kids.iter().all(|k| quiet.contains(k)) {
                    selection.unrefine_blocks.extend(kids);
                }
            }
        }

        if selection.clamped > 0 {
            log::warn!(
                "{} blocks exceed the maximum data value {:?} and were clamped",
                selection.clamped,
                cap
            );
        }
        log::debug!(
            "checked {} leaves: {} to refine, {} to unrefine",
            leaves.len(),
            selection.refine_blocks.len(),
            selection.unrefine_blocks.len()
        );
        selection
    }

    /// Subdivide each eligible candidate into its full child set.
    ///
    /// Candidates that are absent, not leaves, or at the level cap are
    /// skipped; duplicates count once. Eligibility is decided against the
    /// mesh as it was before the call. Returns the number of blocks created.
    pub fn refine<T: Scalar, const W: usize>(
        &mut self,
        mesh: &mut SparseBlockMesh<T, W>,
        candidates: &[BlockKey],
    ) -> usize
    where
        P: Prolongation<T, W>,
    {
        let level_cap = self.level_cap(mesh.lattice());
        let eligible: Vec<BlockKey> = candidates
            .iter()
            .copied()
            .sorted_unstable()
            .dedup()
            .filter(|k| k.level < level_cap && mesh.is_leaf(*k))
            .collect();

        let mut created = 0usize;
        for parent in eligible {
            let (Some(kids), Some(data)) = (mesh.children(parent), mesh.data(parent).copied())
            else {
                continue;
            };
            let payloads: [[T; W]; CHILDREN] =
                std::array::from_fn(|o| self.prolongation.prolong(mesh, parent, &data, o));
            for (kid, payload) in kids.into_iter().zip(payloads) {
                if mesh.upsert(kid, payload).is_none() {
                    created += 1;
                }
            }
            log::trace!("refined {parent}");
        }

        self.cells_created += created as u64;
        log::debug!("refinement created {created} blocks");
        crate::debug_invariants!(
            mesh.validate_invariants(),
            "SparseBlockMesh invalid after refine"
        );
        created
    }

    /// Collapse each selected sibling group into its parent.
    ///
    /// Any member selects its whole group. A group is merged only when all
    /// of its members are stored leaves in the mesh as it was before the
    /// call, so merges never cascade within one call. The parent receives
    /// the configured aggregate of the children and is reinstated if it had
    /// been removed. All merged children are removed in one batch. Returns
    /// the number of blocks removed.
    pub fn unrefine<T: Scalar, const W: usize>(
        &mut self,
        mesh: &mut SparseBlockMesh<T, W>,
        candidates: &[BlockKey],
    ) -> usize {
        let groups: Vec<(BlockKey, [BlockKey; CHILDREN])> = candidates
            .iter()
            .filter_map(|k| mesh.parent(*k))
            .sorted_unstable()
            .dedup()
            .filter_map(|parent| {
                let kids = mesh.children(parent)?;
                kids.iter().all(|k| mesh.is_leaf(*k)).then_some((parent, kids))
            })
            .collect();

        let mut merged_kids = Vec::with_capacity(groups.len() * CHILDREN);
        for (parent, kids) in groups {
            let payloads = kids.map(|k| mesh.data(k).copied().unwrap_or([T::zero(); W]));
            let merged = self.config.aggregation.aggregate(&payloads);
            mesh.upsert(parent, merged);
            merged_kids.extend(kids);
            log::trace!("unrefined into {parent}");
        }
        let removed = mesh.remove_many(merged_kids);

        self.cells_removed += removed as u64;
        log::debug!("unrefinement removed {removed} blocks");
        removed
    }

    /// Recompute every interior payload from its children, finest level
    /// first, so interior values track their leaves. Children that are not
    /// stored contribute zero. Returns the number of refreshed blocks.
    pub fn restrict_interior<T: Scalar, const W: usize>(
        &self,
        mesh: &mut SparseBlockMesh<T, W>,
    ) -> usize {
        let mut refreshed = 0usize;
        for key in mesh.enumerate_ids(true).into_iter().rev() {
            let Some(kids) = mesh.children(key) else {
                continue;
            };
            if !kids.iter().any(|k| mesh.contains(*k)) {
                continue;
            }
            let payloads = kids.map(|k| mesh.data(k).copied().unwrap_or([T::zero(); W]));
            let merged = self.config.aggregation.aggregate(&payloads);
            if let Some(slot) = mesh.data_mut(key) {
                *slot = merged;
                refreshed += 1;
            }
        }
        refreshed
    }

    /// One full adaptation step: restrict, check, refine, unrefine.
    pub fn adapt<T: Scalar, const W: usize>(
        &mut self,
        mesh: &mut SparseBlockMesh<T, W>,
    ) -> AdaptationReport
    where
        P: Prolongation<T, W>,
    {
        let restricted = self.restrict_interior(mesh);
        let selection = self.check(mesh);
        let created = self.refine(mesh, &selection.refine_blocks);
        let removed = self.unrefine(mesh, &selection.unrefine_blocks);
        log::info!(
            "adapted mesh: +{created} / -{removed} blocks, {} stored",
            mesh.len()
        );
        AdaptationReport {
            selection,
            restricted,
            created,
            removed,
        }
    }
}
