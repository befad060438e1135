//! Configuration of the refinement controller.

use crate::adapt::transfer::Aggregation;
use crate::mesh_error::VMeshError;
use crate::topology::block_key::Level;

/// Tolerance used when none is configured.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-3;

/// Refinement depth used when none is configured.
pub const DEFAULT_MAX_REFINEMENT_LEVEL: Level = 4;

/// Error criteria and limits for [`RefinementAdapter`](crate::adapt::adapter::RefinementAdapter).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Blocks whose value or gradient exceeds this are refined; sibling
    /// groups strictly below it on both criteria are merged.
    pub tolerance: f64,
    /// Deepest level refinement may create.
    pub max_refinement_level: Level,
    /// Magnitude cap applied to primary values before the criteria are
    /// evaluated. `None` leaves values unclamped.
    pub maximum_data_value: Option<f64>,
    /// How a sibling group is folded back into its parent.
    pub aggregation: Aggregation,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_refinement_level: DEFAULT_MAX_REFINEMENT_LEVEL,
            maximum_data_value: None,
            aggregation: Aggregation::Mean,
        }
    }
}

impl RefinementConfig {
    /// Reject a negative or NaN tolerance and a non-positive or NaN cap.
    pub fn validate(&self) -> Result<(), VMeshError> {
        check_tolerance(self.tolerance)?;
        if let Some(cap) = self.maximum_data_value {
            check_cap(cap)?;
        }
        Ok(())
    }
}

pub(crate) fn check_tolerance(tolerance: f64) -> Result<(), VMeshError> {
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(VMeshError::InvalidConfig(format!(
            "tolerance must be a non-negative number, got {tolerance}"
        )));
    }
    Ok(())
}

pub(crate) fn check_cap(cap: f64) -> Result<(), VMeshError> {
    if cap.is_nan() || cap <= 0.0 {
        return Err(VMeshError::InvalidConfig(format!(
            "maximum data value must be positive, got {cap}"
        )));
    }
    Ok(())
}
