//! Fixed-width numeric payload stored at one cell and refinement level.

use crate::topology::block_key::Level;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point element type of block payloads (`f32` or `f64`).
///
/// Thresholds, tolerances and geometry are always `f64`; payload elements
/// are converted at the comparison sites.
pub trait Scalar: Float + FromPrimitive + Debug + Default + Send + Sync + 'static {
    /// Widen to `f64` (NaN if the value has no `f64` representation).
    #[inline]
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }

    /// Narrow from `f64`, or `None` if the value is not representable.
    #[inline]
    fn try_from_f64(value: f64) -> Option<Self> {
        Self::from_f64(value)
    }
}

impl<T> Scalar for T where T: Float + FromPrimitive + Debug + Default + Send + Sync + 'static {}

/// A copy of one block: its payload and its refinement level.
///
/// Component 0 is the primary value (the density) used for clipping and
/// refinement criteria; the remaining components are caller-defined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Block<T, const W: usize> {
    /// Payload components.
    pub data: [T; W],
    /// Refinement level the block lives on.
    pub level: Level,
}

impl<T: Scalar, const W: usize> Block<T, W> {
    /// Block with the given payload.
    #[inline]
    pub fn new(data: [T; W], level: Level) -> Self {
        Self { data, level }
    }

    /// Block with an all-zero payload.
    #[inline]
    pub fn zeroed(level: Level) -> Self {
        Self {
            data: [T::zero(); W],
            level,
        }
    }

    /// The primary (density) component; zero for a zero-width payload.
    #[inline]
    pub fn primary(&self) -> T {
        primary(&self.data)
    }
}

#[inline]
pub(crate) fn primary<T: Scalar, const W: usize>(data: &[T; W]) -> T {
    data.first().copied().unwrap_or_else(T::zero)
}
