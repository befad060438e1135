//! Internal consistency checks for mesh storage.
//!
//! Checks run after batch mutations (`fill`, `clip`, refine, unrefine,
//! restore) rather than after every point update. They are compiled in for
//! debug builds and, in release builds, with the `check-invariants` feature.

use crate::mesh_error::VMeshError;

/// Structure with bookkeeping that must agree with its storage.
pub trait DebugInvariants {
    /// Panic on a violated invariant when invariant checking is enabled.
    fn debug_assert_invariants(&self);

    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), VMeshError>;

    /// Like [`validate_invariants`](Self::validate_invariants), but logs the
    /// violation at `error` level and reports only whether the check passed.
    fn invariants_hold(&self) -> bool {
        match self.validate_invariants() {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}");
                false
            }
        }
    }
}

/// Run a fallible invariant check and panic with context on failure, in
/// debug builds or with the `check-invariants` feature.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
