//! Adaptive refinement driven by per-block value and gradient criteria.
//!
//! - [`criteria`]: the value and gradient error proxies.
//! - [`transfer`]: prolongation strategies and the aggregation rule.
//! - [`config`]: tolerance, level cap and value cap.
//! - [`adapter`]: the [`RefinementAdapter`] controller.

pub mod adapter;
pub mod config;
pub mod criteria;
pub mod transfer;

pub use adapter::{AdaptationReport, AdaptivitySelection, RefinementAdapter};
pub use config::RefinementConfig;
pub use transfer::{
    Aggregation, CopyProlongation, LinearProlongation, ProlongWith, Prolongation,
    SplitProlongation,
};
