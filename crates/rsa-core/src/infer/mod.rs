//! Exact discrete inference.
//!
//! - `distribution`: immutable finite measures with scoring and sampling.
//! - `enumerate`: exhaustive enumeration over a declared prior with hard conditions and
//!   additive log-factors.
//! - `cache`: memo table keyed by full argument tuples, safe for concurrent readers.

mod cache;
mod distribution;
mod enumerate;

pub use cache::{CacheStats, MemoCache};
pub use distribution::Distribution;
pub use enumerate::{Outcome, enumerate};

use thiserror::Error;

use crate::model::ConfigurationError;

/// Failures raised while building a distribution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// Every enumerated combination was excluded; the model is ill-posed for these inputs.
    #[error("improper distribution: all {considered} enumerated combinations have zero weight")]
    Improper { considered: usize },
    #[error("weight {weight} is not a valid log-weight or probability")]
    InvalidWeight { weight: f64 },
    #[error("rationality must be finite and non-negative, got {alpha}")]
    InvalidRationality { alpha: f64 },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
