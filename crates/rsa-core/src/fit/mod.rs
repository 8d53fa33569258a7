//! Bayesian estimation of the speaker rationality parameter from comprehension counts.
//!
//! - `dataset`: observed interpretation counts keyed by experimental condition.
//! - `likelihood`: multinomial scoring of counts under predicted probabilities.
//! - `estimator`: Metropolis-Hastings over `alpha`, one or more independent chains.
//! - `summary`: posterior moments, credible intervals and convergence diagnostics.

mod dataset;
mod estimator;
mod likelihood;
mod summary;

pub use dataset::{Observation, ObservationDataset};
pub use estimator::{
    AlphaPrior, EstimatorConfig, EstimatorError, ParameterEstimator, PosteriorSampleSet,
    ProposalKernel,
};
pub use likelihood::{LikelihoodError, multinomial_log_prob};
pub use summary::PosteriorSummary;
