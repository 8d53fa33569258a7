//! Metropolis-Hastings estimation of the speaker rationality parameter.

use std::thread;
use std::time::Instant;

use rand::distributions::Distribution as _;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal, Uniform};
use thiserror::Error;
use tracing::{Level, event};

use super::dataset::{Observation, ObservationDataset};
use super::likelihood::{LikelihoodError, multinomial_log_prob};
use crate::infer::InferenceError;
use crate::model::{ConditionKey, ConfigurationError};
use crate::rsa::RsaModel;

const DEFAULT_SAMPLES: usize = 10_000;
const DEFAULT_BURN: usize = 2_000;
const DEFAULT_STEP: f64 = 0.1;
const DEFAULT_INIT_ATTEMPTS: usize = 100;
const DEFAULT_PROGRESS_INTERVAL: usize = 1_000;

/// How a new `alpha` is proposed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalKernel {
    /// Symmetric Gaussian step around the current value.
    RandomWalk { step: f64 },
    /// Independent draw from the prior, ignoring the current value.
    Prior,
}

impl Default for ProposalKernel {
    fn default() -> Self {
        ProposalKernel::RandomWalk { step: DEFAULT_STEP }
    }
}

/// Uniform prior bounds for `alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaPrior {
    pub lower: f64,
    pub upper: f64,
}

impl Default for AlphaPrior {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 10.0,
        }
    }
}

impl AlphaPrior {
    pub fn contains(&self, alpha: f64) -> bool {
        (self.lower..=self.upper).contains(&alpha)
    }

    fn density(&self) -> Result<Uniform, ConfigurationError> {
        if self.lower < 0.0 {
            return Err(ConfigurationError::InvalidField {
                field: "prior.lower".to_string(),
                message: format!("rationality cannot be negative, got {}", self.lower),
            });
        }
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(ConfigurationError::InvalidField {
                field: "prior".to_string(),
                message: format!(
                    "bounds must be finite with lower < upper, got [{}, {}]",
                    self.lower, self.upper
                ),
            });
        }
        Uniform::new(self.lower, self.upper).map_err(|err| ConfigurationError::InvalidField {
            field: "prior".to_string(),
            message: format!("invalid bounds [{}, {}]: {err}", self.lower, self.upper),
        })
    }
}

/// Run parameters for one estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Retained draws per chain.
    pub samples: usize,
    /// Iterations discarded before the first retained draw.
    pub burn: usize,
    /// Keep one draw every `thin` iterations after burn-in.
    pub thin: usize,
    pub prior: AlphaPrior,
    pub proposal: ProposalKernel,
    /// Starting value; drawn from the prior when unset.
    pub initial_alpha: Option<f64>,
    /// Prior draws tried before giving up on finding a finite starting point.
    pub init_attempts: usize,
    /// Iterations between debug progress events; 0 disables them.
    pub progress_interval: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            burn: DEFAULT_BURN,
            thin: 1,
            prior: AlphaPrior::default(),
            proposal: ProposalKernel::default(),
            initial_alpha: None,
            init_attempts: DEFAULT_INIT_ATTEMPTS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.samples == 0 {
            return Err(ConfigurationError::InvalidField {
                field: "samples".to_string(),
                message: "number of samples must be greater than zero".to_string(),
            });
        }
        if self.thin == 0 {
            return Err(ConfigurationError::InvalidField {
                field: "thin".to_string(),
                message: "thinning interval must be at least 1".to_string(),
            });
        }
        if self.init_attempts == 0 {
            return Err(ConfigurationError::InvalidField {
                field: "init_attempts".to_string(),
                message: "at least one initialisation attempt is required".to_string(),
            });
        }
        self.prior.density()?;
        if let ProposalKernel::RandomWalk { step } = self.proposal {
            if !step.is_finite() || step <= 0.0 {
                return Err(ConfigurationError::InvalidField {
                    field: "proposal.step".to_string(),
                    message: format!("step must be positive and finite, got {step}"),
                });
            }
        }
        if let Some(alpha) = self.initial_alpha {
            if !self.prior.contains(alpha) {
                return Err(ConfigurationError::InvalidField {
                    field: "initial_alpha".to_string(),
                    message: format!(
                        "{alpha} lies outside the prior [{}, {}]",
                        self.prior.lower, self.prior.upper
                    ),
                });
            }
        }
        Ok(())
    }

    /// Total iterations a chain runs, burn-in included.
    pub fn iterations(&self) -> usize {
        self.burn + self.samples * self.thin
    }
}

/// Retained draws of one chain plus its acceptance bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSampleSet {
    chain: usize,
    initial_alpha: f64,
    samples: Vec<f64>,
    proposals: usize,
    accepted: usize,
}

impl PosteriorSampleSet {
    pub(crate) fn new(
        chain: usize,
        initial_alpha: f64,
        samples: Vec<f64>,
        proposals: usize,
        accepted: usize,
    ) -> Self {
        Self {
            chain,
            initial_alpha,
            samples,
            proposals,
            accepted,
        }
    }

    pub fn chain(&self) -> usize {
        self.chain
    }

    pub fn initial_alpha(&self) -> f64 {
        self.initial_alpha
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn proposals(&self) -> usize {
        self.proposals
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.proposals == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposals as f64
        }
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("model evaluation failed for {condition} at alpha {alpha}: {source}")]
    Inference {
        condition: ConditionKey,
        alpha: f64,
        #[source]
        source: InferenceError,
    },
    #[error("could not score {condition}: {source}")]
    Likelihood {
        condition: ConditionKey,
        #[source]
        source: LikelihoodError,
    },
    #[error("no starting alpha with finite posterior density after {attempts} attempts")]
    Initialization { attempts: usize },
    #[error("chain {chain} panicked")]
    ChainPanicked { chain: usize },
}

/// Samples the posterior over `alpha` given observed counts, re-running the pragmatic
/// listener for every condition at each proposal.
#[derive(Debug)]
pub struct ParameterEstimator<'a> {
    model: &'a RsaModel,
    observations: Vec<Observation>,
    config: EstimatorConfig,
    prior: Uniform,
    step: Option<Normal>,
}

impl<'a> ParameterEstimator<'a> {
    /// Validate the configuration and dataset against the model's tables.
    pub fn new(
        model: &'a RsaModel,
        dataset: &ObservationDataset,
        config: EstimatorConfig,
    ) -> Result<Self, EstimatorError> {
        config.validate()?;
        dataset.validate(model.tables())?;
        let prior = config.prior.density()?;
        let step = match config.proposal {
            ProposalKernel::RandomWalk { step } => Some(Normal::new(0.0, step).map_err(|err| {
                ConfigurationError::InvalidField {
                    field: "proposal.step".to_string(),
                    message: err.to_string(),
                }
            })?),
            ProposalKernel::Prior => None,
        };

        Ok(Self {
            model,
            observations: dataset.observations(),
            config,
            prior,
            step,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn log_prior(&self, alpha: f64) -> f64 {
        self.prior.ln_pdf(alpha)
    }

    /// Sum of multinomial log-likelihoods over all observed conditions.
    ///
    /// Improper model outputs and impossible observations yield `-inf`; configuration
    /// problems are returned as errors.
    pub fn log_likelihood(&self, alpha: f64) -> Result<f64, EstimatorError> {
        let mut total = 0.0;
        for observation in &self.observations {
            let condition = observation.condition;
            let predicted = match self.model.predict(condition, alpha) {
                Ok(dist) => dist,
                Err(InferenceError::Improper { .. }) => return Ok(f64::NEG_INFINITY),
                Err(InferenceError::Configuration(err)) => return Err(err.into()),
                Err(source) => {
                    return Err(EstimatorError::Inference {
                        condition,
                        alpha,
                        source,
                    });
                }
            };
            let probs: Vec<f64> = observation
                .interpretations
                .iter()
                .map(|interpretation| predicted.prob(interpretation))
                .collect();
            let score = multinomial_log_prob(&observation.counts, &probs)
                .map_err(|source| EstimatorError::Likelihood { condition, source })?;
            if score == f64::NEG_INFINITY {
                return Ok(f64::NEG_INFINITY);
            }
            total += score;
        }
        Ok(total)
    }

    /// Unnormalized log posterior; values outside the prior never reach the model.
    pub fn log_posterior(&self, alpha: f64) -> Result<f64, EstimatorError> {
        let log_prior = self.log_prior(alpha);
        if !log_prior.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(log_prior + self.log_likelihood(alpha)?)
    }

    /// Run a single chain with the supplied generator.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PosteriorSampleSet, EstimatorError> {
        self.run_chain(0, rng)
    }

    /// Run `chains` independent chains in parallel; chain `c` is seeded with `seed + c`.
    pub fn run_chains(
        &self,
        chains: usize,
        seed: u64,
    ) -> Result<Vec<PosteriorSampleSet>, EstimatorError> {
        if chains == 0 {
            return Err(ConfigurationError::InvalidField {
                field: "chains".to_string(),
                message: "at least one chain is required".to_string(),
            }
            .into());
        }

        thread::scope(|scope| {
            let handles: Vec<_> = (0..chains)
                .map(|chain| {
                    scope.spawn(move || {
                        let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(chain as u64));
                        self.run_chain(chain, &mut rng)
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(chain, handle)| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(EstimatorError::ChainPanicked { chain }),
                })
                .collect()
        })
    }

    fn run_chain<R: Rng + ?Sized>(
        &self,
        chain: usize,
        rng: &mut R,
    ) -> Result<PosteriorSampleSet, EstimatorError> {
        let started = Instant::now();
        let (initial_alpha, mut current_log_post) = self.initial_state(chain, rng)?;
        let mut current = initial_alpha;
        let burn = self.config.burn;
        let thin = self.config.thin;
        let iterations = self.config.iterations();

        let mut samples = Vec::with_capacity(self.config.samples);
        let mut accepted = 0usize;

        for iteration in 0..iterations {
            let (candidate, log_hastings) = self.propose(current, rng);
            let candidate_log_post = self.log_posterior(candidate)?;
            let log_ratio = candidate_log_post - current_log_post + log_hastings;
            if accept(log_ratio, rng) {
                current = candidate;
                current_log_post = candidate_log_post;
                accepted += 1;
            }

            if iteration >= burn && (iteration - burn + 1) % thin == 0 {
                samples.push(current);
            }

            let interval = self.config.progress_interval;
            if interval > 0
                && (iteration + 1) % interval == 0
                && tracing::enabled!(target: "rsa_core::mcmc", Level::DEBUG)
            {
                event!(
                    target: "rsa_core::mcmc",
                    Level::DEBUG,
                    chain,
                    iteration = iteration + 1,
                    alpha = current,
                    log_posterior = current_log_post,
                    acceptance_rate = accepted as f64 / (iteration + 1) as f64,
                );
            }
        }

        let result = PosteriorSampleSet::new(chain, initial_alpha, samples, iterations, accepted);

        if tracing::enabled!(target: "rsa_core::chain", Level::INFO) {
            event!(
                target: "rsa_core::chain",
                Level::INFO,
                chain,
                initial_alpha,
                samples = result.len(),
                proposals = result.proposals,
                acceptance_rate = result.acceptance_rate(),
                mean_alpha = result.mean(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
            );
        }

        Ok(result)
    }

    fn initial_state<R: Rng + ?Sized>(
        &self,
        chain: usize,
        rng: &mut R,
    ) -> Result<(f64, f64), EstimatorError> {
        if let Some(alpha) = self.config.initial_alpha {
            let log_post = self.log_posterior(alpha)?;
            if log_post.is_finite() {
                return Ok((alpha, log_post));
            }
            return Err(EstimatorError::Initialization { attempts: 1 });
        }

        let attempts = self.config.init_attempts;
        for attempt in 1..=attempts {
            let alpha = rng.gen_range(self.config.prior.lower..self.config.prior.upper);
            let log_post = self.log_posterior(alpha)?;
            if log_post.is_finite() {
                if attempt > 1 {
                    tracing::warn!(
                        target: "rsa_core::estimator",
                        chain,
                        attempt,
                        alpha,
                        "initial draws had zero posterior density"
                    );
                }
                return Ok((alpha, log_post));
            }
        }
        Err(EstimatorError::Initialization { attempts })
    }

    /// Next candidate and its Hastings correction `ln q(current | candidate) - ln q(candidate | current)`.
    fn propose<R: Rng + ?Sized>(&self, current: f64, rng: &mut R) -> (f64, f64) {
        match self.step.as_ref() {
            Some(step) => (current + step.sample(rng), 0.0),
            None => {
                let candidate = rng.gen_range(self.config.prior.lower..self.config.prior.upper);
                (
                    candidate,
                    self.log_prior(current) - self.log_prior(candidate),
                )
            }
        }
    }
}

fn accept<R: Rng + ?Sized>(log_ratio: f64, rng: &mut R) -> bool {
    if log_ratio.is_nan() {
        return false;
    }
    if log_ratio >= 0.0 {
        return true;
    }
    let u: f64 = rng.gen_range(0.0..1.0);
    u.ln() < log_ratio
}
