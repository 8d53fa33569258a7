use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use super::estimator::PosteriorSampleSet;

/// Point estimates and diagnostics pooled over every retained draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSummary {
    pub draws: usize,
    pub chains: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub median: f64,
    /// Probability mass of the equal-tailed interval `[lower, upper]`.
    pub credible_mass: f64,
    pub lower: f64,
    pub upper: f64,
    pub acceptance_rate: f64,
    /// Gelman-Rubin potential scale reduction; needs two or more chains.
    pub r_hat: Option<f64>,
    pub effective_sample_size: f64,
}

impl PosteriorSummary {
    /// Returns `None` when there are no draws or `credible_mass` is not in `(0, 1)`.
    pub fn from_chains(chains: &[PosteriorSampleSet], credible_mass: f64) -> Option<Self> {
        if !(credible_mass > 0.0 && credible_mass < 1.0) {
            return None;
        }
        let pooled: Vec<f64> = chains
            .iter()
            .flat_map(|chain| chain.samples().iter().copied())
            .collect();
        if pooled.is_empty() {
            return None;
        }

        let draws = pooled.len();
        let mean = pooled.iter().mean();
        let variance = if draws > 1 { pooled.iter().variance() } else { 0.0 };
        let tail = (1.0 - credible_mass) / 2.0;
        let mut ordered = Data::new(pooled);
        let median = ordered.quantile(0.5);
        let lower = ordered.quantile(tail);
        let upper = ordered.quantile(1.0 - tail);

        let proposals: usize = chains.iter().map(PosteriorSampleSet::proposals).sum();
        let accepted: usize = chains.iter().map(PosteriorSampleSet::accepted).sum();
        let acceptance_rate = if proposals == 0 {
            0.0
        } else {
            accepted as f64 / proposals as f64
        };

        let effective_sample_size = chains
            .iter()
            .filter(|chain| !chain.is_empty())
            .map(|chain| effective_sample_size(chain.samples()))
            .sum();

        Some(Self {
            draws,
            chains: chains.len(),
            mean,
            variance,
            std_dev: variance.sqrt(),
            median,
            credible_mass,
            lower,
            upper,
            acceptance_rate,
            r_hat: gelman_rubin(chains),
            effective_sample_size,
        })
    }
}

/// Potential scale reduction over chains truncated to a common length.
fn gelman_rubin(chains: &[PosteriorSampleSet]) -> Option<f64> {
    let m = chains.len();
    let n = chains.iter().map(PosteriorSampleSet::len).min()?;
    if m < 2 || n < 2 {
        return None;
    }

    let means: Vec<f64> = chains
        .iter()
        .map(|chain| chain.samples()[..n].iter().mean())
        .collect();
    let within = chains
        .iter()
        .map(|chain| chain.samples()[..n].iter().variance())
        .sum::<f64>()
        / m as f64;
    if within <= 0.0 {
        return None;
    }
    let between = n as f64 * means.iter().variance();
    let pooled = ((n - 1) as f64 * within + between) / n as f64;
    Some((pooled / within).sqrt())
}

/// Single-chain effective sample size using Geyer's initial positive sequence.
fn effective_sample_size(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 4 {
        return n as f64;
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let autocovariance = |lag: usize| {
        samples[..n - lag]
            .iter()
            .zip(&samples[lag..])
            .map(|(a, b)| (a - mean) * (b - mean))
            .sum::<f64>()
            / n as f64
    };
    let variance = autocovariance(0);
    if variance <= 0.0 {
        return n as f64;
    }

    let mut tau = -1.0;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = (autocovariance(lag) + autocovariance(lag + 1)) / variance;
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        lag += 2;
    }
    if tau <= 0.0 {
        return n as f64;
    }
    (n as f64 / tau).min(n as f64)
}
