use statrs::function::factorial::ln_factorial;
use thiserror::Error;

const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LikelihoodError {
    #[error("{counts} counts scored against {probs} probabilities")]
    LengthMismatch { counts: usize, probs: usize },
    #[error("probability {value} at index {index} is not in [0, 1]")]
    InvalidProbability { index: usize, value: f64 },
    #[error("probabilities sum to {sum}, expected 1")]
    Unnormalized { sum: f64 },
}

/// Log-probability of observing `counts` under a multinomial with category probabilities
/// `probs` and `N = sum(counts)` trials.
///
/// A zero probability paired with a non-zero count yields `-inf`; callers treat that as an
/// impossible observation rather than an error.
pub fn multinomial_log_prob(counts: &[u64], probs: &[f64]) -> Result<f64, LikelihoodError> {
    if counts.len() != probs.len() {
        return Err(LikelihoodError::LengthMismatch {
            counts: counts.len(),
            probs: probs.len(),
        });
    }

    let mut sum = 0.0;
    for (index, &value) in probs.iter().enumerate() {
        if !(0.0..=1.0).contains(&value) {
            return Err(LikelihoodError::InvalidProbability { index, value });
        }
        sum += value;
    }
    if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        return Err(LikelihoodError::Unnormalized { sum });
    }

    let trials: u64 = counts.iter().sum();
    let mut log_prob = ln_factorial(trials);
    for (&count, &prob) in counts.iter().zip(probs) {
        if count == 0 {
            continue;
        }
        if prob == 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        log_prob += count as f64 * prob.ln() - ln_factorial(count);
    }
    Ok(log_prob)
}
