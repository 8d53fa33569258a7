//! Finite discrete distributions stored as normalized log-probabilities.

use rand::Rng;

use super::InferenceError;

/// Normalized measure over a finite support.
///
/// Entries keep the order in which values were first produced, so iteration (and therefore
/// any downstream output) is deterministic. Values outside the support score `-inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution<T> {
    entries: Vec<(T, f64)>,
}

impl<T: Clone + PartialEq> Distribution<T> {
    /// Point mass on `value`.
    pub fn delta(value: T) -> Self {
        Self {
            entries: vec![(value, 0.0)],
        }
    }

    /// Uniform over `values`; duplicates accumulate mass.
    pub fn uniform(values: impl IntoIterator<Item = T>) -> Result<Self, InferenceError> {
        Self::from_log_weights(values.into_iter().map(|value| (value, 0.0)))
    }

    /// Build from non-negative (unnormalized) probability weights.
    pub fn from_weights(
        weights: impl IntoIterator<Item = (T, f64)>,
    ) -> Result<Self, InferenceError> {
        let mut logged = Vec::new();
        for (value, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(InferenceError::InvalidWeight { weight });
            }
            logged.push((value, weight.ln()));
        }
        Self::from_log_weights(logged)
    }

    /// Build from unnormalized log-weights.
    ///
    /// Entries sharing a value are merged with log-sum-exp; `-inf` entries are dropped. Fails
    /// with [`InferenceError::Improper`] when no finite mass remains.
    pub fn from_log_weights(
        weights: impl IntoIterator<Item = (T, f64)>,
    ) -> Result<Self, InferenceError> {
        let weights: Vec<(T, f64)> = weights.into_iter().collect();
        let considered = weights.len();

        let mut max = f64::NEG_INFINITY;
        for (_, log_weight) in &weights {
            if log_weight.is_nan() || *log_weight == f64::INFINITY {
                return Err(InferenceError::InvalidWeight {
                    weight: *log_weight,
                });
            }
            max = max.max(*log_weight);
        }
        if max == f64::NEG_INFINITY {
            return Err(InferenceError::Improper { considered });
        }

        // Accumulate exp(w - max) per distinct value, preserving first-seen order.
        let mut groups: Vec<(T, f64)> = Vec::new();
        for (value, log_weight) in weights {
            if log_weight == f64::NEG_INFINITY {
                continue;
            }
            let scaled = (log_weight - max).exp();
            match groups.iter_mut().find(|(existing, _)| *existing == value) {
                Some((_, mass)) => *mass += scaled,
                None => groups.push((value, scaled)),
            }
        }

        let total: f64 = groups.iter().map(|(_, mass)| mass).sum();
        let log_total = total.ln();
        let entries = groups
            .into_iter()
            .map(|(value, mass)| (value, mass.ln() - log_total))
            .collect();
        Ok(Self { entries })
    }

    /// Log-probability of `value`, `-inf` outside the support.
    pub fn score(&self, value: &T) -> f64 {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == value)
            .map(|(_, log_prob)| *log_prob)
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn prob(&self, value: &T) -> f64 {
        self.score(value).exp()
    }

    pub fn support(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|(value, _)| value)
    }

    /// `(value, probability)` pairs in support order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.entries
            .iter()
            .map(|(value, log_prob)| (value, log_prob.exp()))
    }

    /// `(value, log-probability)` pairs in support order.
    pub fn log_iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.entries
            .iter()
            .map(|(value, log_prob)| (value, *log_prob))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of probabilities; 1 up to rounding for every constructed distribution.
    pub fn total_mass(&self) -> f64 {
        self.iter().map(|(_, prob)| prob).sum()
    }

    pub fn expectation(&self, mut f: impl FnMut(&T) -> f64) -> f64 {
        self.iter().map(|(value, prob)| prob * f(value)).sum()
    }

    /// Most probable value; ties resolve to the earliest support entry.
    pub fn mode(&self) -> &T {
        let mut best = &self.entries[0];
        for entry in &self.entries[1..] {
            if entry.1 > best.1 {
                best = entry;
            }
        }
        &best.0
    }

    /// Draw a value proportionally to its probability.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        let mut choice = rng.gen_range(0.0..1.0);
        for (value, prob) in self.iter() {
            if choice < prob {
                return value.clone();
            }
            choice -= prob;
        }
        // Rounding can leave a sliver of mass past the last entry.
        self.entries[self.entries.len() - 1].0.clone()
    }

    /// Independent joint distribution over pairs, used to declare Cartesian priors.
    pub fn product<U: Clone + PartialEq>(&self, other: &Distribution<U>) -> Distribution<(T, U)> {
        let mut entries = Vec::with_capacity(self.len() * other.len());
        for (left, left_log) in self.log_iter() {
            for (right, right_log) in other.log_iter() {
                entries.push(((left.clone(), right.clone()), left_log + right_log));
            }
        }
        Distribution { entries }
    }
}
