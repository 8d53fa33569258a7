use super::{Distribution, InferenceError};

/// Result of running a generative procedure on one enumerated choice.
///
/// `condition` is a hard filter, `factor` adds a log-weight and `observe` scores an observed
/// value under a nested distribution (equivalent to factoring by that score).
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<R> {
    value: R,
    log_weight: f64,
    admissible: bool,
}

impl<R> Outcome<R> {
    pub fn new(value: R) -> Self {
        Self {
            value,
            log_weight: 0.0,
            admissible: true,
        }
    }

    pub fn condition(mut self, holds: bool) -> Self {
        self.admissible &= holds;
        self
    }

    pub fn factor(mut self, log_weight: f64) -> Self {
        self.log_weight += log_weight;
        self
    }

    pub fn observe<T: Clone + PartialEq>(self, dist: &Distribution<T>, observed: &T) -> Self {
        self.factor(dist.score(observed))
    }

    pub fn value(&self) -> &R {
        &self.value
    }

    pub fn log_weight(&self) -> f64 {
        self.log_weight
    }

    pub fn is_admissible(&self) -> bool {
        self.admissible
    }
}

/// Exact inference by exhaustive enumeration of `prior`.
///
/// Every support element is passed to `procedure`; its joint log-weight is the prior
/// log-probability plus the outcome's factors. Excluded or zero-weight combinations are
/// dropped, survivors are grouped by returned value and renormalized. Multi-variable models
/// declare their Cartesian product with [`Distribution::product`].
pub fn enumerate<T, R, F>(
    prior: &Distribution<T>,
    mut procedure: F,
) -> Result<Distribution<R>, InferenceError>
where
    T: Clone + PartialEq,
    R: Clone + PartialEq,
    F: FnMut(&T) -> Result<Outcome<R>, InferenceError>,
{
    let considered = prior.len();
    let mut weighted = Vec::with_capacity(considered);
    for (choice, log_prior) in prior.log_iter() {
        let outcome = procedure(choice)?;
        if !outcome.admissible {
            continue;
        }
        let log_weight = log_prior + outcome.log_weight;
        if log_weight.is_nan() {
            return Err(InferenceError::InvalidWeight { weight: log_weight });
        }
        weighted.push((outcome.value, log_weight));
    }

    Distribution::from_log_weights(weighted).map_err(|err| match err {
        InferenceError::Improper { .. } => InferenceError::Improper { considered },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn die() -> Distribution<u8> {
        Distribution::uniform(1..=6).expect("die")
    }

    #[test]
    fn hard_condition_filters_support() {
        let even = enumerate(&die(), |&face| Ok(Outcome::new(face).condition(face % 2 == 0)))
            .expect("proper");
        assert_eq!(even.len(), 3);
        assert!((even.prob(&4) - 1.0 / 3.0).abs() < TOLERANCE);
        assert_eq!(even.prob(&3), 0.0);
    }

    #[test]
    fn results_group_by_return_value() {
        let parity = enumerate(&die(), |&face| Ok(Outcome::new(face % 2 == 0))).expect("proper");
        assert_eq!(parity.len(), 2);
        assert!((parity.prob(&true) - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn factor_reweights_combinations() {
        let dist = enumerate(&die(), |&face| {
            Ok(Outcome::new(face > 3).factor(if face == 6 { 3.0_f64.ln() } else { 0.0 }))
        })
        .expect("proper");
        // Faces 4 and 5 weigh 1, face 6 weighs 3: 5 of 8 units are "high".
        assert!((dist.prob(&true) - 5.0 / 8.0).abs() < TOLERANCE);
    }

    #[test]
    fn cartesian_product_of_two_choices() {
        let joint = die().product(&die());
        let sums = enumerate(&joint, |&(a, b)| Ok(Outcome::new(a + b).condition(a != b)))
            .expect("proper");
        assert!((sums.total_mass() - 1.0).abs() < TOLERANCE);
        // 30 ordered pairs with distinct faces, two of which sum to 4: (1,3) and (3,1).
        assert!((sums.prob(&4) - 2.0 / 30.0).abs() < TOLERANCE);
        assert_eq!(sums.prob(&2), 0.0);
    }

    #[test]
    fn unsatisfiable_condition_is_improper() {
        let err = enumerate(&die(), |&face| Ok(Outcome::new(face).condition(face > 6)))
            .expect_err("no survivors");
        assert_eq!(err, InferenceError::Improper { considered: 6 });
    }

    #[test]
    fn observe_scores_nested_distribution() {
        let coin = Distribution::from_weights([("fair", 0.5), ("biased", 0.5)]).expect("prior");
        let posterior = enumerate(&coin, |&kind| {
            let heads = match kind {
                "fair" => Distribution::from_weights([(true, 0.5), (false, 0.5)])?,
                _ => Distribution::from_weights([(true, 0.9), (false, 0.1)])?,
            };
            Ok(Outcome::new(kind).observe(&heads, &true))
        })
        .expect("proper");
        assert!((posterior.prob(&"biased") - 0.9 / 1.4).abs() < TOLERANCE);
    }

    #[test]
    fn nested_errors_propagate() {
        let err = enumerate(&die(), |_| -> Result<Outcome<u8>, InferenceError> {
            Err(InferenceError::Improper { considered: 1 })
        })
        .expect_err("nested failure");
        assert_eq!(err, InferenceError::Improper { considered: 1 });
    }
}
