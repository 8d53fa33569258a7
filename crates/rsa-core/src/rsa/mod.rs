//! The three-layer Rational Speech Act model.
//!
//! Layers are called in a fixed order: the literal listener depends on nothing, the speaker
//! reasons about the literal listener, and the pragmatic listener inverts the speaker. Every
//! layer memoizes through the [`ModelCache`] owned by its [`RsaModel`].

mod evaluation;

pub use evaluation::{ConditionPrediction, PredictionRow, evaluate_conditions};

use std::sync::Arc;

use tracing::{Level, event};

use crate::infer::{CacheStats, Distribution, InferenceError, MemoCache, Outcome, enumerate};
use crate::model::{
    ConditionKey, ConfigurationError, Connector, Interpretation, Language, ModelTables,
    Utterance, literal_meaning,
};

type LiteralKey = (Utterance, Language, Connector);
type SpeakerKey = (Interpretation, Language, Connector, u64);
type PragmaticKey = (Utterance, Language, Connector, u64);

/// Per-layer memo tables. A fresh cache starts empty; nothing is ever evicted.
#[derive(Debug, Default)]
pub struct ModelCache {
    literal: MemoCache<LiteralKey, Interpretation>,
    speaker: MemoCache<SpeakerKey, Utterance>,
    pragmatic: MemoCache<PragmaticKey, Interpretation>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ModelCacheStats {
        ModelCacheStats {
            literal: self.literal.stats(),
            speaker: self.speaker.stats(),
            pragmatic: self.pragmatic.stats(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelCacheStats {
    pub literal: CacheStats,
    pub speaker: CacheStats,
    pub pragmatic: CacheStats,
}

/// Literal listener, pragmatic speaker and pragmatic listener over one set of tables.
///
/// Speaker and pragmatic entries are keyed on the exact bits of `alpha`. Repeated queries
/// at a fixed alpha (evaluation grids, repeated predictions) hit the cache, but a
/// random-walk chain produces a new key at almost every proposal, so a long fit grows the
/// cache by roughly one pragmatic and two speaker entries per condition per iteration.
/// Build a fresh model per fit when memory matters.
#[derive(Debug)]
pub struct RsaModel {
    tables: ModelTables,
    interpretation_prior: Distribution<Interpretation>,
    cache: ModelCache,
}

impl RsaModel {
    pub fn new(tables: ModelTables) -> Result<Self, ConfigurationError> {
        Self::with_cache(tables, ModelCache::new())
    }

    /// Build a model around a caller-supplied cache.
    pub fn with_cache(tables: ModelTables, cache: ModelCache) -> Result<Self, ConfigurationError> {
        tables.validate()?;
        let interpretation_prior = Distribution::from_weights(
            Interpretation::ALL
                .into_iter()
                .map(|interpretation| {
                    let weight = tables
                        .interpretation_prior
                        .get(&interpretation)
                        .copied()
                        .unwrap_or(0.0);
                    (interpretation, weight)
                }),
        )
        .map_err(|err| ConfigurationError::InvalidField {
            field: "interpretation_prior".to_string(),
            message: err.to_string(),
        })?;

        Ok(Self {
            tables,
            interpretation_prior,
            cache,
        })
    }

    pub fn tables(&self) -> &ModelTables {
        &self.tables
    }

    pub fn interpretation_prior(&self) -> &Distribution<Interpretation> {
        &self.interpretation_prior
    }

    pub fn cache_stats(&self) -> ModelCacheStats {
        self.cache.stats()
    }

    /// Uniform over the constructions available in `language`.
    pub fn utterance_prior(
        &self,
        language: Language,
    ) -> Result<Distribution<Utterance>, InferenceError> {
        Distribution::uniform(self.tables.utterances_for(language))
    }

    /// Truth-conditional interpretation of `utterance`.
    ///
    /// Language and connector do not change the result; they are kept so every layer shares
    /// the same argument shape.
    pub fn literal_listener(
        &self,
        utterance: Utterance,
        language: Language,
        connector: Connector,
    ) -> Result<Arc<Distribution<Interpretation>>, InferenceError> {
        self.cache
            .literal
            .get_or_try_insert_with((utterance, language, connector), || {
                enumerate(&self.interpretation_prior, |&interpretation| {
                    Ok(Outcome::new(interpretation)
                        .condition(literal_meaning(utterance, interpretation)))
                })
            })
    }

    /// Soft-max speaker choosing a construction to convey `interpretation`.
    ///
    /// Each utterance is weighted by `alpha * (log L0(interpretation | utterance) + cost)`.
    /// With `alpha == 0` the speaker reproduces its utterance prior.
    pub fn speaker(
        &self,
        interpretation: Interpretation,
        language: Language,
        connector: Connector,
        alpha: f64,
    ) -> Result<Arc<Distribution<Utterance>>, InferenceError> {
        check_rationality(alpha)?;
        self.cache.speaker.get_or_try_insert_with(
            (interpretation, language, connector, alpha.to_bits()),
            || {
                let prior = self.utterance_prior(language)?;
                enumerate(&prior, |&utterance| {
                    let listener = self.literal_listener(utterance, language, connector)?;
                    let cost = self
                        .tables
                        .construction_cost(utterance, language, connector)?;
                    let utility = listener.score(&interpretation) + cost;
                    Ok(Outcome::new(utterance).factor(rational_weight(alpha, utility)))
                })
            },
        )
    }

    /// Posterior over referents after hearing `utterance` from a speaker of rationality `alpha`.
    pub fn pragmatic_listener(
        &self,
        utterance: Utterance,
        language: Language,
        connector: Connector,
        alpha: f64,
    ) -> Result<Arc<Distribution<Interpretation>>, InferenceError> {
        check_rationality(alpha)?;
        self.cache.pragmatic.get_or_try_insert_with(
            (utterance, language, connector, alpha.to_bits()),
            || {
                let posterior = enumerate(&self.interpretation_prior, |&interpretation| {
                    let speaker = self.speaker(interpretation, language, connector, alpha)?;
                    Ok(Outcome::new(interpretation).observe(&speaker, &utterance))
                })?;
                if tracing::enabled!(target: "rsa_core::model", Level::TRACE) {
                    event!(
                        target: "rsa_core::model",
                        Level::TRACE,
                        utterance = %utterance,
                        language = %language,
                        connector = %connector,
                        alpha,
                        subject = posterior.prob(&Interpretation::Subject),
                    );
                }
                Ok(posterior)
            },
        )
    }

    /// Pragmatic listener for a condition key.
    pub fn predict(
        &self,
        condition: ConditionKey,
        alpha: f64,
    ) -> Result<Arc<Distribution<Interpretation>>, InferenceError> {
        self.pragmatic_listener(
            condition.utterance,
            condition.language,
            condition.connector,
            alpha,
        )
    }
}

fn check_rationality(alpha: f64) -> Result<(), InferenceError> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(InferenceError::InvalidRationality { alpha })
    }
}

// 0 * -inf is NaN; a speaker with no rationality ignores utility altogether.
fn rational_weight(alpha: f64, utility: f64) -> f64 {
    if alpha == 0.0 { 0.0 } else { alpha * utility }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn model() -> RsaModel {
        RsaModel::new(ModelTables::default()).expect("default tables")
    }

    fn contexts() -> Vec<(Language, Connector)> {
        Language::ALL
            .into_iter()
            .flat_map(|language| Connector::ALL.into_iter().map(move |c| (language, c)))
            .collect()
    }

    #[test]
    fn literal_finite_reproduces_prior() {
        let model = model();
        for (language, connector) in contexts() {
            let dist = model
                .literal_listener(Utterance::Finite, language, connector)
                .expect("proper");
            assert!((dist.prob(&Interpretation::Subject) - 0.8).abs() < TOLERANCE);
            assert!((dist.prob(&Interpretation::Object) - 0.2).abs() < TOLERANCE);
        }
    }

    #[test]
    fn literal_alternative_collapses_to_subject() {
        let model = model();
        for (language, connector) in contexts() {
            let dist = model
                .literal_listener(Utterance::Alternative, language, connector)
                .expect("proper");
            assert_eq!(dist.prob(&Interpretation::Subject), 1.0);
            assert_eq!(dist.prob(&Interpretation::Object), 0.0);
        }
    }

    #[test]
    fn german_speaker_always_uses_finite() {
        let model = model();
        for alpha in [0.0, 0.5, 0.93, 4.0, 10.0] {
            for interpretation in Interpretation::ALL {
                for connector in Connector::ALL {
                    let dist = model
                        .speaker(interpretation, Language::German, connector, alpha)
                        .expect("proper");
                    assert_eq!(dist.prob(&Utterance::Finite), 1.0);
                    assert_eq!(dist.len(), 1);
                }
            }
        }
    }

    #[test]
    fn zero_rationality_speaker_is_uniform() {
        let model = model();
        for interpretation in Interpretation::ALL {
            let dist = model
                .speaker(interpretation, Language::English, Connector::Before, 0.0)
                .expect("proper");
            assert!((dist.prob(&Utterance::Finite) - 0.5).abs() < TOLERANCE);
            assert!((dist.prob(&Utterance::Alternative) - 0.5).abs() < TOLERANCE);
        }
    }

    #[test]
    fn speaker_never_says_alternative_for_object() {
        let model = model();
        let dist = model
            .speaker(Interpretation::Object, Language::French, Connector::After, 0.93)
            .expect("proper");
        assert_eq!(dist.prob(&Utterance::Finite), 1.0);
    }

    #[test]
    fn speaker_weights_follow_softmax_of_utility() {
        let model = model();
        let alpha = 2.0;
        let dist = model
            .speaker(Interpretation::Subject, Language::English, Connector::After, alpha)
            .expect("proper");
        let finite = (alpha * (0.8_f64.ln() - 0.511)).exp();
        let alternative = (alpha * -0.916_f64).exp();
        let expected = finite / (finite + alternative);
        assert!((dist.prob(&Utterance::Finite) - expected).abs() < TOLERANCE);
    }

    #[test]
    fn pragmatic_listener_matches_closed_form() {
        let model = model();
        // alpha = 0.93 with the published tables.
        let expected = [
            (Language::English, Connector::Before, 0.772769),
            (Language::English, Connector::After, 0.684416),
            (Language::French, Connector::Before, 0.493725),
            (Language::French, Connector::After, 0.455155),
            (Language::German, Connector::Before, 0.8),
            (Language::German, Connector::After, 0.8),
        ];
        for (language, connector, subject) in expected {
            let dist = model
                .pragmatic_listener(Utterance::Finite, language, connector, 0.93)
                .expect("proper");
            assert!(
                (dist.prob(&Interpretation::Subject) - subject).abs() < 1e-5,
                "{language}/{connector}: {}",
                dist.prob(&Interpretation::Subject)
            );
            assert!((dist.total_mass() - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn alternative_in_german_is_improper() {
        let model = model();
        let err = model
            .pragmatic_listener(Utterance::Alternative, Language::German, Connector::Before, 1.0)
            .expect_err("german speakers never produce the alternative");
        assert_eq!(err, InferenceError::Improper { considered: 2 });
    }

    #[test]
    fn alternative_signals_subject_in_english() {
        let model = model();
        let dist = model
            .pragmatic_listener(Utterance::Alternative, Language::English, Connector::After, 1.5)
            .expect("proper");
        assert_eq!(dist.prob(&Interpretation::Subject), 1.0);
    }

    #[test]
    fn rejects_negative_or_non_finite_alpha() {
        let model = model();
        for alpha in [-0.1, f64::NAN, f64::INFINITY] {
            let result = model.pragmatic_listener(
                Utterance::Finite,
                Language::English,
                Connector::Before,
                alpha,
            );
            assert!(matches!(
                result,
                Err(InferenceError::InvalidRationality { .. })
            ));
        }
    }

    #[test]
    fn missing_cost_surfaces_as_configuration_error() {
        let mut tables = ModelTables::default();
        tables
            .costs
            .retain(|entry| entry.utterance != Utterance::Alternative);
        let model = RsaModel::new(tables).expect("tables still valid");
        let err = model
            .speaker(Interpretation::Subject, Language::English, Connector::Before, 1.0)
            .expect_err("alternative cost missing");
        assert!(matches!(
            err,
            InferenceError::Configuration(ConfigurationError::MissingCost { .. })
        ));
    }

    #[test]
    fn repeated_calls_are_served_from_cache() {
        let model = model();
        let first = model
            .pragmatic_listener(Utterance::Finite, Language::French, Connector::Before, 1.25)
            .expect("proper");
        let before = model.cache_stats();
        let second = model
            .pragmatic_listener(Utterance::Finite, Language::French, Connector::Before, 1.25)
            .expect("proper");
        let after = model.cache_stats();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(after.pragmatic.hits, before.pragmatic.hits + 1);
        assert_eq!(after.speaker, before.speaker);
        assert_eq!(before.speaker.entries, 2);
        // Both speaker calls share the two literal-listener entries for this context.
        assert_eq!(before.literal.entries, 2);
    }

    #[test]
    fn fresh_models_do_not_share_entries() {
        let first = model();
        first
            .pragmatic_listener(Utterance::Finite, Language::English, Connector::Before, 1.0)
            .expect("proper");
        let second = model();
        assert_eq!(second.cache_stats(), ModelCacheStats::default());
    }
}
