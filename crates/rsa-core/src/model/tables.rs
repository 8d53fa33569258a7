//! Static inputs of the model: interpretation prior weights, which languages offer the
//! alternative construction, the truth-conditional meaning table and construction costs.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConditionKey, Connector, Interpretation, Language, Utterance};

const DEFAULT_SUBJECT_WEIGHT: f64 = 0.80;
const DEFAULT_OBJECT_WEIGHT: f64 = 0.20;

/// Truth-conditional meaning of an utterance under an interpretation.
///
/// The finite clause is compatible with either referent; the alternative construction
/// only allows subject coreference.
pub const fn literal_meaning(utterance: Utterance, interpretation: Interpretation) -> bool {
    match utterance {
        Utterance::Finite => true,
        Utterance::Alternative => matches!(interpretation, Interpretation::Subject),
    }
}

/// Log-cost of producing `utterance` in a language/connector context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub language: Language,
    pub connector: Connector,
    pub utterance: Utterance,
    pub cost: f64,
}

impl CostEntry {
    pub const fn new(
        language: Language,
        connector: Connector,
        utterance: Utterance,
        cost: f64,
    ) -> Self {
        Self {
            language,
            connector,
            utterance,
            cost,
        }
    }
}

/// Tables consumed by the listener and speaker layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTables {
    /// Unnormalized prior weights over interpretations.
    #[serde(default = "default_interpretation_prior")]
    pub interpretation_prior: BTreeMap<Interpretation, f64>,
    /// Languages whose speakers may choose the alternative construction.
    #[serde(default = "default_alternative_languages")]
    pub alternative_languages: Vec<Language>,
    #[serde(default = "default_costs")]
    pub costs: Vec<CostEntry>,
}

impl Default for ModelTables {
    fn default() -> Self {
        Self {
            interpretation_prior: default_interpretation_prior(),
            alternative_languages: default_alternative_languages(),
            costs: default_costs(),
        }
    }
}

impl ModelTables {
    /// Check the tables without consulting any dataset.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for interpretation in Interpretation::ALL {
            let Some(weight) = self.interpretation_prior.get(&interpretation) else {
                return Err(ConfigurationError::InvalidField {
                    field: "interpretation_prior".to_string(),
                    message: format!("missing weight for '{interpretation}'"),
                });
            };
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigurationError::InvalidField {
                    field: format!("interpretation_prior.{interpretation}"),
                    message: format!("weight must be finite and non-negative, got {weight}"),
                });
            }
        }
        if self.interpretation_prior.values().sum::<f64>() <= 0.0 {
            return Err(ConfigurationError::InvalidField {
                field: "interpretation_prior".to_string(),
                message: "weights must not all be zero".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.costs {
            if !entry.cost.is_finite() {
                return Err(ConfigurationError::InvalidField {
                    field: format!(
                        "costs[{}_{}_{}]",
                        entry.utterance, entry.language, entry.connector
                    ),
                    message: format!("cost must be finite, got {}", entry.cost),
                });
            }
            if !seen.insert((entry.language, entry.connector, entry.utterance)) {
                return Err(ConfigurationError::DuplicateCost {
                    utterance: entry.utterance,
                    language: entry.language,
                    connector: entry.connector,
                });
            }
        }

        Ok(())
    }

    /// Utterances a speaker of `language` chooses between, in draw order.
    pub fn utterances_for(&self, language: Language) -> Vec<Utterance> {
        if self.alternative_languages.contains(&language) {
            Utterance::ALL.to_vec()
        } else {
            vec![Utterance::Finite]
        }
    }

    pub fn construction_cost(
        &self,
        utterance: Utterance,
        language: Language,
        connector: Connector,
    ) -> Result<f64, ConfigurationError> {
        self.costs
            .iter()
            .find(|entry| {
                entry.utterance == utterance
                    && entry.language == language
                    && entry.connector == connector
            })
            .map(|entry| entry.cost)
            .ok_or(ConfigurationError::MissingCost {
                utterance,
                language,
                connector,
            })
    }

    /// Ensure every utterance a speaker could produce in this condition has a cost.
    pub fn require_condition(&self, key: ConditionKey) -> Result<(), ConfigurationError> {
        let utterances = self.utterances_for(key.language);
        if !utterances.contains(&key.utterance) {
            return Err(ConfigurationError::UnavailableUtterance {
                utterance: key.utterance,
                language: key.language,
            });
        }
        for utterance in utterances {
            self.construction_cost(utterance, key.language, key.connector)?;
        }
        Ok(())
    }
}

fn default_interpretation_prior() -> BTreeMap<Interpretation, f64> {
    BTreeMap::from([
        (Interpretation::Subject, DEFAULT_SUBJECT_WEIGHT),
        (Interpretation::Object, DEFAULT_OBJECT_WEIGHT),
    ])
}

fn default_alternative_languages() -> Vec<Language> {
    Language::ALL
        .into_iter()
        .filter(|language| language.has_alternative())
        .collect()
}

fn default_costs() -> Vec<CostEntry> {
    use Connector::{After, Before};
    use Language::{English, French, German};
    use Utterance::{Alternative, Finite};

    vec![
        CostEntry::new(English, Before, Finite, -0.117),
        CostEntry::new(English, Before, Alternative, -2.207),
        CostEntry::new(English, After, Finite, -0.511),
        CostEntry::new(English, After, Alternative, -0.916),
        CostEntry::new(French, Before, Finite, -1.309),
        CostEntry::new(French, Before, Alternative, -0.315),
        CostEntry::new(French, After, Finite, -1.470),
        CostEntry::new(French, After, Alternative, -0.261),
        CostEntry::new(German, Before, Finite, 0.0),
        CostEntry::new(German, Before, Alternative, 0.0),
        CostEntry::new(German, After, Finite, 0.0),
        CostEntry::new(German, After, Alternative, 0.0),
    ]
}

/// Setup failures: tables or datasets that cannot drive the model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no construction cost for '{utterance}' in {language}/{connector}")]
    MissingCost {
        utterance: Utterance,
        language: Language,
        connector: Connector,
    },
    #[error("construction cost for '{utterance}' in {language}/{connector} defined more than once")]
    DuplicateCost {
        utterance: Utterance,
        language: Language,
        connector: Connector,
    },
    #[error("'{utterance}' is not a construction available in {language}")]
    UnavailableUtterance {
        utterance: Utterance,
        language: Language,
    },
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_validate() {
        ModelTables::default().validate().expect("defaults are valid");
    }

    #[test]
    fn meaning_table_matches_constructions() {
        assert!(literal_meaning(Utterance::Finite, Interpretation::Subject));
        assert!(literal_meaning(Utterance::Finite, Interpretation::Object));
        assert!(literal_meaning(Utterance::Alternative, Interpretation::Subject));
        assert!(!literal_meaning(Utterance::Alternative, Interpretation::Object));
    }

    #[test]
    fn english_before_finite_is_cheaper_than_alternative() {
        let tables = ModelTables::default();
        let finite = tables
            .construction_cost(Utterance::Finite, Language::English, Connector::Before)
            .expect("cost");
        let alternative = tables
            .construction_cost(Utterance::Alternative, Language::English, Connector::Before)
            .expect("cost");
        assert_eq!(finite, -0.117);
        assert_eq!(alternative, -2.207);
    }

    #[test]
    fn german_speakers_only_use_finite_clause() {
        let tables = ModelTables::default();
        assert_eq!(tables.utterances_for(Language::German), vec![Utterance::Finite]);
        assert_eq!(tables.utterances_for(Language::French), Utterance::ALL.to_vec());
    }

    #[test]
    fn missing_cost_is_reported_for_condition() {
        let mut tables = ModelTables::default();
        tables.costs.retain(|entry| {
            !(entry.language == Language::French && entry.connector == Connector::After)
        });
        let err = tables
            .require_condition("finite_french_after".parse().expect("key"))
            .expect_err("cost removed");
        assert!(matches!(
            err,
            ConfigurationError::MissingCost {
                language: Language::French,
                connector: Connector::After,
                ..
            }
        ));
    }

    #[test]
    fn alternative_condition_in_german_is_unavailable() {
        let tables = ModelTables::default();
        let err = tables
            .require_condition("alternative_german_before".parse().expect("key"))
            .expect_err("no alternative in german");
        assert!(matches!(err, ConfigurationError::UnavailableUtterance { .. }));
    }

    #[test]
    fn rejects_duplicate_and_negative_entries() {
        let mut tables = ModelTables::default();
        tables.costs.push(CostEntry::new(
            Language::English,
            Connector::Before,
            Utterance::Finite,
            -1.0,
        ));
        assert!(matches!(
            tables.validate(),
            Err(ConfigurationError::DuplicateCost { .. })
        ));

        let mut tables = ModelTables::default();
        tables
            .interpretation_prior
            .insert(Interpretation::Object, -0.2);
        assert!(matches!(
            tables.validate(),
            Err(ConfigurationError::InvalidField { .. })
        ));
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "interpretation_prior:\n  1-subject: 0.5\n  2-object: 0.5\n";
        let tables: ModelTables = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(tables.interpretation_prior[&Interpretation::Object], 0.5);
        assert_eq!(tables.costs.len(), 12);
        assert_eq!(tables.alternative_languages.len(), 2);
    }
}
