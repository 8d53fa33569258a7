use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    ConditionKey, ConfigurationError, Connector, Interpretation, Language, ModelTables, Utterance,
};

/// Observed interpretation counts per experimental condition.
///
/// Both maps are ordered, so conditions and interpretations are always visited in the same
/// order (conditions by key, then subject before object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationDataset {
    conditions: BTreeMap<ConditionKey, BTreeMap<Interpretation, u64>>,
}

impl ObservationDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts from the cross-linguistic comprehension experiment (English and French).
    pub fn comprehension_study() -> Self {
        use Connector::{After, Before};
        use Interpretation::{Object, Subject};
        use Language::{English, French};

        let mut dataset = Self::new();
        for (language, connector, subject, object) in [
            (English, Before, 229, 57),
            (English, After, 199, 90),
            (French, Before, 251, 395),
            (French, After, 347, 296),
        ] {
            dataset.insert(
                ConditionKey::new(Utterance::Finite, language, connector),
                [(Subject, subject), (Object, object)],
            );
        }
        dataset
    }

    /// Parse the `{"finite_english_before": {"subject": 229, "object": 57}, ...}` layout.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Replace the counts recorded for `condition`.
    pub fn insert(
        &mut self,
        condition: ConditionKey,
        counts: impl IntoIterator<Item = (Interpretation, u64)>,
    ) {
        self.conditions
            .insert(condition, counts.into_iter().collect());
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = ConditionKey> + '_ {
        self.conditions.keys().copied()
    }

    pub fn counts(&self, condition: &ConditionKey) -> Option<&BTreeMap<Interpretation, u64>> {
        self.conditions.get(condition)
    }

    /// Total number of trials across all conditions.
    pub fn trials(&self) -> u64 {
        self.conditions
            .values()
            .flat_map(|counts| counts.values())
            .sum()
    }

    /// Check that every condition can be scored against model predictions.
    ///
    /// Each condition must list a count for every interpretation (so predicted probabilities
    /// sum to one) and must be resolvable against the cost table.
    pub fn validate(&self, tables: &ModelTables) -> Result<(), ConfigurationError> {
        if self.is_empty() {
            return Err(ConfigurationError::InvalidField {
                field: "data".to_string(),
                message: "observation dataset must contain at least one condition".to_string(),
            });
        }

        for (condition, counts) in &self.conditions {
            for interpretation in Interpretation::ALL {
                if !counts.contains_key(&interpretation) {
                    return Err(ConfigurationError::InvalidField {
                        field: format!("data.{condition}"),
                        message: format!("missing count for '{interpretation}'"),
                    });
                }
            }
            tables.require_condition(*condition)?;
        }
        Ok(())
    }

    /// Flatten into scoring order.
    pub fn observations(&self) -> Vec<Observation> {
        self.conditions
            .iter()
            .map(|(condition, counts)| Observation {
                condition: *condition,
                interpretations: counts.keys().copied().collect(),
                counts: counts.values().copied().collect(),
            })
            .collect()
    }
}

/// One condition's counts laid out in interpretation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub condition: ConditionKey,
    pub interpretations: Vec<Interpretation>,
    pub counts: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comprehension_study_has_four_conditions() {
        let dataset = ObservationDataset::comprehension_study();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.trials(), 229 + 57 + 199 + 90 + 251 + 395 + 347 + 296);
        dataset
            .validate(&ModelTables::default())
            .expect("valid against default tables");
    }

    #[test]
    fn observations_follow_sorted_key_order() {
        let dataset = ObservationDataset::comprehension_study();
        let observations = dataset.observations();
        let keys: Vec<String> = observations
            .iter()
            .map(|obs| obs.condition.to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "finite_english_before",
                "finite_english_after",
                "finite_french_before",
                "finite_french_after",
            ]
        );
        assert_eq!(
            observations[0].interpretations,
            vec![Interpretation::Subject, Interpretation::Object]
        );
        assert_eq!(observations[0].counts, vec![229, 57]);
    }

    #[test]
    fn parses_json_with_either_label_style() {
        let raw = r#"{
            "finite_english_before": {"subject": 229, "object": 57},
            "finite_french_after": {"1-subject": 347, "2-object": 296}
        }"#;
        let dataset = ObservationDataset::from_json_str(raw).expect("json");
        let key = ConditionKey::new(Utterance::Finite, Language::French, Connector::After);
        let counts = dataset.counts(&key).expect("present");
        assert_eq!(counts[&Interpretation::Subject], 347);
        assert_eq!(counts[&Interpretation::Object], 296);
    }

    #[test]
    fn rejects_bad_condition_keys_in_json() {
        let raw = r#"{"finite_english": {"subject": 1, "object": 1}}"#;
        assert!(ObservationDataset::from_json_str(raw).is_err());
    }

    #[test]
    fn validation_requires_every_interpretation() {
        let mut dataset = ObservationDataset::new();
        dataset.insert(
            "finite_english_before".parse().expect("key"),
            [(Interpretation::Subject, 10)],
        );
        let err = dataset
            .validate(&ModelTables::default())
            .expect_err("object count missing");
        assert!(matches!(err, ConfigurationError::InvalidField { .. }));
    }

    #[test]
    fn validation_rejects_empty_and_unresolvable_data() {
        assert!(ObservationDataset::new()
            .validate(&ModelTables::default())
            .is_err());

        let mut dataset = ObservationDataset::new();
        dataset.insert(
            "alternative_german_after".parse().expect("key"),
            [(Interpretation::Subject, 3), (Interpretation::Object, 1)],
        );
        assert!(matches!(
            dataset.validate(&ModelTables::default()),
            Err(ConfigurationError::UnavailableUtterance { .. })
        ));
    }
}
