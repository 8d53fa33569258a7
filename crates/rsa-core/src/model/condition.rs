use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Connector, Language, Utterance};

/// One experimental cell: the form presented, its language and the connector.
///
/// The textual form is `utterance_language_connector` (e.g. `finite_english_before`),
/// which is also how conditions are keyed in observation datasets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ConditionKey {
    pub utterance: Utterance,
    pub language: Language,
    pub connector: Connector,
}

impl ConditionKey {
    pub const fn new(utterance: Utterance, language: Language, connector: Connector) -> Self {
        Self {
            utterance,
            language,
            connector,
        }
    }

    /// The six cells the model is reported on: every language and connector with a finite clause.
    pub fn evaluation_grid() -> Vec<ConditionKey> {
        let mut keys = Vec::with_capacity(Language::ALL.len() * Connector::ALL.len());
        for language in Language::ALL {
            for connector in Connector::ALL {
                keys.push(ConditionKey::new(Utterance::Finite, language, connector));
            }
        }
        keys
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.utterance, self.language, self.connector)
    }
}

impl FromStr for ConditionKey {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.trim().split('_');
        let (Some(utterance), Some(language), Some(connector), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedCondition(raw.to_string()));
        };
        Ok(Self::new(
            utterance.parse()?,
            language.parse()?,
            connector.parse()?,
        ))
    }
}

impl TryFrom<String> for ConditionKey {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConditionKey> for String {
    fn from(key: ConditionKey) -> Self {
        key.to_string()
    }
}

/// Failures turning labels into model vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown {kind} '{value}'")]
    Unknown { kind: &'static str, value: String },
    #[error("condition key '{0}' must have the form utterance_language_connector")]
    MalformedCondition(String),
}

impl ParseError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        ParseError::Unknown {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_underscore_separated_key() {
        let key: ConditionKey = "finite_french_after".parse().expect("valid key");
        assert_eq!(
            key,
            ConditionKey::new(Utterance::Finite, Language::French, Connector::After)
        );
        assert_eq!(key.to_string(), "finite_french_after");
    }

    #[test]
    fn rejects_wrong_arity_and_unknown_parts() {
        assert!(matches!(
            "finite_english".parse::<ConditionKey>(),
            Err(ParseError::MalformedCondition(_))
        ));
        assert!(matches!(
            "finite_english_before_extra".parse::<ConditionKey>(),
            Err(ParseError::MalformedCondition(_))
        ));
        assert!(matches!(
            "finite_klingon_before".parse::<ConditionKey>(),
            Err(ParseError::Unknown { kind: "language", .. })
        ));
    }

    #[test]
    fn evaluation_grid_covers_six_finite_cells() {
        let grid = ConditionKey::evaluation_grid();
        assert_eq!(grid.len(), 6);
        assert!(grid.iter().all(|key| key.utterance == Utterance::Finite));
        assert_eq!(grid[0].to_string(), "finite_english_before");
        assert_eq!(grid[5].to_string(), "finite_german_after");
    }

    #[test]
    fn deserializes_from_string() {
        let key: ConditionKey = serde_json::from_str("\"finite_german_before\"").expect("json");
        assert_eq!(key.language, Language::German);
        assert_eq!(
            serde_json::to_string(&key).expect("serialize"),
            "\"finite_german_before\""
        );
    }
}
