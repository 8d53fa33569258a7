use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseError;

/// Linguistic form a speaker chooses for the adverbial clause.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Utterance {
    /// Finite clause with an overt pronoun; ambiguous between both referents.
    Finite = 0,
    /// Non-finite alternative construction; only compatible with subject coreference.
    Alternative = 1,
}

impl Utterance {
    pub const ALL: [Utterance; 2] = [Utterance::Finite, Utterance::Alternative];

    pub const fn as_str(self) -> &'static str {
        match self {
            Utterance::Finite => "finite",
            Utterance::Alternative => "alternative",
        }
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Utterance {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "finite" => Ok(Utterance::Finite),
            "alternative" => Ok(Utterance::Alternative),
            _ => Err(ParseError::unknown("utterance", raw)),
        }
    }
}
