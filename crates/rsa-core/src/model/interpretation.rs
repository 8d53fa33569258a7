use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseError;

/// Referent a listener assigns to the pronoun.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Interpretation {
    /// Pronoun corefers with the main-clause subject.
    #[serde(alias = "1-subject")]
    Subject = 0,
    /// Pronoun corefers with the main-clause object.
    #[serde(alias = "2-object")]
    Object = 1,
}

impl Interpretation {
    pub const ALL: [Interpretation; 2] = [Interpretation::Subject, Interpretation::Object];

    pub const fn as_str(self) -> &'static str {
        match self {
            Interpretation::Subject => "subject",
            Interpretation::Object => "object",
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpretation {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subject" | "1-subject" => Ok(Interpretation::Subject),
            "object" | "2-object" => Ok(Interpretation::Object),
            _ => Err(ParseError::unknown("interpretation", raw)),
        }
    }
}
