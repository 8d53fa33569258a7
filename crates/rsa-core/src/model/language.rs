use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Language {
    English = 0,
    French = 1,
    German = 2,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::French, Language::German];

    pub const fn as_str(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::German => "german",
        }
    }

    /// Whether the language has a grammatical alternative to the finite clause.
    pub const fn has_alternative(self) -> bool {
        matches!(self, Language::English | Language::French)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "english" => Ok(Language::English),
            "french" => Ok(Language::French),
            "german" => Ok(Language::German),
            _ => Err(ParseError::unknown("language", raw)),
        }
    }
}
