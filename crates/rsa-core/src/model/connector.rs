use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseError;

/// Temporal connector introducing the adverbial clause (`before`/`avant`, `after`/`après`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Connector {
    Before = 0,
    After = 1,
}

impl Connector {
    pub const ALL: [Connector; 2] = [Connector::Before, Connector::After];

    pub const fn as_str(self) -> &'static str {
        match self {
            Connector::Before => "before",
            Connector::After => "after",
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Connector {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "before" | "avant" => Ok(Connector::Before),
            "after" | "apres" | "après" => Ok(Connector::After),
            _ => Err(ParseError::unknown("connector", raw)),
        }
    }
}
