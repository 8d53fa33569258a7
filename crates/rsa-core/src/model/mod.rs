//! Closed vocabularies of the pronoun-resolution model and the static tables
//! (priors, meanings, construction costs) the inference layers consume.

pub mod condition;
pub mod connector;
pub mod interpretation;
pub mod language;
pub mod tables;
pub mod utterance;

pub use condition::{ConditionKey, ParseError};
pub use connector::Connector;
pub use interpretation::Interpretation;
pub use language::Language;
pub use tables::{ConfigurationError, CostEntry, ModelTables, literal_meaning};
pub use utterance::Utterance;
