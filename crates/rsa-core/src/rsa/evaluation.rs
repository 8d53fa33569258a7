use std::sync::Arc;

use serde::Serialize;

use super::RsaModel;
use crate::infer::{Distribution, InferenceError};
use crate::model::{ConditionKey, Interpretation};

/// Pragmatic-listener output for one condition at a fixed rationality.
#[derive(Debug, Clone)]
pub struct ConditionPrediction {
    pub condition: ConditionKey,
    pub alpha: f64,
    pub distribution: Arc<Distribution<Interpretation>>,
}

impl ConditionPrediction {
    pub fn probability(&self, interpretation: Interpretation) -> f64 {
        self.distribution.prob(&interpretation)
    }

    pub fn row(&self) -> PredictionRow {
        PredictionRow {
            condition: self.condition,
            alpha: self.alpha,
            subject: self.probability(Interpretation::Subject),
            object: self.probability(Interpretation::Object),
        }
    }
}

/// Flat, serializable view of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionRow {
    pub condition: ConditionKey,
    pub alpha: f64,
    pub subject: f64,
    pub object: f64,
}

/// Run the pragmatic listener for each condition in order.
pub fn evaluate_conditions(
    model: &RsaModel,
    conditions: &[ConditionKey],
    alpha: f64,
) -> Result<Vec<ConditionPrediction>, InferenceError> {
    conditions
        .iter()
        .map(|&condition| {
            Ok(ConditionPrediction {
                condition,
                alpha,
                distribution: model.predict(condition, alpha)?,
            })
        })
        .collect()
}
