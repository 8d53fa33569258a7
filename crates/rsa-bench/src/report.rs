use std::fs;
use std::path::Path;

use rsa_core::fit::{ObservationDataset, PosteriorSampleSet, PosteriorSummary};
use rsa_core::model::{ConditionKey, Interpretation};
use rsa_core::rsa::PredictionRow;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Per-chain line of the summary table.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub chain: usize,
    pub initial_alpha: f64,
    pub draws: usize,
    pub mean: f64,
    pub acceptance_rate: f64,
}

impl From<&PosteriorSampleSet> for ChainReport {
    fn from(set: &PosteriorSampleSet) -> Self {
        Self {
            chain: set.chain(),
            initial_alpha: set.initial_alpha(),
            draws: set.len(),
            mean: set.mean(),
            acceptance_rate: set.acceptance_rate(),
        }
    }
}

/// Subject-coreference probability for one condition under both reported alphas.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionReport {
    pub condition: ConditionKey,
    pub configured_subject: f64,
    pub posterior_subject: f64,
    /// Share of subject responses when the dataset covers this condition.
    pub observed_subject: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub run_id: String,
    pub seed: u64,
    pub trials: u64,
    pub configured_alpha: f64,
    pub posterior: PosteriorSummary,
    pub chains: Vec<ChainReport>,
    pub conditions: Vec<ConditionReport>,
}

impl FitReport {
    /// Pair up prediction rows for the same conditions (same order) at the configured alpha
    /// and at the posterior mean.
    pub fn new(
        run_id: &str,
        seed: u64,
        dataset: &ObservationDataset,
        configured_alpha: f64,
        posterior: PosteriorSummary,
        chains: &[PosteriorSampleSet],
        configured: &[PredictionRow],
        at_posterior_mean: &[PredictionRow],
    ) -> Self {
        let conditions = configured
            .iter()
            .zip(at_posterior_mean)
            .map(|(configured, fitted)| ConditionReport {
                condition: configured.condition,
                configured_subject: configured.subject,
                posterior_subject: fitted.subject,
                observed_subject: observed_share(dataset, &configured.condition),
            })
            .collect();

        Self {
            run_id: run_id.to_string(),
            seed,
            trials: dataset.trials(),
            configured_alpha,
            posterior,
            chains: chains.iter().map(ChainReport::from).collect(),
            conditions,
        }
    }

    pub fn to_markdown(&self) -> String {
        let posterior = &self.posterior;
        let mut rows = String::new();
        rows.push_str("# Posterior Summary\n\n");
        rows.push_str(&format!(
            "Run `{}` (seed {}): {} chain{}, {} retained draws, {} observed trials\n\n",
            self.run_id,
            self.seed,
            posterior.chains,
            if posterior.chains == 1 { "" } else { "s" },
            posterior.draws,
            self.trials,
        ));

        rows.push_str("| Parameter | Mean | SD | Median | CI | Acceptance | R-hat | ESS |\n");
        rows.push_str("|-----------|------|----|--------|----|------------|-------|-----|\n");
        rows.push_str(&format!(
            "| alpha | {mean:.4} | {sd:.4} | {median:.4} | {mass:.0}% [{lo:.4}, {hi:.4}] | {acc:.1}% | {rhat} | {ess:.0} |\n\n",
            mean = posterior.mean,
            sd = posterior.std_dev,
            median = posterior.median,
            mass = posterior.credible_mass * 100.0,
            lo = posterior.lower,
            hi = posterior.upper,
            acc = posterior.acceptance_rate * 100.0,
            rhat = posterior
                .r_hat
                .map(|value| format!("{value:.3}"))
                .unwrap_or_else(|| "n/a".to_string()),
            ess = posterior.effective_sample_size,
        ));

        rows.push_str("## Chains\n\n");
        rows.push_str("| Chain | Start | Draws | Mean | Acceptance |\n");
        rows.push_str("|-------|-------|-------|------|------------|\n");
        for chain in &self.chains {
            rows.push_str(&format!(
                "| {} | {:.3} | {} | {:.4} | {:.1}% |\n",
                chain.chain,
                chain.initial_alpha,
                chain.draws,
                chain.mean,
                chain.acceptance_rate * 100.0,
            ));
        }
        rows.push('\n');

        rows.push_str("## Predicted subject coreference\n\n");
        rows.push_str(&format!(
            "| Condition | alpha = {:.2} | alpha = {:.4} (posterior mean) | Observed |\n",
            self.configured_alpha, posterior.mean
        ));
        rows.push_str("|-----------|------|------|----------|\n");
        for condition in &self.conditions {
            rows.push_str(&format!(
                "| {} | {:.4} | {:.4} | {} |\n",
                condition.condition,
                condition.configured_subject,
                condition.posterior_subject,
                condition
                    .observed_subject
                    .map(|value| format!("{value:.4}"))
                    .unwrap_or_else(|| "-".to_string()),
            ));
        }
        rows
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        fs::write(path.as_ref(), self.to_markdown()).map_err(|e| ReportError::Io {
            context: "writing summary markdown",
            source: e,
        })?;
        Ok(())
    }
}

fn observed_share(dataset: &ObservationDataset, condition: &ConditionKey) -> Option<f64> {
    let counts = dataset.counts(condition)?;
    let total: u64 = counts.values().sum();
    if total == 0 {
        return None;
    }
    let subject = counts.get(&Interpretation::Subject).copied().unwrap_or(0);
    Some(subject as f64 / total as f64)
}
