use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rsa_core::fit::{
    EstimatorError, ObservationDataset, ParameterEstimator, PosteriorSampleSet, PosteriorSummary,
};
use rsa_core::infer::InferenceError;
use rsa_core::model::{ConditionKey, ConfigurationError};
use rsa_core::rsa::{PredictionRow, RsaModel, evaluate_conditions};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::config::{DataError, FitConfig, ResolvedOutputs};
use crate::report::{FitReport, ReportError};
use crate::telemetry::{
    TelemetryError, TelemetryOutputs, append_highlights_to_markdown, write_summary_outputs,
};

/// Primary entry point for a posterior fit.
pub struct FitRunner {
    config: FitConfig,
    outputs: ResolvedOutputs,
    dataset: ObservationDataset,
    model: RsaModel,
    logging_enabled: bool,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub chains: usize,
    pub draws: usize,
    pub rows_written: usize,
    pub posterior: PosteriorSummary,
    pub samples_path: PathBuf,
    pub summary_path: PathBuf,
    pub telemetry_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SampleRow<'a> {
    run_id: &'a str,
    chain: usize,
    draw: usize,
    alpha: f64,
}

impl FitRunner {
    /// Build a runner from a validated configuration, loading and checking the dataset.
    pub fn new(config: FitConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let dataset = config.data.load()?;
        let model = RsaModel::new(config.model.tables.clone())?;
        dataset.validate(model.tables())?;
        config.estimation.sampler.validate()?;

        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            config,
            outputs,
            dataset,
            model,
        })
    }

    /// Record whether structured logging actually installed; without it no telemetry log
    /// is reported or summarised.
    pub fn with_telemetry(mut self, installed: bool) -> Self {
        self.logging_enabled = self.config.logging.enable_structured && installed;
        self
    }

    pub fn dataset(&self) -> &ObservationDataset {
        &self.dataset
    }

    /// Sample the posterior, streaming draws to JSONL and writing the Markdown summary.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.samples_jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;

        let estimation = &self.config.estimation;
        let seed = estimation.seed.unwrap_or(0);
        let grid = ConditionKey::evaluation_grid();
        let configured = self.predictions(&grid, self.config.model.alpha)?;

        let estimator =
            ParameterEstimator::new(&self.model, &self.dataset, estimation.sampler.clone())?;
        let chains = estimator.run_chains(estimation.chains, seed)?;

        let mut writer = BufWriter::new(File::create(&self.outputs.samples_jsonl)?);
        let rows_written = write_sample_rows(&mut writer, &self.config.run_id, &chains)?;
        writer.flush()?;

        let posterior = PosteriorSummary::from_chains(&chains, estimation.credible_mass)
            .ok_or(RunnerError::EmptyPosterior)?;
        let fitted = self.predictions(&grid, posterior.mean)?;

        if tracing::enabled!(target: "rsa_bench::run", Level::INFO) {
            event!(
                target: "rsa_bench::run",
                Level::INFO,
                run_id = %self.config.run_id,
                chains = chains.len(),
                draws = posterior.draws,
                mean_alpha = posterior.mean,
                r_hat = posterior.r_hat.unwrap_or(f64::NAN),
                ess = posterior.effective_sample_size,
            );
        }

        let report = FitReport::new(
            &self.config.run_id,
            seed,
            &self.dataset,
            self.config.model.alpha,
            posterior.clone(),
            &chains,
            &configured,
            &fitted,
        );
        report.write_markdown(&self.outputs.summary_md)?;

        let telemetry_path = if self.logging_enabled {
            Some(self.outputs.telemetry_dir().join("telemetry.jsonl"))
        } else {
            None
        };

        Ok(RunSummary {
            chains: chains.len(),
            draws: posterior.draws,
            rows_written,
            posterior,
            samples_path: self.outputs.samples_jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            telemetry_path,
        })
    }

    /// Summarise the telemetry log of a finished run and append highlights to its summary.
    ///
    /// Call after the logging guard has been dropped so every buffered event is on disk.
    pub fn write_telemetry(
        &self,
        summary: &RunSummary,
    ) -> Result<Option<TelemetryOutputs>, RunnerError> {
        let Some(path) = summary.telemetry_path.as_ref() else {
            return Ok(None);
        };
        let outputs = write_summary_outputs(path, &self.outputs.telemetry_dir())?;
        if let Some(outputs) = outputs.as_ref() {
            append_highlights_to_markdown(&summary.summary_path, outputs)?;
        }
        Ok(outputs)
    }

    fn predictions(
        &self,
        grid: &[ConditionKey],
        alpha: f64,
    ) -> Result<Vec<PredictionRow>, RunnerError> {
        Ok(evaluate_conditions(&self.model, grid, alpha)?
            .iter()
            .map(|prediction| prediction.row())
            .collect())
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_sample_rows(
    writer: &mut BufWriter<File>,
    run_id: &str,
    chains: &[PosteriorSampleSet],
) -> Result<usize, RunnerError> {
    let mut rows_written = 0usize;
    for set in chains {
        for (draw, &alpha) in set.samples().iter().enumerate() {
            let row = SampleRow {
                run_id,
                chain: set.chain(),
                draw,
                alpha,
            };
            serde_json::to_writer(&mut *writer, &row)?;
            writer.write_all(b"\n")?;
            rows_written += 1;
        }
    }
    Ok(rows_written)
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize sample row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Data(#[from] DataError),
    #[error("model configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("estimation failed: {0}")]
    Estimator(#[from] EstimatorError),
    #[error("no posterior draws were retained")]
    EmptyPosterior,
    #[error("summary error: {0}")]
    Report(#[from] ReportError),
    #[error("telemetry summarisation failed: {0}")]
    Telemetry(#[from] TelemetryError),
}
