use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub chains: ChainTelemetrySummary,
    pub progress: ProgressTelemetrySummary,
    pub warnings: usize,
    pub level_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChainTelemetrySummary {
    pub count: usize,
    pub total_samples: u64,
    pub avg_acceptance_rate: Option<f64>,
    pub avg_mean_alpha: Option<f64>,
    pub avg_elapsed_ms: Option<f64>,
    pub max_elapsed_ms: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct ProgressTelemetrySummary {
    pub count: usize,
    pub last_iteration_by_chain: BTreeMap<u64, u64>,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Aggregate chain and progress events emitted while sampling.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();
    let mut acceptance_avg = Average::new();
    let mut alpha_avg = Average::new();
    let mut elapsed_avg = Average::new();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let level = payload
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("<unset>");
        *summary.level_counts.entry(level.to_string()).or_insert(0) += 1;
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match target {
            "rsa_core::chain" => {
                let chains = &mut summary.chains;
                chains.count += 1;
                if let Some(samples) = fields.get("samples").and_then(Value::as_u64) {
                    chains.total_samples += samples;
                }
                if let Some(rate) = fields.get("acceptance_rate").and_then(Value::as_f64) {
                    acceptance_avg.add(rate);
                }
                if let Some(alpha) = fields.get("mean_alpha").and_then(Value::as_f64) {
                    alpha_avg.add(alpha);
                }
                if let Some(elapsed) = fields.get("elapsed_ms").and_then(Value::as_f64) {
                    elapsed_avg.add(elapsed);
                    chains.max_elapsed_ms =
                        Some(chains.max_elapsed_ms.map_or(elapsed, |max| max.max(elapsed)));
                }
            }
            "rsa_core::mcmc" => {
                summary.progress.count += 1;
                if let (Some(chain), Some(iteration)) = (
                    fields.get("chain").and_then(Value::as_u64),
                    fields.get("iteration").and_then(Value::as_u64),
                ) {
                    let last = summary
                        .progress
                        .last_iteration_by_chain
                        .entry(chain)
                        .or_insert(0);
                    *last = (*last).max(iteration);
                }
            }
            "rsa_core::estimator" => {
                summary.warnings += 1;
            }
            _ => {}
        }
    }

    summary.chains.avg_acceptance_rate = acceptance_avg.mean();
    summary.chains.avg_mean_alpha = alpha_avg.mean();
    summary.chains.avg_elapsed_ms = elapsed_avg.mean();

    Ok(summary)
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(
        &json_path,
        serde_json::to_vec_pretty(&summary).map_err(TelemetryError::from)?,
    )
    .map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary json",
        source,
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    let chains = &outputs.summary.chains;
    section.push_str(&format!("- Chain events captured: {}\n", chains.count));
    if let Some(value) = chains.avg_acceptance_rate {
        section.push_str(&format!("- Avg acceptance rate: {:.3}\n", value));
    }
    if let Some(value) = chains.avg_elapsed_ms {
        section.push_str(&format!("- Avg chain wall time: {:.1} ms\n", value));
    }
    section.push_str(&format!(
        "- Progress events: {}\n",
        outputs.summary.progress.count
    ));
    if outputs.summary.warnings > 0 {
        section.push_str(&format!(
            "- Initialisation warnings: {}\n",
            outputs.summary.warnings
        ));
    }

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push('\n');

    output.push_str("## Chains\n");
    output.push_str(&format!("- Events: {}\n", summary.chains.count));
    output.push_str(&format!(
        "- Retained draws: {}\n",
        summary.chains.total_samples
    ));
    if let Some(value) = summary.chains.avg_acceptance_rate {
        output.push_str(&format!("- Avg acceptance rate: {:.3}\n", value));
    }
    if let Some(value) = summary.chains.avg_mean_alpha {
        output.push_str(&format!("- Avg chain mean alpha: {:.4}\n", value));
    }
    if let Some(value) = summary.chains.avg_elapsed_ms {
        output.push_str(&format!("- Avg wall time: {:.1} ms\n", value));
    }
    if let Some(value) = summary.chains.max_elapsed_ms {
        output.push_str(&format!("- Slowest chain: {:.1} ms\n", value));
    }
    output.push('\n');

    output.push_str("## Progress\n");
    output.push_str(&format!("- Events: {}\n", summary.progress.count));
    if summary.progress.last_iteration_by_chain.is_empty() {
        output.push_str("- <none>\n");
    } else {
        for (chain, iteration) in &summary.progress.last_iteration_by_chain {
            output.push_str(&format!("- chain {}: iteration {}\n", chain, iteration));
        }
    }
    output.push('\n');

    output.push_str("## Levels\n");
    for (level, count) in &summary.level_counts {
        output.push_str(&format!("- {}: {}\n", level, count));
    }
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}
