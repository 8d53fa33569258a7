use rsa_core::fit::{EstimatorConfig, ObservationDataset};
use rsa_core::model::{ConfigurationError, ModelTables};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_ALPHA: f64 = 0.93;
const DEFAULT_CHAINS: usize = 1;
const MAX_CHAINS: usize = 64;
const DEFAULT_CREDIBLE_MASS: f64 = 0.95;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root fit configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FitConfig {
    pub run_id: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FitConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: FitConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.model.validate()?;
        self.estimation.validate()?;
        self.data.validate(&self.model.tables)?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            samples_jsonl: resolve_template(&self.run_id, &self.outputs.samples_jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }
}

/// Model tables and the rationality used for the reported predictions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub tables: ModelTables,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            tables: ModelTables::default(),
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ValidationError::InvalidField {
                field: "model.alpha".to_string(),
                message: format!("alpha must be finite and non-negative, got {}", self.alpha),
            });
        }
        self.tables.validate()?;
        Ok(())
    }
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

/// MCMC block: chain layout plus the sampler parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EstimationConfig {
    pub seed: Option<u64>,
    #[serde(default = "default_chains")]
    pub chains: usize,
    #[serde(default = "default_credible_mass")]
    pub credible_mass: f64,
    #[serde(flatten)]
    pub sampler: EstimatorConfig,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            chains: DEFAULT_CHAINS,
            credible_mass: DEFAULT_CREDIBLE_MASS,
            sampler: EstimatorConfig::default(),
        }
    }
}

impl EstimationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.chains == 0 || self.chains > MAX_CHAINS {
            return Err(ValidationError::InvalidField {
                field: "estimation.chains".to_string(),
                message: format!("chains must be between 1 and {MAX_CHAINS}"),
            });
        }

        if !(self.credible_mass > 0.0 && self.credible_mass < 1.0) {
            return Err(ValidationError::InvalidField {
                field: "estimation.credible_mass".to_string(),
                message: "credible mass must lie strictly between 0 and 1".to_string(),
            });
        }

        self.sampler.validate()?;
        Ok(())
    }
}

fn default_chains() -> usize {
    DEFAULT_CHAINS
}

fn default_credible_mass() -> f64 {
    DEFAULT_CREDIBLE_MASS
}

/// Where observation counts come from. Without either field the published comprehension
/// study counts are used.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DataConfig {
    /// JSON file in `{"finite_english_before": {"subject": .., "object": ..}}` form.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub counts: Option<ObservationDataset>,
}

impl DataConfig {
    fn validate(&self, tables: &ModelTables) -> Result<(), ValidationError> {
        match (&self.path, &self.counts) {
            (Some(_), Some(_)) => Err(ValidationError::InvalidField {
                field: "data".to_string(),
                message: "specify either data.path or data.counts, not both".to_string(),
            }),
            (Some(path), None) if path.as_os_str().is_empty() => {
                Err(ValidationError::InvalidField {
                    field: "data.path".to_string(),
                    message: "path must not be empty".to_string(),
                })
            }
            (None, Some(counts)) => {
                counts.validate(tables)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Load the configured dataset, reading `path` from disk when set.
    pub fn load(&self) -> Result<ObservationDataset, DataError> {
        if let Some(path) = self.path.as_ref() {
            let raw = std::fs::read_to_string(path).map_err(|source| DataError::Read {
                source,
                path: path.clone(),
            })?;
            return ObservationDataset::from_json_str(&raw).map_err(|source| DataError::Parse {
                source,
                path: path.clone(),
            });
        }
        Ok(self
            .counts
            .clone()
            .unwrap_or_else(ObservationDataset::comprehension_study))
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub samples_jsonl: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.samples_jsonl", &self.samples_jsonl),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }

        if resolve_template(run_id, &self.samples_jsonl)
            == resolve_template(run_id, &self.summary_md)
        {
            return Err(ValidationError::InvalidField {
                field: "outputs".to_string(),
                message: "samples and summary must be written to different files".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub samples_jsonl: PathBuf,
    pub summary_md: PathBuf,
}

impl ResolvedOutputs {
    /// Directory receiving telemetry artifacts; next to the summary.
    pub fn telemetry_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
    #[error("model tables: {0}")]
    Model(#[from] ConfigurationError),
}

/// Failures loading observation counts from disk.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read observations {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse observations {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa_core::fit::ProposalKernel;

    const BASIC_YAML: &str = r#"
run_id: "pronoun_fit"
model:
  alpha: 0.93
estimation:
  seed: 2024
  chains: 2
  samples: 500
  burn: 100
  proposal:
    kind: random_walk
    step: 0.2
outputs:
  samples_jsonl: "bench/out/{run_id}/samples.jsonl"
  summary_md: "bench/out/{run_id}/summary.md"
logging:
  enable_structured: true
  tracing_level: "debug"
"#;

    #[test]
    fn loads_and_validates_basic_config() {
        let mut cfg: FitConfig = serde_yaml::from_str(BASIC_YAML).expect("parse yaml");
        cfg.validate().expect("validate");

        assert_eq!(cfg.estimation.chains, 2);
        assert_eq!(cfg.estimation.seed, Some(2024));
        assert_eq!(cfg.estimation.sampler.samples, 500);
        assert_eq!(cfg.estimation.sampler.burn, 100);
        assert_eq!(cfg.estimation.sampler.thin, 1);
        assert_eq!(
            cfg.estimation.sampler.proposal,
            ProposalKernel::RandomWalk { step: 0.2 }
        );
        assert_eq!(cfg.estimation.credible_mass, DEFAULT_CREDIBLE_MASS);
        assert_eq!(cfg.model.tables, ModelTables::default());
        assert!(cfg.logging.enable_structured);
        assert_eq!(cfg.logging.level(), Some(Level::DEBUG));

        let outputs = cfg.resolved_outputs();
        assert_eq!(
            outputs.samples_jsonl,
            PathBuf::from("bench/out/pronoun_fit/samples.jsonl")
        );
        assert_eq!(outputs.telemetry_dir(), PathBuf::from("bench/out/pronoun_fit"));
    }

    #[test]
    fn shipped_config_validates() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bench/fit.yaml");
        let cfg = FitConfig::from_path(&path).expect("bench/fit.yaml loads");
        assert_eq!(cfg.run_id, "pronoun_fit");
        assert_eq!(cfg.estimation.chains, 4);
        assert_eq!(cfg.estimation.sampler, EstimatorConfig::default());
        assert_eq!(cfg.data, DataConfig::default());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let yaml = r#"
run_id: "minimal"
outputs:
  samples_jsonl: "samples.jsonl"
  summary_md: "summary.md"
"#;
        let mut cfg: FitConfig = serde_yaml::from_str(yaml).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.model.alpha, DEFAULT_ALPHA);
        assert_eq!(cfg.estimation.chains, 1);
        assert_eq!(cfg.estimation.sampler, EstimatorConfig::default());
        assert!(!cfg.logging.enable_structured);
        assert_eq!(cfg.resolved_outputs().telemetry_dir(), PathBuf::from("."));
        let dataset = cfg.data.load().expect("built-in data");
        assert_eq!(dataset, ObservationDataset::comprehension_study());
    }

    #[test]
    fn rejects_invalid_run_id() {
        let yaml = BASIC_YAML.replace("pronoun_fit", "pronoun fit");
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("invalid run id");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "run_id"
        ));
    }

    #[test]
    fn rejects_zero_chains() {
        let yaml = BASIC_YAML.replace("chains: 2", "chains: 0");
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("zero chains");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "estimation.chains"
        ));
    }

    #[test]
    fn sampler_errors_surface_as_model_errors() {
        let yaml = BASIC_YAML.replace("samples: 500", "samples: 0");
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("no samples");
        assert!(matches!(
            err,
            ValidationError::Model(ConfigurationError::InvalidField { field, .. }) if field == "samples"
        ));
    }

    #[test]
    fn rejects_negative_alpha() {
        let yaml = BASIC_YAML.replace("alpha: 0.93", "alpha: -1.0");
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidField { field, .. }) if field == "model.alpha"
        ));
    }

    #[test]
    fn inline_counts_are_checked_against_tables() {
        let yaml = BASIC_YAML.replace(
            "outputs:",
            "data:\n  counts:\n    alternative_german_before: {subject: 1, object: 1}\noutputs:",
        );
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::Model(
                ConfigurationError::UnavailableUtterance { .. }
            ))
        ));
    }

    #[test]
    fn rejects_both_data_sources() {
        let yaml = BASIC_YAML.replace(
            "outputs:",
            "data:\n  path: counts.json\n  counts:\n    finite_english_before: {subject: 1, object: 1}\noutputs:",
        );
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidField { field, .. }) if field == "data"
        ));
    }

    #[test]
    fn outputs_must_not_collide() {
        let yaml = BASIC_YAML.replace("samples.jsonl", "summary.md");
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidField { field, .. }) if field == "outputs"
        ));
    }

    #[test]
    fn outputs_resolve_template_multiple_occurrences() {
        let yaml = BASIC_YAML.replace(
            "bench/out/{run_id}/summary.md",
            "bench/out/{run_id}/{run_id}/summary.md",
        );
        let mut cfg: FitConfig = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate().expect("valid");
        let outputs = cfg.resolved_outputs();
        assert_eq!(
            outputs.summary_md,
            PathBuf::from("bench/out/pronoun_fit/pronoun_fit/summary.md")
        );
    }

    #[test]
    fn loads_counts_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(
            &mut file,
            br#"{"finite_french_before": {"1-subject": 251, "2-object": 395}}"#,
        )
        .expect("write json");
        let data = DataConfig {
            path: Some(file.path().to_path_buf()),
            counts: None,
        };
        let dataset = data.load().expect("parsed");
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.trials(), 646);

        let missing = DataConfig {
            path: Some(PathBuf::from("does/not/exist.json")),
            counts: None,
        };
        assert!(matches!(missing.load(), Err(DataError::Read { .. })));
    }
}
