use std::path::PathBuf;

use clap::Parser;

use rsa_bench::config::{FitConfig, ResolvedOutputs};
use rsa_bench::logging::init_logging;
use rsa_bench::runner::FitRunner;

/// Posterior fitting harness for the pronoun-resolution model.
#[derive(Debug, Parser)]
#[command(
    name = "rsa-bench",
    author,
    version,
    about = "Deterministic MCMC fit of speaker rationality"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/fit.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the base RNG seed; chain c uses seed + c.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the number of retained draws per chain.
    #[arg(long, value_name = "COUNT")]
    samples: Option<usize>,

    /// Override the number of burn-in iterations.
    #[arg(long, value_name = "COUNT")]
    burn: Option<usize>,

    /// Override the number of independent chains.
    #[arg(long, value_name = "COUNT")]
    chains: Option<usize>,

    /// Exit after validating the configuration and data (no sampling is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = FitConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(seed) = cli.seed {
        config.estimation.seed = Some(seed);
    }

    if let Some(samples) = cli.samples {
        config.estimation.sampler.samples = samples;
    }

    if let Some(burn) = cli.burn {
        config.estimation.sampler.burn = burn;
    }

    if let Some(chains) = cli.chains {
        config.estimation.chains = chains;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let chains = config.estimation.chains;
    let samples = config.estimation.sampler.samples;
    let burn = config.estimation.sampler.burn;

    println!(
        "Loaded configuration '{run_id}' with {chains} chain{} ({samples} samples after {burn} burn-in)",
        if chains == 1 { "" } else { "s" }
    );

    let logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = FitRunner::new(config, outputs)?.with_telemetry(logging_guard.is_some());
    println!(
        "Observations: {} conditions, {} trials",
        runner.dataset().len(),
        runner.dataset().trials()
    );

    if cli.validate_only {
        println!("Validation-only mode: sampling skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    drop(logging_guard);

    println!(
        "Fit complete for '{run_id}': {} chain(s) -> {} draws at {}",
        summary.chains,
        summary.rows_written,
        summary.samples_path.display()
    );
    let posterior = &summary.posterior;
    println!(
        "  alpha mean {:.4} (sd {:.4}), {:.0}% interval [{:.4}, {:.4}]",
        posterior.mean,
        posterior.std_dev,
        posterior.credible_mass * 100.0,
        posterior.lower,
        posterior.upper
    );
    if let Some(r_hat) = posterior.r_hat {
        println!("  R-hat {r_hat:.3}, ESS {:.0}", posterior.effective_sample_size);
    }
    println!("Summary table: {}", summary.summary_path.display());

    if let Some(telemetry_path) = summary.telemetry_path.as_ref() {
        println!("Telemetry log: {}", telemetry_path.display());
    }
    if let Some(outputs) = runner.write_telemetry(&summary)? {
        println!("Telemetry summary (JSON): {}", outputs.json_path.display());
        println!(
            "Telemetry summary (Markdown): {}",
            outputs.markdown_path.display()
        );
        if let Some(rate) = outputs.summary.chains.avg_acceptance_rate {
            println!(
                "  Chains: {} events, avg acceptance {:.3}",
                outputs.summary.chains.count, rate
            );
        }
    }

    Ok(())
}
