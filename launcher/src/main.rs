use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use skewer_core::{FailurePolicy, RunOutcome, SkewConfig, SkewThreshold};
use skewer_launcher::{PipelineConfig, analyze_file};
use tracing::{debug, error, info};

/// Run MapReduce pipelines locally with skew-aware reducers
#[derive(Parser)]
#[command(name = "skewer")]
#[command(version, long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log filter (e.g. `warn` or `skewer_core=trace`); overrides -v
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline described by a JSON config file
    Run {
        /// Pipeline config file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Override the worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override the failure policy
        #[arg(long, value_enum)]
        policy: Option<Policy>,
    },

    /// Analyze the key distribution of a `key\tvalue` file
    Skew {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Hot-key threshold as a percentile of the per-key counts
        #[arg(long, conflicts_with = "mean_multiple")]
        percentile: Option<f64>,

        /// Hot-key threshold as a multiple of the mean count
        #[arg(long)]
        mean_multiple: Option<f64>,

        /// Minimum share of all values a key must exceed to be hot
        #[arg(long)]
        min_fraction: Option<f64>,

        /// Reducer count used to size salt factors
        #[arg(short, long, default_value = "4")]
        reducers: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    FailFast,
    BestEffort,
}

impl From<Policy> for FailurePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::FailFast => FailurePolicy::FailFast,
            Policy::BestEffort => FailurePolicy::BestEffort,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.log_level.as_deref(), cli.verbose))
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 2)
        .init();
    debug!(verbosity = cli.verbose, "skewer started");

    let result = match cli.command {
        Commands::Run {
            config,
            output_dir,
            workers,
            policy,
        } => run_pipeline(config, output_dir, workers, policy).await,
        Commands::Skew {
            input,
            percentile,
            mean_multiple,
            min_fraction,
            reducers,
        } => {
            let mut skew = SkewConfig::with_strategy(match (percentile, mean_multiple) {
                (Some(p), _) => SkewThreshold::Percentile(p),
                (None, Some(m)) => SkewThreshold::MeanMultiple(m),
                (None, None) => SkewThreshold::default(),
            });
            if let Some(fraction) = min_fraction {
                skew.min_fraction = fraction;
            }
            run_skew(input, &skew, reducers)
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn log_filter(level: Option<&str>, verbose: u8) -> String {
    if let Some(level) = level {
        return level.to_string();
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
    .to_string()
}

async fn run_pipeline(
    config_path: PathBuf,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
    policy: Option<Policy>,
) -> Result<()> {
    let mut config = PipelineConfig::load(&config_path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if let Some(workers) = workers {
        config.engine.workers = workers;
    }
    if let Some(policy) = policy {
        config.engine.failure_policy = policy.into();
    }

    let pipeline = config
        .into_pipeline()
        .with_context(|| format!("invalid pipeline in {}", config_path.display()))?;
    info!(jobs = pipeline.jobs().len(), config = %config_path.display(), "starting pipeline");
    let summary = pipeline.run().await.context("pipeline run failed")?;

    for job in &summary.jobs {
        match &job.error {
            Some(failure) => println!("{:<24} {:?}  {}", job.name, job.state, failure.message),
            None => println!("{:<24} {:?}", job.name, job.state),
        }
    }
    info!(outcome = ?summary.outcome, summary = %pipeline.summary_path().display(), "run complete");

    if summary.outcome != RunOutcome::Succeeded {
        bail!("pipeline {:?}", summary.outcome);
    }
    Ok(())
}

fn run_skew(input: PathBuf, skew: &SkewConfig, reducers: usize) -> Result<()> {
    let analysis = analyze_file(&input, skew, reducers.max(1))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&analysis).context("failed to serialize skew analysis")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_overrides_verbosity() {
        assert_eq!(log_filter(None, 0), "info");
        assert_eq!(log_filter(None, 1), "debug");
        assert_eq!(log_filter(None, 3), "trace");
        assert_eq!(log_filter(Some("warn"), 2), "warn");
    }

    #[test]
    fn test_cli_accepts_global_log_level() {
        let cli = Cli::try_parse_from([
            "skewer", "skew", "--input", "a.tsv", "--log-level", "skewer_core=trace",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("skewer_core=trace"));
        assert!(matches!(cli.command, Commands::Skew { reducers: 4, .. }));

        let conflict = Cli::try_parse_from([
            "skewer", "skew", "--input", "a.tsv", "--percentile", "90", "--mean-multiple", "3",
        ]);
        assert!(conflict.is_err());
    }
}
