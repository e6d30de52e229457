use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;

use octofhir_pipeline::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use octofhir_pipeline::{AppConfig, Pipeline, load_ndjson, observability};

const CONFIG_ENV: &str = "OCTOFHIR_PIPELINE_CONFIG";

#[derive(Debug, Parser)]
#[command(name = "octofhir-pipeline", version, about = "Partitioned writes with subscription and EMPI fan-out")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// NDJSON files to write through the pipeline at startup
    #[arg(short, long, value_name = "FILE")]
    load: Vec<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable ({CONFIG_ENV})"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let cli = Cli::parse();
    let (config_path, source) = resolve_config_path(cli.config.clone());

    // The default file is optional; an explicit one must exist.
    let explicit = !matches!(source, ConfigSource::Default);
    let cfg = match load_config(explicit.then_some(config_path.as_str())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    observability::apply_logging_level(&cfg.logging.level);

    if let Err(e) = run(cli, cfg).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: AppConfig) -> anyhow::Result<()> {
    if cli.print_config {
        println!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let pipeline = Pipeline::start(&cfg).await?;

    for path in &cli.load {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        let report = load_ndjson(pipeline.storage(), BufReader::new(file))
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        tracing::info!(
            file = %path.display(),
            written = report.written,
            rejected = report.rejected,
            "NDJSON load complete"
        );
    }

    tracing::info!("Pipeline running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    tracing::info!("Shutdown requested");
    pipeline.shutdown().await;
    Ok(())
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: OCTOFHIR_PIPELINE_CONFIG
/// 3. Default: octofhir-pipeline.toml
fn resolve_config_path(cli_arg: Option<String>) -> (String, ConfigSource) {
    if let Some(path) = cli_arg {
        return (path, ConfigSource::CliArgument);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return (path, ConfigSource::EnvironmentVariable);
    }
    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
