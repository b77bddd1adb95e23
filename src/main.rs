use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use perfanalyzer::config::AnalyzerConfig;

#[derive(Parser)]
#[command(
    name = "perfanalyzer",
    about = "Performance anomaly detection with generated remediation insights",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the analyzer (detection + reporting schedulers + status API)
    Serve {
        /// Path to a TOML config file (otherwise $PERFANALYZER_CONFIG, then ./perfanalyzer.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a single detection cycle and print the resulting report
    DetectOnce {
        /// Path to a TOML config file (otherwise $PERFANALYZER_CONFIG, then ./perfanalyzer.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        /// Path to a TOML config file (otherwise $PERFANALYZER_CONFIG, then ./perfanalyzer.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the demo target that produces slow and failing endpoints
    Demo {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Serve { config } => {
            let cfg = AnalyzerConfig::resolve(config.as_deref())?;
            tracing::info!(
                detection_secs = cfg.detection.interval_secs,
                report_secs = cfg.report.interval_secs,
                queries = cfg.detection.queries.len(),
                "Starting perfanalyzer"
            );
            perfanalyzer::serve(cfg).await?;
        }
        Commands::DetectOnce { config } => {
            let cfg = AnalyzerConfig::resolve(config.as_deref())?;
            let body = perfanalyzer::detect_once(&cfg).await?;
            println!("{}", body);
        }
        Commands::ShowConfig { config } => {
            let cfg = AnalyzerConfig::resolve(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        Commands::Demo { bind } => {
            tracing::info!(%bind, "Starting demo target");
            perfanalyzer::demo::serve(&bind).await?;
        }
    }

    Ok(())
}
