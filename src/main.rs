use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use marketintel::log::init_logging;
use marketintel::pipeline::RunMode;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Fetch each source's full historical horizon
    Backfill,
    /// Fetch a short trailing window for all sources
    DailySync,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> RunMode {
        match mode {
            Mode::Backfill => RunMode::Backfill,
            Mode::DailySync => RunMode::DailySync,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Ingest all sources and rebuild aggregates
    Run {
        #[arg(short, long, value_enum, default_value = "daily-sync")]
        mode: Mode,
    },
    /// Display per-table record counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(Commands::Run { mode }) => run(mode, cli.config_path.as_deref()).await,
        Some(Commands::Status) => status(cli.config_path.as_deref()),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

async fn run(mode: Mode, config_path: Option<&str>) -> Result<()> {
    let report = marketintel::run(mode.into(), config_path).await?;
    marketintel::ui::print_report(&report);

    if !report.is_success() {
        anyhow::bail!("Run finished with source failures");
    }
    Ok(())
}

fn status(config_path: Option<&str>) -> Result<()> {
    let status = marketintel::status(config_path)?;
    marketintel::ui::print_status(&status);
    Ok(())
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = marketintel::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
tracked_assets:
  - bitcoin
  - ethereum

daily_lookback_days: 7

retry:
  max_attempts: 3
  base_delay_ms: 500
  multiplier: 2.0
  jitter: 0.25
  rate_limit_delay_ms: 1500

sources:
  coingecko:
    enabled: true
    base_url: "https://api.coingecko.com/api/v3"
  fear_greed:
    enabled: true
    base_url: "https://api.alternative.me"
  etf_flows:
    enabled: true
    base_url: "https://api.sosovalue.com"
  market_metrics:
    enabled: true
    base_url: "https://api.coingecko.com/api/v3"
  derivatives:
    enabled: true
    base_url: "https://fapi.binance.com"
  social:
    enabled: false
    base_url: "https://www.reddit.com"
    subreddits: ["CryptoCurrency", "Bitcoin", "ethereum"]
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
