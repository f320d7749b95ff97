//! Entry point for the market relay batch job.

use anyhow::{Context, Result};
use clap::Parser;
use market_relay::RelayConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Aggregate market listings from discovery endpoints and register them with
/// a destination.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (can also be set via MARKET_RELAY_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Discovery endpoint; repeat or comma-separate for several
    #[arg(short, long = "source", value_delimiter = ',')]
    sources: Vec<String>,

    /// API key for the enrichment endpoint
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Enrichment (market data) endpoint
    #[arg(long)]
    enrichment_url: Option<String>,

    /// Registration endpoint; defaults to the winning discovery source
    #[arg(long)]
    destination_url: Option<String>,

    /// Only register markets owned by these DEX program ids
    #[arg(short, long, value_delimiter = ',')]
    include_owners: Vec<String>,

    /// Skip markets owned by these DEX program ids
    #[arg(short, long, value_delimiter = ',')]
    exclude_owners: Vec<String>,
}

impl Args {
    /// Layer command-line values over the file configuration.
    fn into_config(self) -> Result<RelayConfig> {
        let path = self
            .config
            .or_else(|| std::env::var_os("MARKET_RELAY_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                info!(config_path = %path.display(), "Loading configuration");
                RelayConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?
            }
            None => RelayConfig::default(),
        };

        if !self.sources.is_empty() {
            config.sources = self.sources;
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key;
        }
        if self.enrichment_url.is_some() {
            config.enrichment_url = self.enrichment_url;
        }
        if self.destination_url.is_some() {
            config.destination_url = self.destination_url;
        }
        if !self.include_owners.is_empty() {
            config.include_owners = self.include_owners;
        }
        if !self.exclude_owners.is_empty() {
            config.exclude_owners = self.exclude_owners;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting market relay v{}", env!("CARGO_PKG_VERSION"));

    let settings = args.into_config()?.validate()?;
    info!(
        sources = settings.sources.len(),
        enrichment_url = %settings.enrichment_url,
        "Configuration loaded"
    );

    let report = market_relay::run(&settings).await?;

    info!(
        source = %report.source,
        destination = %report.destination,
        acquired = report.acquired,
        filtered_out = report.filtered_out,
        attempts = report.attempts,
        discarded = report.discarded,
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Run complete: {} markets registered",
        report.published
    );

    Ok(())
}
