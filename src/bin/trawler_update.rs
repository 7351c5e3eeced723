//! trawler-update: pull listings added since the last run
//!
//! Pages through the recency-sorted feed and stops once a page comes back
//! empty or carries a listing id the table already holds. Meant to run on a
//! schedule after a backfill has seeded the table.
//!
//! Usage:
//!   # Catch the table up with the newest listings
//!   ZENROWS_API_KEY=... trawler-update
//!
//!   # Give up after five failed pages instead of retrying forever
//!   ZENROWS_API_KEY=... trawler-update --table /data/boats.csv --retry-limit 5

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trawler::{HarvestConfig, Harvester, ProxyConfig, ProxyFetcher};

#[derive(Parser, Debug)]
#[command(name = "trawler-update")]
#[command(about = "Pull listings added since the last run", long_about = None)]
struct Args {
    /// CSV table to extend
    #[arg(long, default_value = trawler::config::DEFAULT_TABLE_PATH)]
    table: PathBuf,

    /// Records requested per page (default: 100)
    #[arg(long)]
    page_size: Option<u32>,

    /// Seconds to pause between successful page fetches (default: 2)
    #[arg(long)]
    delay: Option<u64>,

    /// Seconds to wait before refetching a failed page (default: 2)
    #[arg(long)]
    backoff: Option<u64>,

    /// Give up after this many failed pages (default: retry forever)
    #[arg(long)]
    retry_limit: Option<u32>,

    /// Rendering-proxy endpoint
    #[arg(long)]
    proxy_endpoint: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut config = HarvestConfig::default();
    config.table_path = args.table;
    config.update_retry_limit = args.retry_limit;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(delay) = args.delay {
        config.request_delay = Duration::from_secs(delay);
    }
    if let Some(backoff) = args.backoff {
        config.retry_backoff = Duration::from_secs(backoff);
    }

    let api_key = std::env::var("ZENROWS_API_KEY")
        .context("ZENROWS_API_KEY must be set to the rendering-proxy api key")?;
    let mut proxy = ProxyConfig::new(api_key);
    if let Some(endpoint) = args.proxy_endpoint {
        proxy.endpoint = endpoint;
    }

    let fetcher = ProxyFetcher::new(proxy)?;
    let mut harvester = Harvester::new(config, fetcher)?;
    harvester.run_daily_update()?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
