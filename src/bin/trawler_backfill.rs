//! trawler-backfill: harvest every year-range partition into the CSV table
//!
//! Walks the configured partitions oldest-first and pages through each one
//! until the API runs out of results, deduplicating against whatever the
//! table already holds. Safe to re-run after an interruption.
//!
//! Usage:
//!   # Harvest the whole catalogue into ./boats.csv
//!   ZENROWS_API_KEY=... trawler-backfill
//!
//!   # Custom table location, two partitions only
//!   ZENROWS_API_KEY=... trawler-backfill --table /data/boats.csv \
//!       --partitions 1990-2000,2000-2005

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
#[command(name = "trawler-backfill")]
#[command(about = "Harvest every year-range partition into the CSV table", long_about = None)]
struct Args {
    /// CSV table to create or extend
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

    /// Failed pages a partition survives before it is abandoned (default: 2)
    #[arg(long)]
    retry_budget: Option<u32>,

    /// Comma-separated year-range partitions, e.g. 1990-2000,2000-2005
    /// (default: the whole catalogue)
    #[arg(long, value_delimiter = ',')]
    partitions: Option<Vec<String>>,

    /// Rendering-proxy endpoint
    #[arg(long)]
    proxy_endpoint: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut config = HarvestConfig::default();
    config.table_path = args.table;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(delay) = args.delay {
        config.request_delay = Duration::from_secs(delay);
    }
    if let Some(backoff) = args.backoff {
        config.retry_backoff = Duration::from_secs(backoff);
    }
    if let Some(budget) = args.retry_budget {
        config.backfill_retry_budget = budget;
    }
    if let Some(partitions) = args.partitions {
        config.partitions = partitions;
    }

    let api_key = std::env::var("ZENROWS_API_KEY")
        .context("ZENROWS_API_KEY must be set to the rendering-proxy api key")?;
    let mut proxy = ProxyConfig::new(api_key);
    if let Some(endpoint) = args.proxy_endpoint {
        proxy.endpoint = endpoint;
    }

    let fetcher = ProxyFetcher::new(proxy)?;
    let mut harvester = Harvester::new(config, fetcher)?;
    harvester.run_backfill()?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
