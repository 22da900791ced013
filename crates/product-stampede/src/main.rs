//! Product Stampede CLI
//!
//! Warms one product's cache entry, waits for it to expire, then fires a
//! burst of concurrent reads at it.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use product_stampede::{StampedeReport, read_once};
use reqwest::Client;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "product-stampede")]
#[command(about = "Fire concurrent reads at an expired cache key")]
struct Args {
    /// API base URL
    #[arg(long, default_value = "http://localhost:8000")]
    api_url: String,

    /// Product to read
    #[arg(short, long, default_value = "1")]
    product_id: i64,

    /// Number of concurrent requests
    #[arg(short = 'n', long, default_value = "100")]
    requests: usize,

    /// Seconds to wait after warming (cache TTL plus one)
    #[arg(long, default_value = "61")]
    wait_secs: u64,

    /// Skip the warm-up read and the wait
    #[arg(long)]
    no_warm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("product_stampede=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let url = format!(
        "{}/products/{}",
        args.api_url.trim_end_matches('/'),
        args.product_id
    );
    let client = Client::builder()
        .pool_max_idle_per_host(args.requests)
        .build()
        .context("building HTTP client")?;

    if !args.no_warm {
        info!(%url, "Warming cache");
        let warm = read_once(&client, &url).await;
        info!(?warm, "Warm-up read");

        info!(wait_secs = args.wait_secs, "Waiting for cache entry to expire");
        sleep(Duration::from_secs(args.wait_secs)).await;
    }

    info!(requests = args.requests, "Launching concurrent reads");
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for _ in 0..args.requests {
        let client = client.clone();
        let url = url.clone();
        tasks.spawn(async move { read_once(&client, &url).await });
    }

    let mut outcomes = Vec::with_capacity(args.requests);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "Request task failed"),
        }
    }
    let report = StampedeReport::from_outcomes(&outcomes, started.elapsed());

    println!("{report}");
    if report.store_reads() > 1 {
        info!(
            store_reads = report.store_reads(),
            "Concurrent misses were not coalesced"
        );
    }

    Ok(())
}
