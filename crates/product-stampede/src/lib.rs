//! # Product Stampede
//!
//! Drives many simultaneous reads of one product after its cache entry has
//! expired, and tallies which source served each response. With no request
//! coalescing in the service, every read that misses goes to the store; the
//! tally makes that visible.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use product_domain::ReadSource;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ReadBody {
    source: ReadSource,
}

/// Result of a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Served { source: ReadSource, latency: Duration },
    /// Non-2xx response, or no response at all (`status` is `None`).
    Failed { status: Option<u16>, latency: Duration },
}

impl Outcome {
    pub const fn latency(&self) -> Duration {
        match self {
            Self::Served { latency, .. } | Self::Failed { latency, .. } => *latency,
        }
    }
}

/// Issue one `GET` and classify the answer.
pub async fn read_once(client: &Client, url: &str) -> Outcome {
    let started = Instant::now();
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "Request failed");
            return Outcome::Failed {
                status: None,
                latency: started.elapsed(),
            };
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Outcome::Failed {
            status: Some(status.as_u16()),
            latency: started.elapsed(),
        };
    }

    match response.json::<ReadBody>().await {
        Ok(body) => Outcome::Served {
            source: body.source,
            latency: started.elapsed(),
        },
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable response body");
            Outcome::Failed {
                status: Some(status.as_u16()),
                latency: started.elapsed(),
            }
        }
    }
}

/// Aggregate over one burst of reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedeReport {
    pub requests: usize,
    pub wall_time: Duration,
    pub by_source: BTreeMap<String, usize>,
    pub failures: usize,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

impl StampedeReport {
    pub fn from_outcomes(outcomes: &[Outcome], wall_time: Duration) -> Self {
        let mut by_source = BTreeMap::new();
        let mut failures = 0;
        for outcome in outcomes {
            match outcome {
                Outcome::Served { source, .. } => {
                    *by_source.entry(source.as_str().to_string()).or_insert(0) += 1;
                }
                Outcome::Failed { .. } => failures += 1,
            }
        }

        let total: Duration = outcomes.iter().map(Outcome::latency).sum();
        let mean_latency = u32::try_from(outcomes.len())
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| total / n);
        let max_latency = outcomes
            .iter()
            .map(Outcome::latency)
            .max()
            .unwrap_or_default();

        Self {
            requests: outcomes.len(),
            wall_time,
            by_source,
            failures,
            mean_latency,
            max_latency,
        }
    }

    /// Reads that did not come from the cache.
    pub fn store_reads(&self) -> usize {
        self.by_source
            .iter()
            .filter(|(source, _)| source.as_str() != ReadSource::Cache.as_str())
            .map(|(_, count)| count)
            .sum()
    }
}

impl fmt::Display for StampedeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} requests in {:.2}s (mean {}ms, max {}ms)",
            self.requests,
            self.wall_time.as_secs_f64(),
            self.mean_latency.as_millis(),
            self.max_latency.as_millis()
        )?;
        for (source, count) in &self.by_source {
            writeln!(f, "  {source:<24} {count}")?;
        }
        write!(
            f,
            "  {:<24} {}\n  store reads: {}",
            "failed",
            self.failures,
            self.store_reads()
        )
    }
}
