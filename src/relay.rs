//! One relay run: acquire, normalize, filter, publish.

use crate::config::RelaySettings;
use crate::error::{RelayError, RelayResult};
use crate::pipeline::{
    normalize_all, Aggregator, EnrichmentRateLimiter, HttpAcquirer, HttpMarketSink, Publisher,
};
use crate::types::DiscoverySource;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Source whose records were used
    pub source: DiscoverySource,
    /// Where the records were registered
    pub destination: String,
    pub acquired: usize,
    pub filtered_out: usize,
    pub published: usize,
    pub attempts: usize,
    /// Late results from losing sources, consumed before the run returned
    pub discarded: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Build the shared HTTP client. No timeout unless one is configured.
pub fn build_client(settings: &RelaySettings) -> RelayResult<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = settings.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(RelayError::Client)
}

/// Execute a full run against live endpoints.
pub async fn run(settings: &RelaySettings) -> RelayResult<RunReport> {
    let started_at = Utc::now();
    let http_client = build_client(settings)?;

    if let Some(filter) = &settings.owner_filter {
        info!("Owner filter: {:?}", filter.owners());
    }

    let rate_limiter = Arc::new(EnrichmentRateLimiter::new(settings.enrichment_interval));
    let acquirer = HttpAcquirer::new(
        http_client.clone(),
        settings.enrichment_url.clone(),
        settings.api_key.clone(),
        rate_limiter,
    );
    let aggregator = Aggregator::new(Arc::new(acquirer));

    let selection = aggregator.select(&settings.sources).await?;
    let acquired = selection.records.len();

    let mut records = normalize_all(selection.records.iter());
    let mut filtered_out = 0;
    if let Some(filter) = &settings.owner_filter {
        let kept = filter.apply(&records);
        filtered_out = records.len() - kept.len();
        records = kept;
        info!("{} markets remain after owner filtering", records.len());
    }

    let destination = settings
        .destination_url
        .clone()
        .unwrap_or_else(|| selection.source.to_string());
    let sink = HttpMarketSink::new(http_client, &destination);
    info!("Submitting {} markets to {}", records.len(), sink.url());
    let published = Publisher::new(sink, settings.retry).publish(&records).await;

    // Losers keep running until they finish, even when publishing failed.
    let discarded = wait_for_losers(selection.drain).await;
    let attempts = published?;

    Ok(RunReport {
        source: selection.source,
        destination,
        acquired,
        filtered_out,
        published: records.len(),
        attempts,
        discarded,
        started_at,
        finished_at: Utc::now(),
    })
}

async fn wait_for_losers(drain: JoinHandle<usize>) -> usize {
    match drain.await {
        Ok(discarded) => {
            info!("Discarded {} late results from losing sources", discarded);
            discarded
        }
        Err(e) => {
            warn!("Drain task did not complete: {}", e);
            0
        }
    }
}
