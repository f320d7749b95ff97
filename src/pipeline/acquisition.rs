//! Per-source acquisition: discover identifiers, then enrich them.

use crate::error::{FetchError, SourceError};
use crate::pipeline::rate_limit::EnrichmentRateLimiter;
use crate::types::{AcquiredRecord, DiscoverySource, TokenSet};
use async_trait::async_trait;
use nonempty::NonEmpty;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of one acquisition task.
#[derive(Debug)]
pub enum TaskResult {
    Success {
        source: DiscoverySource,
        records: NonEmpty<AcquiredRecord>,
    },
    Failure {
        source: DiscoverySource,
        error: SourceError,
    },
}

impl TaskResult {
    /// Tag a task's outcome with the source it came from.
    pub fn from_outcome(
        source: DiscoverySource,
        outcome: Result<Vec<AcquiredRecord>, SourceError>,
    ) -> Self {
        match outcome.map(NonEmpty::from_vec) {
            Ok(Some(records)) => TaskResult::Success { source, records },
            Ok(None) => TaskResult::Failure {
                source,
                error: SourceError::NoRecords,
            },
            Err(error) => TaskResult::Failure { source, error },
        }
    }

    pub fn source(&self) -> &DiscoverySource {
        match self {
            TaskResult::Success { source, .. } | TaskResult::Failure { source, .. } => source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }
}

/// Produces a `TaskResult` for one discovery source.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    async fn acquire(&self, source: &DiscoverySource) -> TaskResult;
}

/// HTTP-backed acquisition against a discovery endpoint and the shared
/// enrichment service.
pub struct HttpAcquirer {
    http_client: Client,
    enrichment_url: String,
    api_key: String,
    rate_limiter: Arc<EnrichmentRateLimiter>,
}

impl HttpAcquirer {
    pub fn new(
        http_client: Client,
        enrichment_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiter: Arc<EnrichmentRateLimiter>,
    ) -> Self {
        Self {
            http_client,
            enrichment_url: enrichment_url.into(),
            api_key: api_key.into(),
            rate_limiter,
        }
    }

    /// Fetch the candidate identifiers published by a discovery source.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn discover(&self, source: &DiscoverySource) -> Result<TokenSet, FetchError> {
        let url = source.endpoint("tokens");
        let request = self
            .http_client
            .get(&url)
            .header(CONTENT_TYPE, "application/json");

        let tokens: Vec<String> = fetch_json(request, &url).await?;
        debug!("Discovered {} tokens", tokens.len());
        Ok(TokenSet::from(tokens))
    }

    /// Fetch full market records for a token set. Waits on the shared limiter
    /// before the call is issued.
    #[instrument(skip(self, tokens), fields(tokens = tokens.len()))]
    pub async fn enrich(&self, tokens: &TokenSet) -> Result<Vec<AcquiredRecord>, FetchError> {
        self.rate_limiter.acquire().await;

        // Identifiers are base58, so the joined list goes into the query as is.
        let separator = if self.enrichment_url.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}onlyjup=false&tokens={}",
            self.enrichment_url,
            separator,
            tokens.joined()
        );
        info!("Requesting market data from {}", self.enrichment_url);
        let request = self
            .http_client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key);

        let records: Vec<AcquiredRecord> = fetch_json(request, &self.enrichment_url).await?;
        debug!("Received {} market records", records.len());
        Ok(records)
    }

    async fn run(&self, source: &DiscoverySource) -> Result<Vec<AcquiredRecord>, SourceError> {
        let tokens = self.discover(source).await.map_err(SourceError::Discovery)?;
        self.enrich(&tokens).await.map_err(SourceError::Enrichment)
    }
}

#[async_trait]
impl SourceAcquirer for HttpAcquirer {
    async fn acquire(&self, source: &DiscoverySource) -> TaskResult {
        TaskResult::from_outcome(source.clone(), self.run(source).await)
    }
}

/// Send a request and decode a 2xx JSON body, keeping status and body text on
/// failure for diagnostics.
async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder, url: &str) -> Result<T, FetchError> {
    let transport = |source| FetchError::Transport {
        url: url.to_string(),
        source,
    };

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        body,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_records_become_failure() {
        let result = TaskResult::from_outcome(DiscoverySource::new("https://a"), Ok(vec![]));

        assert!(!result.is_success());
        assert!(matches!(
            result,
            TaskResult::Failure {
                error: SourceError::NoRecords,
                ..
            }
        ));
    }

    #[test]
    fn test_records_become_success() {
        let source = DiscoverySource::new("https://a");
        let result = TaskResult::from_outcome(
            source.clone(),
            Ok(vec![AcquiredRecord::new("P1", "O1"), AcquiredRecord::new("P2", "O1")]),
        );

        assert_eq!(result.source(), &source);
        match result {
            TaskResult::Success { records, .. } => {
                assert_eq!(records.len(), 2);
                assert_eq!(records.head.pubkey, "P1");
            }
            TaskResult::Failure { error, .. } => panic!("unexpected failure: {error}"),
        }
    }
}
