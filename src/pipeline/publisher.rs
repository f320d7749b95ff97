//! Sequential submission of normalized markets with batch-level retry.

use crate::error::{RelayError, RelayResult, SubmissionError};
use crate::pipeline::transform::SERUM_KEYS;
use crate::types::{NormalizedRecord, Pubkey};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, info, instrument, warn};

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroUsize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: NonZeroUsize, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Pauses to take after each failed attempt except the last.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.delay).take(self.max_attempts.get() - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroUsize::MIN.saturating_add(2),
            delay: Duration::from_secs(5),
        }
    }
}

/// Wire body for `POST /add-market`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMarketRequest {
    pub address: Pubkey,
    pub owner: Pubkey,
    /// Only the serum keys are forwarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    /// Serialized as `null` when absent
    pub address_lookup_table_address: Option<String>,
}

impl From<&NormalizedRecord> for AddMarketRequest {
    fn from(record: &NormalizedRecord) -> Self {
        let params = record.params.as_ref().and_then(|params| {
            let serum: BTreeMap<String, String> = SERUM_KEYS
                .iter()
                .filter_map(|key| params.get(*key).map(|value| (key.to_string(), value.clone())))
                .collect();
            (!serum.is_empty()).then_some(serum)
        });

        Self {
            address: record.address.clone(),
            owner: record.owner.clone(),
            params,
            address_lookup_table_address: record.address_lookup_table_address.clone(),
        }
    }
}

/// Destination that registers one market at a time.
#[async_trait]
pub trait MarketSink: Send + Sync {
    async fn submit(&self, request: &AddMarketRequest) -> Result<(), SubmissionError>;
}

/// Registration over HTTP against `{destination}/add-market`.
pub struct HttpMarketSink {
    http_client: Client,
    add_market_url: String,
}

impl HttpMarketSink {
    pub fn new(http_client: Client, destination: &str) -> Self {
        Self {
            http_client,
            add_market_url: format!("{}/add-market", destination.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.add_market_url
    }
}

#[async_trait]
impl MarketSink for HttpMarketSink {
    #[instrument(skip(self, request), fields(address = %request.address))]
    async fn submit(&self, request: &AddMarketRequest) -> Result<(), SubmissionError> {
        let body = serde_json::to_vec(request).map_err(|source| SubmissionError::Encode {
            address: request.address.clone(),
            source,
        })?;
        debug!("POST {} {}", self.add_market_url, String::from_utf8_lossy(&body));

        let transport = |source| SubmissionError::Transport {
            address: request.address.clone(),
            source,
        };
        let response = self
            .http_client
            .post(&self.add_market_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(SubmissionError::Rejected {
                address: request.address.clone(),
                status,
                body: text,
            });
        }

        debug!("Registered: {}", text);
        Ok(())
    }
}

/// Submits a batch in order, retrying the whole batch on failure.
pub struct Publisher<S> {
    sink: S,
    policy: RetryPolicy,
}

impl<S: MarketSink> Publisher<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Publish every record, restarting from the first record on each retry.
    /// Returns the number of attempts used.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn publish(&self, records: &[NormalizedRecord]) -> RelayResult<usize> {
        let requests: Vec<AddMarketRequest> = records.iter().map(AddMarketRequest::from).collect();
        let max_attempts = self.policy.max_attempts.get();
        let attempts = AtomicUsize::new(0);

        let outcome = Retry::start(self.policy.delays(), || {
            let current = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let requests = &requests;
            async move {
                self.publish_once(requests).await.map_err(|error| {
                    warn!("Submission attempt {}/{} failed: {}", current, max_attempts, error);
                    error
                })
            }
        })
        .await;

        let attempts = attempts.into_inner();
        match outcome {
            Ok(()) => {
                info!("Submitted {} markets in {} attempt(s)", requests.len(), attempts);
                Ok(attempts)
            }
            Err(source) => Err(RelayError::Submission { attempts, source }),
        }
    }

    async fn publish_once(&self, requests: &[AddMarketRequest]) -> Result<(), SubmissionError> {
        for (index, request) in requests.iter().enumerate() {
            debug!(
                "Submitting {}/{}: address={} owner={}",
                index + 1,
                requests.len(),
                request.address,
                request.owner
            );
            self.sink.submit(request).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records every submission; fails whole attempts according to a script.
    struct FlakySink {
        /// Attempt numbers (1-based) that fail at `fail_at_record`
        failing_attempts: Vec<usize>,
        fail_at_record: usize,
        batch_len: usize,
        submissions: Mutex<Vec<(Instant, String)>>,
    }

    impl FlakySink {
        fn new(failing_attempts: Vec<usize>, fail_at_record: usize, batch_len: usize) -> Self {
            Self {
                failing_attempts,
                fail_at_record,
                batch_len,
                submissions: Mutex::new(Vec::new()),
            }
        }

        fn submissions(&self) -> Vec<(Instant, String)> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MarketSink for FlakySink {
        async fn submit(&self, request: &AddMarketRequest) -> Result<(), SubmissionError> {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push((Instant::now(), request.address.clone()));
            let seen = submissions.len() - 1;
            let attempt = seen / self.batch_len + 1;
            let position = seen % self.batch_len;

            if self.failing_attempts.contains(&attempt) && position == self.fail_at_record {
                // Shift later attempts so each starts on a batch boundary.
                let padding = self.batch_len - position - 1;
                let now = Instant::now();
                for _ in 0..padding {
                    submissions.push((now, String::new()));
                }
                return Err(SubmissionError::Rejected {
                    address: request.address.clone(),
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "try later".into(),
                });
            }
            Ok(())
        }
    }

    fn records(count: usize) -> Vec<NormalizedRecord> {
        (1..=count)
            .map(|i| NormalizedRecord {
                address: format!("P{i}"),
                owner: "O1".into(),
                address_lookup_table_address: None,
                params: None,
            })
            .collect()
    }

    fn real_submissions(sink: &FlakySink) -> Vec<(Instant, String)> {
        sink.submissions()
            .into_iter()
            .filter(|(_, address)| !address.is_empty())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let publisher = Publisher::new(FlakySink::new(vec![1, 2], 0, 1), RetryPolicy::default());
        let started = Instant::now();

        let attempts = publisher.publish(&records(1)).await.unwrap();

        assert_eq!(attempts, 3);
        let calls = publisher.sink().submissions();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0 - started, Duration::ZERO);
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_secs(5));
        assert_eq!(calls[2].0 - calls[1].0, Duration::from_secs(5));
        // No pause after success.
        assert_eq!(Instant::now(), calls[2].0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail() {
        let publisher = Publisher::new(FlakySink::new(vec![1, 2, 3], 0, 1), RetryPolicy::default());

        let error = publisher.publish(&records(1)).await.unwrap_err();

        match error {
            RelayError::Submission { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, SubmissionError::Rejected { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(publisher.sink().submissions().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_restarts_from_first_record() {
        let publisher = Publisher::new(FlakySink::new(vec![1], 1, 3), RetryPolicy::default());

        let attempts = publisher.publish(&records(3)).await.unwrap();

        assert_eq!(attempts, 2);
        let addresses: Vec<String> = real_submissions(publisher.sink())
            .into_iter()
            .map(|(_, address)| address)
            .collect();
        assert_eq!(addresses, ["P1", "P2", "P1", "P2", "P3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(NonZeroUsize::new(1).unwrap(), Duration::from_secs(5));
        let publisher = Publisher::new(FlakySink::new(vec![1], 0, 1), policy);
        let started = Instant::now();

        assert!(publisher.publish(&records(1)).await.is_err());
        assert_eq!(Instant::now(), started);
    }

    #[test]
    fn test_policy_delays() {
        let delays: Vec<_> = RetryPolicy::default().delays().collect();
        assert_eq!(delays, [Duration::from_secs(5), Duration::from_secs(5)]);
    }

    #[test]
    fn test_request_forwards_serum_params_only() {
        let record = NormalizedRecord {
            address: "P1".into(),
            owner: "O1".into(),
            address_lookup_table_address: Some("ALT".into()),
            params: Some(
                [("routingGroup", "5"), ("serumBids", "X"), ("vaultTokenA", "V")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        };

        let json = serde_json::to_value(AddMarketRequest::from(&record)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "address": "P1",
                "owner": "O1",
                "params": {"serumBids": "X"},
                "addressLookupTableAddress": "ALT"
            })
        );
    }

    #[test]
    fn test_request_without_serum_params() {
        let record = NormalizedRecord {
            address: "P1".into(),
            owner: "O1".into(),
            address_lookup_table_address: None,
            params: Some([("routingGroup".to_string(), "5".to_string())].into_iter().collect()),
        };

        let json = serde_json::to_value(AddMarketRequest::from(&record)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"address": "P1", "owner": "O1", "addressLookupTableAddress": null})
        );
    }
}
