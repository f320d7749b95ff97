//! First-success-wins fan-out across discovery sources.

use crate::error::{RelayError, RelayResult, SourceError};
use crate::pipeline::acquisition::{SourceAcquirer, TaskResult};
use crate::types::{AcquiredRecord, DiscoverySource};
use nonempty::NonEmpty;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// The authoritative result of a run.
#[derive(Debug)]
pub struct Selection {
    pub source: DiscoverySource,
    pub records: NonEmpty<AcquiredRecord>,
    /// Background drain of the losing tasks. Resolves to the number of
    /// results it discarded once every task has finished. Dropping it
    /// detaches the drain.
    pub drain: JoinHandle<usize>,
}

/// Runs one acquisition task per source and keeps the first success.
pub struct Aggregator {
    acquirer: Arc<dyn SourceAcquirer>,
}

impl Aggregator {
    pub fn new(acquirer: Arc<dyn SourceAcquirer>) -> Self {
        Self { acquirer }
    }

    /// Launch every source concurrently and return the first success in
    /// arrival order. Fails only once every source has reported a failure.
    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub async fn select(&self, sources: &NonEmpty<DiscoverySource>) -> RelayResult<Selection> {
        // One slot per task so no sender ever blocks, even after a winner.
        let (result_tx, mut result_rx) = mpsc::channel::<TaskResult>(sources.len());

        for source in sources.iter().cloned() {
            let acquirer = Arc::clone(&self.acquirer);
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                let result = acquirer.acquire(&source).await;
                if result_tx.send(result).await.is_err() {
                    debug!("Result receiver closed before {} reported", source);
                }
            });
        }
        drop(result_tx);

        let mut failures: Vec<(DiscoverySource, SourceError)> = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match result {
                TaskResult::Success { source, records } => {
                    info!("Selected {} with {} records", source, records.len());
                    let drain = tokio::spawn(drain_remaining(result_rx));
                    return Ok(Selection {
                        source,
                        records,
                        drain,
                    });
                }
                TaskResult::Failure { source, error } => {
                    warn!("Source {} produced no usable data: {}", source, error);
                    failures.push((source, error));
                }
            }
        }

        Err(RelayError::NoSourceSucceeded { failures })
    }
}

/// Consume whatever the losing tasks still report.
async fn drain_remaining(mut result_rx: mpsc::Receiver<TaskResult>) -> usize {
    let mut discarded = 0;
    while let Some(result) = result_rx.recv().await {
        debug!(
            success = result.is_success(),
            "Discarding late result from {}",
            result.source()
        );
        discarded += 1;
    }
    discarded
}
