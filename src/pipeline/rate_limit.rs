//! Process-wide rate limiting for the enrichment endpoint.
//!
//! The enrichment service budgets calls per API key, not per discovery
//! source, so a single limiter is shared by every acquisition task.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument};

/// Minimum spacing between two enrichment calls.
pub const DEFAULT_ENRICHMENT_INTERVAL: Duration = Duration::from_secs(60);

/// Gate guaranteeing that granted slots are at least `interval` apart.
#[derive(Debug)]
pub struct EnrichmentRateLimiter {
    interval: Duration,
    /// Most recently granted slot
    last_grant: Mutex<Option<Instant>>,
}

impl EnrichmentRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next free slot and return the instant it was granted at.
    ///
    /// The lock only covers reserving the slot. Callers queue behind each
    /// other by reservation order and sleep without holding it.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Instant {
        let slot = {
            let mut last_grant = self.last_grant.lock().await;
            let now = Instant::now();
            let slot = match *last_grant {
                Some(previous) => (previous + self.interval).max(now),
                None => now,
            };
            *last_grant = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            debug!("Enrichment slot available immediately");
        } else {
            info!("Waiting {:.1}s to respect the enrichment call interval", wait.as_secs_f64());
            sleep_until(slot).await;
        }

        slot
    }
}

impl Default for EnrichmentRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_ENRICHMENT_INTERVAL)
    }
}
