//! Acquisition pipeline - fan-out acquisition, normalization, filtering and
//! publication of market records.
//!
//! Sources race each other through `Aggregator`; every enrichment call passes
//! the shared `EnrichmentRateLimiter`; the winning records are normalized,
//! optionally filtered by owner, and handed to the `Publisher`.

pub mod rate_limit;
pub mod acquisition;
pub mod aggregator;
pub mod transform;
pub mod filter;
pub mod publisher;

// Re-export main types
pub use rate_limit::{EnrichmentRateLimiter, DEFAULT_ENRICHMENT_INTERVAL};
pub use acquisition::{HttpAcquirer, SourceAcquirer, TaskResult};
pub use aggregator::{Aggregator, Selection};
pub use transform::{normalize, normalize_all};
pub use filter::OwnerFilter;
pub use publisher::{AddMarketRequest, HttpMarketSink, MarketSink, Publisher, RetryPolicy};
