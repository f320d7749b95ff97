//! market-relay - Multi-source market listing relay
//!
//! Races discovery endpoints for candidate tokens, enriches them through a
//! rate-limited market-data service, normalizes the markets and registers
//! them with a destination endpoint.

pub mod types;
pub mod error;
pub mod config;
pub mod pipeline;
pub mod relay;

// Re-export main types for convenience
pub use config::{RelayConfig, RelaySettings};
pub use error::{ConfigError, RelayError, RelayResult};
pub use relay::{run, RunReport};
pub use types::{AcquiredRecord, DiscoverySource, NormalizedRecord};
