//! Relay configuration.
//!
//! A TOML document deserialized into `RelayConfig`, optionally overridden from
//! the command line, then validated into `RelaySettings` before any network
//! activity.

use crate::error::ConfigError;
use crate::pipeline::{OwnerFilter, RetryPolicy, DEFAULT_ENRICHMENT_INTERVAL};
use crate::types::DiscoverySource;
use nonempty::NonEmpty;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Market-data cache used when no enrichment URL is configured.
pub const DEFAULT_ENRICHMENT_URL: &str = "https://pro.circular.bot/market/cache";

/// Raw configuration as read from file and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Discovery endpoints, raced against each other
    #[serde(default)]
    pub sources: Vec<String>,
    /// Enrichment (market data) endpoint
    #[serde(default)]
    pub enrichment_url: Option<String>,
    /// API key for the enrichment endpoint
    #[serde(default)]
    pub api_key: Option<String>,
    /// Registration endpoint. Defaults to the winning discovery source.
    #[serde(default)]
    pub destination_url: Option<String>,
    /// Keep only markets with these owners
    #[serde(default)]
    pub include_owners: Vec<String>,
    /// Drop markets with these owners
    #[serde(default)]
    pub exclude_owners: Vec<String>,
    /// Minimum seconds between enrichment calls
    #[serde(default = "default_enrichment_interval_secs")]
    pub enrichment_interval_secs: u64,
    /// Per-request HTTP timeout; none when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Submission retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

fn default_enrichment_interval_secs() -> u64 {
    DEFAULT_ENRICHMENT_INTERVAL.as_secs()
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            enrichment_url: None,
            api_key: None,
            destination_url: None,
            include_owners: Vec::new(),
            exclude_owners: Vec::new(),
            enrichment_interval_secs: default_enrichment_interval_secs(),
            request_timeout_secs: None,
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Validated settings consumed by the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub sources: NonEmpty<DiscoverySource>,
    pub enrichment_url: String,
    pub api_key: String,
    pub destination_url: Option<String>,
    pub owner_filter: Option<OwnerFilter>,
    pub enrichment_interval: Duration,
    pub request_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check required settings and build the typed form.
    pub fn validate(&self) -> Result<RelaySettings, ConfigError> {
        let owner_filter = OwnerFilter::from_lists(&self.include_owners, &self.exclude_owners)?;

        let sources = self
            .sources
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| parse_url("sources", entry).map(|_| DiscoverySource::new(entry)))
            .collect::<Result<Vec<_>, _>>()?;
        let sources = NonEmpty::from_vec(sources).ok_or(ConfigError::Missing("sources"))?;

        let enrichment_url = non_blank(self.enrichment_url.as_deref())
            .unwrap_or(DEFAULT_ENRICHMENT_URL)
            .to_string();
        parse_url("enrichment_url", &enrichment_url)?;

        let api_key = non_blank(self.api_key.as_deref())
            .ok_or(ConfigError::Missing("api_key"))?
            .to_string();

        let destination_url = non_blank(self.destination_url.as_deref())
            .map(|url| parse_url("destination_url", url).map(|_| url.to_string()))
            .transpose()?;

        let max_attempts =
            NonZeroUsize::new(self.retry.max_attempts).ok_or(ConfigError::ZeroAttempts)?;

        let settings = RelaySettings {
            sources,
            enrichment_url,
            api_key,
            destination_url,
            owner_filter,
            enrichment_interval: Duration::from_secs(self.enrichment_interval_secs),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            retry: RetryPolicy::new(max_attempts, Duration::from_secs(self.retry.delay_secs)),
        };
        if settings.enrichment_interval_reduced() {
            warn!(
                "enrichment_interval_secs = {} is below the service budget of {}s; \
                 the enrichment endpoint may throttle or reject calls",
                self.enrichment_interval_secs,
                DEFAULT_ENRICHMENT_INTERVAL.as_secs()
            );
        }
        Ok(settings)
    }
}

impl RelaySettings {
    /// True when enrichment calls are spaced closer than the service allows.
    pub fn enrichment_interval_reduced(&self) -> bool {
        self.enrichment_interval < DEFAULT_ENRICHMENT_INTERVAL
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}
