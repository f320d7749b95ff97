//! Error taxonomy for the relay.

use crate::types::DiscoverySource;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Missing or conflicting settings. Always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid URL for {field}: {value:?} ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("include_owners and exclude_owners cannot be used together")]
    ConflictingOwnerFilters,

    #[error("{0} has only blank entries")]
    BlankOwnerList(&'static str),

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
}

/// A failed HTTP exchange with an upstream endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode response from {url}: {source} (body: {body})")]
    Decode {
        url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a discovery source produced no usable data.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("discovery failed: {0}")]
    Discovery(FetchError),

    #[error("enrichment failed: {0}")]
    Enrichment(FetchError),

    #[error("enrichment returned no records")]
    NoRecords,
}

/// A rejected or undeliverable registration.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to encode market {address}: {source}")]
    Encode {
        address: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request for market {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("destination rejected market {address} with {status}: {body}")]
    Rejected {
        address: String,
        status: StatusCode,
        body: String,
    },
}

/// Fatal outcomes of a run.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("no discovery source produced data:{}", render_failures(.failures))]
    NoSourceSucceeded {
        failures: Vec<(DiscoverySource, SourceError)>,
    },

    #[error("submission failed after {attempts} attempt(s): {source}")]
    Submission {
        attempts: usize,
        #[source]
        source: SubmissionError,
    },
}

fn render_failures(failures: &[(DiscoverySource, SourceError)]) -> String {
    failures
        .iter()
        .map(|(source, error)| format!("\n  {source}: {error}"))
        .collect()
}

pub type RelayResult<T> = Result<T, RelayError>;
