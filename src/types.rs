//! Core types and data structures for the market relay.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// An on-chain address or mint, kept as its base58 text.
pub type Pubkey = String;

/// One upstream discovery endpoint. Its `/tokens` route yields the identifiers
/// to enrich and, unless overridden, its `/add-market` route receives the
/// normalized records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoverySource(String);

impl DiscoverySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a route onto the base address, ignoring trailing slashes.
    pub fn endpoint(&self, route: &str) -> String {
        format!("{}/{}", self.0.trim_end_matches('/'), route.trim_start_matches('/'))
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered identifiers returned by a discovery endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet(Vec<String>);

impl TokenSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined form used as the enrichment `tokens` query parameter.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl From<Vec<String>> for TokenSet {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens)
    }
}

/// A pair of vault addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultPair {
    pub a: String,
    pub b: String,
}

/// Nested market parameters as published by the enrichment endpoint.
///
/// Every field is advisory: a value of the wrong JSON type is read as absent
/// rather than failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct MarketParams {
    pub address_lookup_table_address: Option<String>,
    pub routing_group: Option<i64>,
    pub vault_lp_mint: Option<VaultPair>,
    pub vault_token: Option<VaultPair>,
    pub serum_asks: Option<String>,
    pub serum_bids: Option<String>,
    pub serum_coin_vault_account: Option<String>,
    pub serum_event_queue: Option<String>,
    pub serum_pc_vault_account: Option<String>,
    pub serum_vault_signer: Option<String>,
}

impl From<Value> for MarketParams {
    fn from(value: Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
        let pair = |key: &str| {
            value.get(key).filter(|v| v.is_object()).map(|v| VaultPair {
                a: v.get("a").and_then(Value::as_str).unwrap_or_default().to_owned(),
                b: v.get("b").and_then(Value::as_str).unwrap_or_default().to_owned(),
            })
        };

        Self {
            address_lookup_table_address: text("addressLookupTableAddress"),
            routing_group: value.get("routingGroup").and_then(Value::as_i64),
            vault_lp_mint: pair("vaultLpMint"),
            vault_token: pair("vaultToken"),
            serum_asks: text("serumAsks"),
            serum_bids: text("serumBids"),
            serum_coin_vault_account: text("serumCoinVaultAccount"),
            serum_event_queue: text("serumEventQueue"),
            serum_pc_vault_account: text("serumPcVaultAccount"),
            serum_vault_signer: text("serumVaultSigner"),
        }
    }
}

/// One raw market entry from the enrichment endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AcquiredRecord {
    /// Market account address
    #[serde(alias = "pubkeyAddress", deserialize_with = "non_empty")]
    pub pubkey: Pubkey,
    /// Owning program (DEX program id)
    #[serde(deserialize_with = "non_empty")]
    pub owner: Pubkey,
    #[serde(default)]
    pub params: Option<MarketParams>,
}

impl AcquiredRecord {
    pub fn new(pubkey: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            owner: owner.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: MarketParams) -> Self {
        self.params = Some(params);
        self
    }
}

fn non_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.is_empty() {
        return Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(""),
            &"a non-empty string",
        ));
    }
    Ok(value)
}

/// Flat, registration-ready market record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub address: Pubkey,
    pub owner: Pubkey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_lookup_table_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
}
