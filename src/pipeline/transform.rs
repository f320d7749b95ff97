//! Mapping from enrichment records to the flat registration schema.

use crate::types::{AcquiredRecord, MarketParams, NormalizedRecord};
use std::collections::BTreeMap;

/// Keys forwarded to the destination's `params`.
pub const SERUM_KEYS: [&str; 6] = [
    "serumAsks",
    "serumBids",
    "serumCoinVaultAccount",
    "serumEventQueue",
    "serumPcVaultAccount",
    "serumVaultSigner",
];

/// Normalize one record. Absent or empty nested values never produce keys.
pub fn normalize(record: &AcquiredRecord) -> NormalizedRecord {
    let (address_lookup_table_address, params) = match &record.params {
        Some(params) => (
            params
                .address_lookup_table_address
                .clone()
                .filter(|address| !address.is_empty()),
            flatten_params(params),
        ),
        None => (None, None),
    };

    NormalizedRecord {
        address: record.pubkey.clone(),
        owner: record.owner.clone(),
        address_lookup_table_address,
        params,
    }
}

/// Normalize a batch, preserving order.
pub fn normalize_all<'a>(records: impl IntoIterator<Item = &'a AcquiredRecord>) -> Vec<NormalizedRecord> {
    records.into_iter().map(normalize).collect()
}

fn flatten_params(params: &MarketParams) -> Option<BTreeMap<String, String>> {
    let mut flat = BTreeMap::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            flat.insert(key.to_string(), value.to_string());
        }
    };

    let routing_group = params
        .routing_group
        .filter(|group| *group != 0)
        .map(|group| group.to_string());
    put("routingGroup", routing_group.as_deref());

    if let Some(pair) = &params.vault_lp_mint {
        put("vaultLpMintA", Some(pair.a.as_str()));
        put("vaultLpMintB", Some(pair.b.as_str()));
    }
    if let Some(pair) = &params.vault_token {
        put("vaultTokenA", Some(pair.a.as_str()));
        put("vaultTokenB", Some(pair.b.as_str()));
    }

    let serum = [
        &params.serum_asks,
        &params.serum_bids,
        &params.serum_coin_vault_account,
        &params.serum_event_queue,
        &params.serum_pc_vault_account,
        &params.serum_vault_signer,
    ];
    for (key, value) in SERUM_KEYS.into_iter().zip(serum) {
        put(key, value.as_deref());
    }

    (!flat.is_empty()).then_some(flat)
}
