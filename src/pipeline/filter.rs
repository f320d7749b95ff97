//! Allow/deny filtering by owner (DEX program id).

use crate::error::ConfigError;
use crate::types::NormalizedRecord;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Keep only these owners
    Include(HashSet<String>),
    /// Drop these owners
    Exclude(HashSet<String>),
}

impl OwnerFilter {
    /// Build a filter from the configured lists. Entries are trimmed and blank
    /// entries ignored, but a list made only of blanks is rejected. Returns
    /// `None` when neither list is given.
    pub fn from_lists(include: &[String], exclude: &[String]) -> Result<Option<Self>, ConfigError> {
        let include = owner_set("include_owners", include)?;
        let exclude = owner_set("exclude_owners", exclude)?;

        match (include, exclude) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingOwnerFilters),
            (Some(include), None) => Ok(Some(OwnerFilter::Include(include))),
            (None, Some(exclude)) => Ok(Some(OwnerFilter::Exclude(exclude))),
            (None, None) => Ok(None),
        }
    }

    pub fn keeps(&self, owner: &str) -> bool {
        match self {
            OwnerFilter::Include(owners) => owners.contains(owner),
            OwnerFilter::Exclude(owners) => !owners.contains(owner),
        }
    }

    pub fn apply(&self, records: &[NormalizedRecord]) -> Vec<NormalizedRecord> {
        records
            .iter()
            .filter(|record| self.keeps(&record.owner))
            .cloned()
            .collect()
    }

    pub fn owners(&self) -> Vec<&str> {
        let owners = match self {
            OwnerFilter::Include(owners) | OwnerFilter::Exclude(owners) => owners,
        };
        let mut owners: Vec<&str> = owners.iter().map(String::as_str).collect();
        owners.sort_unstable();
        owners
    }
}

fn owner_set(field: &'static str, owners: &[String]) -> Result<Option<HashSet<String>>, ConfigError> {
    if owners.is_empty() {
        return Ok(None);
    }
    let set: HashSet<String> = owners
        .iter()
        .map(|owner| owner.trim())
        .filter(|owner| !owner.is_empty())
        .map(str::to_owned)
        .collect();
    if set.is_empty() {
        return Err(ConfigError::BlankOwnerList(field));
    }
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(owners: &[&str]) -> Vec<String> {
        owners.iter().map(|o| o.to_string()).collect()
    }

    fn record(address: &str, owner: &str) -> NormalizedRecord {
        NormalizedRecord {
            address: address.into(),
            owner: owner.into(),
            address_lookup_table_address: None,
            params: None,
        }
    }

    fn batch() -> Vec<NormalizedRecord> {
        vec![record("P1", "A"), record("P2", "B"), record("P3", "C"), record("P4", "A")]
    }

    #[test]
    fn test_include_keeps_members_only() {
        let filter = OwnerFilter::from_lists(&list(&["A", " C "]), &[]).unwrap().unwrap();
        let kept = filter.apply(&batch());

        let addresses: Vec<_> = kept.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, ["P1", "P3", "P4"]);
        for r in batch() {
            assert_eq!(kept.contains(&r), ["A", "C"].contains(&r.owner.as_str()));
        }
    }

    #[test]
    fn test_exclude_drops_members_only() {
        let filter = OwnerFilter::from_lists(&[], &list(&["A"])).unwrap().unwrap();
        let kept = filter.apply(&batch());

        let addresses: Vec<_> = kept.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, ["P2", "P3"]);
    }

    #[test]
    fn test_input_untouched() {
        let records = batch();
        let filter = OwnerFilter::from_lists(&list(&["B"]), &[]).unwrap().unwrap();

        let kept = filter.apply(&records);

        assert_eq!(kept.len(), 1);
        assert_eq!(records, batch());
    }

    #[test]
    fn test_both_lists_rejected() {
        let result = OwnerFilter::from_lists(&list(&["A"]), &list(&["B"]));
        assert!(matches!(result, Err(ConfigError::ConflictingOwnerFilters)));
    }

    #[test]
    fn test_no_lists_means_no_filter() {
        assert_eq!(OwnerFilter::from_lists(&[], &[]).unwrap(), None);
    }

    #[test]
    fn test_blank_only_list_rejected() {
        let include = OwnerFilter::from_lists(&list(&[" "]), &[]);
        assert!(matches!(include, Err(ConfigError::BlankOwnerList("include_owners"))));

        let exclude = OwnerFilter::from_lists(&[], &list(&["", "  "]));
        assert!(matches!(exclude, Err(ConfigError::BlankOwnerList("exclude_owners"))));
    }

    #[test]
    fn test_blank_entries_dropped_beside_real_ones() {
        let filter = OwnerFilter::from_lists(&list(&["A", " "]), &[]).unwrap().unwrap();
        assert_eq!(filter.owners(), ["A"]);
    }

    #[test]
    fn test_owners_sorted() {
        let filter = OwnerFilter::from_lists(&[], &list(&["B", "A"])).unwrap().unwrap();
        assert_eq!(filter.owners(), ["A", "B"]);
    }
}
