use crate::models::{TargetItem, WatchedRecord};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no provider ID or name match for '{0}'")]
    NotFound(String),
}

/// Which lookup tier produced a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedBy {
    Provider(String),
    SecondaryKey(String),
}

#[derive(Debug)]
pub struct Resolved<'a> {
    pub item: &'a TargetItem,
    pub matched_by: MatchedBy,
}

pub fn provider_key(provider: &str, id: &str) -> String {
    format!("{}:{}", provider, id)
}

/// Lookup tables over the live items of one restore batch.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_provider: HashMap<String, TargetItem>,
    by_secondary: HashMap<String, TargetItem>,
}

impl IdentityIndex {
    /// Indexes every item under each of its provider keys and its secondary
    /// key. On duplicate keys the later item wins.
    pub fn build<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a TargetItem>,
    {
        let mut index = IdentityIndex::default();
        for item in items {
            for (provider, id) in &item.provider_ids {
                insert_last_wins(&mut index.by_provider, provider_key(provider, id), item);
            }
            insert_last_wins(&mut index.by_secondary, item.secondary_key(), item);
        }
        index
    }

    /// Provider IDs are tried first, in the record's order; the secondary key
    /// is only consulted when none of them hit.
    pub fn resolve(&self, record: &WatchedRecord) -> Result<Resolved<'_>, ResolveError> {
        for (provider, id) in &record.provider_ids {
            let key = provider_key(provider, id);
            if let Some(item) = self.by_provider.get(&key) {
                return Ok(Resolved {
                    item,
                    matched_by: MatchedBy::Provider(key),
                });
            }
        }

        let key = record.secondary_key();
        match self.by_secondary.get(&key) {
            Some(item) => Ok(Resolved {
                item,
                matched_by: MatchedBy::SecondaryKey(key),
            }),
            None => Err(ResolveError::NotFound(record.name.clone())),
        }
    }
}

fn insert_last_wins(map: &mut HashMap<String, TargetItem>, key: String, item: &TargetItem) {
    if let Some(previous) = map.get(&key) {
        if previous.id != item.id {
            warn!(
                "Key '{}' shared by items {} ('{}') and {} ('{}'), keeping the latter",
                key, previous.id, previous.name, item.id, item.name
            );
        }
    }
    map.insert(key, item.clone());
}
