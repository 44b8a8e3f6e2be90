use super::PathMetadata;
use crate::error::Result;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Aggregate records in insertion order, unique by locator key
#[derive(Debug, Clone, Default)]
pub(crate) struct AggregateIndex {
    entries: BTreeMap<u64, PathMetadata>,
    keys: HashMap<String, u64>,
    next: u64,
}

impl AggregateIndex {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&PathMetadata> {
        self.keys.get(key).and_then(|seq| self.entries.get(seq))
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut PathMetadata> {
        let seq = self.keys.get(key)?;
        self.entries.get_mut(seq)
    }

    /// The record under `key`, created with `create` when missing
    pub(crate) fn get_or_try_insert_with(
        &mut self,
        key: &str,
        create: impl FnOnce() -> Result<PathMetadata>,
    ) -> Result<&mut PathMetadata> {
        let seq = match self.keys.get(key) {
            Some(&seq) => seq,
            None => {
                let seq = self.next;
                self.next += 1;
                seq
            }
        };
        match self.entries.entry(seq) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let metadata = create()?;
                self.keys.insert(key.to_string(), seq);
                Ok(entry.insert(metadata))
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<PathMetadata> {
        let seq = self.keys.remove(key)?;
        self.entries.remove(&seq)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &PathMetadata> {
        self.entries.values()
    }
}

impl PartialEq for AggregateIndex {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.values().eq(other.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;

    fn record(uri: &str) -> PathMetadata {
        PathMetadata::external(Locator::parse(uri).unwrap())
    }

    fn insert(index: &mut AggregateIndex, uri: &str) {
        index
            .get_or_try_insert_with(uri, || Ok(record(uri)))
            .unwrap();
    }

    #[test]
    fn test_insertion_order_survives_update_and_remove() {
        let mut index = AggregateIndex::default();
        insert(&mut index, "http://example.com/b");
        insert(&mut index, "http://example.com/a");
        insert(&mut index, "http://example.com/c");

        // An existing key is returned as is, without calling the constructor
        index
            .get_or_try_insert_with("http://example.com/b", || panic!("already present"))
            .unwrap()
            .mediatype = Some("text/plain".to_string());
        index.remove("http://example.com/a");

        let keys: Vec<String> = index.values().map(|m| m.key()).collect();
        assert_eq!(keys, vec!["http://example.com/b", "http://example.com/c"]);
        assert_eq!(
            index.get("http://example.com/b").unwrap().mediatype.as_deref(),
            Some("text/plain")
        );

        // Re-adding a removed key appends it
        insert(&mut index, "http://example.com/a");
        let keys: Vec<String> = index.values().map(|m| m.key()).collect();
        assert_eq!(keys.last().map(String::as_str), Some("http://example.com/a"));
    }

    #[test]
    fn test_get_mut_only_finds_existing() {
        let mut index = AggregateIndex::default();
        assert!(index.get_mut("http://example.com/x").is_none());
        assert!(index.is_empty());

        insert(&mut index, "http://example.com/x");
        index.get_mut("http://example.com/x").unwrap().mediatype = Some("text/csv".to_string());
        assert_eq!(
            index.get("http://example.com/x").unwrap().mediatype.as_deref(),
            Some("text/csv")
        );
    }

    #[test]
    fn test_failed_create_inserts_nothing() {
        let mut index = AggregateIndex::default();
        let result = index.get_or_try_insert_with("http://example.com/x", || {
            Err(crate::error::BundleError::Closed)
        });
        assert!(result.is_err());
        assert_eq!(index.len(), 0);
        assert!(index.get("http://example.com/x").is_none());
    }
}
