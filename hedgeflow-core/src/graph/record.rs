use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The shared record: string keys to stage-defined values.
///
/// Stages never mutate the shared record directly. They return a partial
/// record that the executor merges in; on a key collision the merged value
/// replaces the existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record<V> {
    fields: BTreeMap<String, V>,
}

impl<V> Default for Record<V> {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }
}

impl<V> Record<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: V) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.fields.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, V> {
        self.fields.iter()
    }

    /// Apply `update` on top of this record.
    pub fn merge(&mut self, update: Record<V>) {
        self.fields.extend(update.fields);
    }
}

impl<V> FromIterator<(String, V)> for Record<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<V> IntoIterator for Record<V> {
    type Item = (String, V);
    type IntoIter = btree_map::IntoIter<String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_extends() {
        let mut base = Record::new().with("a", 1).with("b", 2);
        base.merge(Record::new().with("b", 20).with("c", 30));
        assert_eq!(base.get("a"), Some(&1));
        assert_eq!(base.get("b"), Some(&20));
        assert_eq!(base.get("c"), Some(&30));
        assert_eq!(base.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn serializes_as_plain_map() {
        let r = Record::new().with("x", 1.5);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"x":1.5}"#);
    }
}
