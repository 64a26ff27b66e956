//! Tag Index Module
//!
//! Secondary index from tag to the keys currently carrying it. The index
//! holds key names only; entries are owned by the store.

use std::collections::{BTreeSet, HashMap};

// == Tag Index ==
#[derive(Debug, Default)]
pub struct TagIndex {
    buckets: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` under every tag in `tags`.
    pub fn insert<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            self.buckets
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Drops `key` from each of `tags`, pruning buckets left empty.
    pub fn remove<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            if let Some(bucket) = self.buckets.get_mut(tag) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    /// Union of keys across `tags`, each key reported once, sorted.
    pub fn keys_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> BTreeSet<String> {
        tags.iter()
            .filter_map(|tag| self.buckets.get(tag.as_ref()))
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.buckets
            .get(tag)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All tags with at least one key, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.buckets.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.buckets
            .get(tag)
            .is_some_and(|bucket| bucket.contains(key))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.buckets.iter()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
