//! Known repository ids.
//!
//! Seeded from the store before a run and grown after every query batch,
//! so a later query in the same run never re-collects an id an earlier one
//! already accepted.

use std::collections::HashSet;

use crate::models::RepositoryRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownIds {
    ids: HashSet<i64>,
}

impl KnownIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique ids of a dataset; empty for an empty dataset.
    pub fn from_records(records: &[RepositoryRecord]) -> Self {
        records.iter().map(|r| r.repository_id).collect()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Returns `false` if the id was already known.
    pub fn insert(&mut self, id: i64) -> bool {
        self.ids.insert(id)
    }

    /// Fold the ids of a freshly accepted batch into the set.
    pub fn absorb(&mut self, records: &[RepositoryRecord]) {
        self.ids.extend(records.iter().map(|r| r.repository_id));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_superset(&self, other: &KnownIds) -> bool {
        self.ids.is_superset(&other.ids)
    }
}

impl FromIterator<i64> for KnownIds {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
