//! Unordered set of unique string identifiers.
//!
//! Used for environment names, resource tags, and agent UUIDs. Equality
//! is order-independent; `values()` yields elements in no particular order.

use std::collections::HashSet;
use std::collections::hash_set;

use serde::{Deserialize, Serialize};

/// A set of unique strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringSet {
    data: HashSet<String>,
}

impl StringSet {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `elem` is a member.
    pub fn contains(&self, elem: &str) -> bool {
        self.data.contains(elem)
    }

    /// Insert `elem`. Adding an existing member is a no-op.
    pub fn add(&mut self, elem: impl Into<String>) {
        self.data.insert(elem.into());
    }

    /// A new set holding every member of `self` and `other`.
    pub fn union(&self, other: &StringSet) -> StringSet {
        self.data.union(&other.data).cloned().collect()
    }

    /// A new set holding the members common to `self` and `other`.
    pub fn intersect(&self, other: &StringSet) -> StringSet {
        self.data.intersection(&other.data).cloned().collect()
    }

    /// Whether every member of `other` is also in `self`.
    ///
    /// The empty set is a subset of every set, itself included.
    pub fn is_superset_of(&self, other: &StringSet) -> bool {
        self.data.is_superset(&other.data)
    }

    /// Same cardinality and same members.
    pub fn equal(&self, other: &StringSet) -> bool {
        self == other
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Members in arbitrary order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(String::as_str)
    }

    /// Members sorted, joined with `sep`. Stable across runs, so it is safe
    /// to use as a label value.
    pub fn join_sorted(&self, sep: &str) -> String {
        let mut values: Vec<&str> = self.values().collect();
        values.sort_unstable();
        values.join(sep)
    }
}

impl<S: Into<String>> FromIterator<S> for StringSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for StringSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.data.extend(iter.into_iter().map(Into::into));
    }
}

impl From<Vec<String>> for StringSet {
    fn from(values: Vec<String>) -> Self {
        values.into_iter().collect()
    }
}

impl From<&[&str]> for StringSet {
    fn from(values: &[&str]) -> Self {
        values.iter().copied().collect()
    }
}

impl IntoIterator for StringSet {
    type Item = String;
    type IntoIter = hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a> IntoIterator for &'a StringSet {
    type Item = &'a String;
    type IntoIter = hash_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
