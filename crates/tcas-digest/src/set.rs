use std::collections::btree_set;
use std::collections::BTreeSet;

use crate::digest::Digest;

/// Ordered set of digests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet(BTreeSet<Digest>);

impl DigestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.0.contains(digest)
    }

    /// Returns whether the digest was newly inserted.
    pub fn insert(&mut self, digest: Digest) -> bool {
        self.0.insert(digest)
    }

    pub fn remove(&mut self, digest: &Digest) -> bool {
        self.0.remove(digest)
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Digest> {
        self.0.iter()
    }

    pub fn union(&self, other: &DigestSet) -> DigestSet {
        self.0.union(&other.0).cloned().collect()
    }

    /// Digests in `self` that are not in `other`.
    pub fn difference(&self, other: &DigestSet) -> DigestSet {
        self.0.difference(&other.0).cloned().collect()
    }

    pub fn intersection(&self, other: &DigestSet) -> DigestSet {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Split into chunks of at most `n` digests, e.g. for batched calls
    /// against a backend.
    pub fn chunks(&self, n: usize) -> impl Iterator<Item = DigestSet> + '_ {
        let n = n.max(1);
        let mut iter = self.0.iter().peekable();
        std::iter::from_fn(move || {
            iter.peek()?;
            Some(iter.by_ref().take(n).cloned().collect())
        })
    }
}

impl FromIterator<Digest> for DigestSet {
    fn from_iter<I: IntoIterator<Item = Digest>>(iter: I) -> Self {
        DigestSet(iter.into_iter().collect())
    }
}

impl Extend<Digest> for DigestSet {
    fn extend<I: IntoIterator<Item = Digest>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for DigestSet {
    type Item = Digest;
    type IntoIter = btree_set::IntoIter<Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DigestSet {
    type Item = &'a Digest;
    type IntoIter = btree_set::Iter<'a, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
