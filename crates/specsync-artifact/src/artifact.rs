//! Named code artifacts and the sets they are collected into
//!
//! An [`Artifact`] is one unit of code, identified by name. An [`ArtifactSet`]
//! is the deduplicated collection for one session; it is ordered by name so
//! that hashing and packing never depend on discovery order.

use crate::hash::ContentHash;
use bytes::Bytes;
use std::collections::btree_map::{self, BTreeMap};
use std::sync::Arc;

/// One named, immutable unit of loaded or extracted code
///
/// Cheap to clone: the payload is reference-counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    bytes: Bytes,
}

impl Artifact {
    /// Create artifact from name and payload
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Artifact name (its identity)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact payload
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Payload length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Name-keyed, name-ordered collection of artifacts
///
/// # Invariants
/// - Keys are unique; inserting an existing name replaces the entry
/// - Iteration is always in ascending name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    entries: BTreeMap<String, Artifact>,
}

impl ArtifactSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert artifact, returning the entry it replaced
    pub fn insert(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.entries.insert(artifact.name.clone(), artifact)
    }

    /// Merge `other` into this set; entries from `other` win on name clashes.
    pub fn merge(&mut self, other: impl IntoIterator<Item = Artifact>) {
        for artifact in other {
            self.insert(artifact);
        }
    }

    /// Look up artifact by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.entries.get(name)
    }

    /// Whether an artifact with this name exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate artifacts in name order
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }

    /// Artifact names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Total payload size of all artifacts
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(Artifact::len).sum()
    }

    /// Canonical content hash: every payload fed into one digest context in
    /// ascending name order.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute_all(self.entries.values().map(|a| a.bytes.as_ref()))
    }

    /// Hash the set and turn it into an immutable shared snapshot
    #[must_use]
    pub fn freeze(self) -> FrozenArtifactSet {
        let hash = self.content_hash();
        FrozenArtifactSet {
            hash,
            set: Arc::new(self),
        }
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        let mut set = Self::new();
        set.merge(iter);
        set
    }
}

impl IntoIterator for ArtifactSet {
    type Item = Artifact;
    type IntoIter = btree_map::IntoValues<String, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Artifact;
    type IntoIter = btree_map::Values<'a, String, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// An artifact set that has been hashed and can no longer change
///
/// Clones share the same snapshot, so the set handed to an upload is exactly
/// the set the hash was computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenArtifactSet {
    hash: ContentHash,
    set: Arc<ArtifactSet>,
}

impl FrozenArtifactSet {
    /// Hash computed at freeze time
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Borrow the frozen set
    #[inline]
    #[must_use]
    pub fn set(&self) -> &ArtifactSet {
        &self.set
    }

    /// Owned, mutable copy of the artifacts
    #[must_use]
    pub fn to_set(&self) -> ArtifactSet {
        ArtifactSet::clone(&self.set)
    }

    /// Number of artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Artifact> {
        vec![
            Artifact::new("client", &b"client-bytes"[..]),
            Artifact::new("ab", &b"ab-bytes"[..]),
            Artifact::new("zz", &b"zz-bytes"[..]),
        ]
    }

    #[test]
    fn iteration_is_name_ordered() {
        let set: ArtifactSet = sample().into_iter().collect();
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["ab", "client", "zz"]);
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut set = ArtifactSet::new();
        assert!(set.insert(Artifact::new("a", &b"one"[..])).is_none());
        let old = set.insert(Artifact::new("a", &b"two"[..])).unwrap();
        assert_eq!(old.bytes().as_ref(), b"one");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().bytes().as_ref(), b"two");
    }

    #[test]
    fn merge_prefers_incoming_entries() {
        let mut known: ArtifactSet = vec![
            Artifact::new("a", &b"downloaded"[..]),
            Artifact::new("b", &b"downloaded"[..]),
        ]
        .into_iter()
        .collect();
        known.merge(vec![Artifact::new("a", &b"captured"[..])]);
        assert_eq!(known.get("a").unwrap().bytes().as_ref(), b"captured");
        assert_eq!(known.get("b").unwrap().bytes().as_ref(), b"downloaded");
    }

    #[test]
    fn hash_is_independent_of_insertion_order() {
        let forward: ArtifactSet = sample().into_iter().collect();
        let backward: ArtifactSet = sample().into_iter().rev().collect();
        assert_eq!(forward.content_hash(), backward.content_hash());
    }

    #[test]
    fn hash_changes_with_content() {
        let a: ArtifactSet = sample().into_iter().collect();
        let mut b = a.clone();
        b.insert(Artifact::new("ab", &b"patched"[..]));
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn freeze_keeps_hash_and_contents() {
        let set: ArtifactSet = sample().into_iter().collect();
        let expected = set.content_hash();
        let frozen = set.freeze();
        assert_eq!(frozen.hash(), expected);
        assert_eq!(frozen.len(), 3);

        let mut copy = frozen.to_set();
        copy.insert(Artifact::new("extra", &b"x"[..]));
        assert_eq!(frozen.len(), 3);
        assert_eq!(frozen.set().content_hash(), expected);
    }

    #[test]
    fn total_bytes_sums_payloads() {
        let set: ArtifactSet = sample().into_iter().collect();
        assert_eq!(set.total_bytes(), 12 + 8 + 8);
    }
}
