//! Property tests for the canonical content hash.
//!
//! The hash is the cache key shared by every client; two clients that capture
//! the same artifacts in a different order must land on the same cache entry.

use proptest::prelude::*;
use specsync_artifact::{Artifact, ArtifactSet};
use std::collections::BTreeMap;

fn artifacts() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map("[a-z]{1,6}", prop::collection::vec(any::<u8>(), 0..64), 1..12)
        .prop_map(|m: BTreeMap<String, Vec<u8>>| m.into_iter().collect())
}

proptest! {
    /// Tenet: hashing is invariant under insertion order.
    #[test]
    fn hash_ignores_insertion_order(entries in artifacts(), seed in any::<u64>()) {
        let ordered: ArtifactSet = entries
            .iter()
            .map(|(n, b)| Artifact::new(n.clone(), b.clone()))
            .collect();

        let mut shuffled = entries.clone();
        // deterministic rotation + reversal driven by the seed
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        if seed % 2 == 0 {
            shuffled.reverse();
        }
        let permuted: ArtifactSet = shuffled
            .into_iter()
            .map(|(n, b)| Artifact::new(n, b))
            .collect();

        prop_assert_eq!(ordered.content_hash(), permuted.content_hash());
    }

    /// Tenet: the rendered identifier is always 64 lowercase hex chars.
    #[test]
    fn rendered_hash_is_fixed_width(entries in artifacts()) {
        let set: ArtifactSet = entries
            .into_iter()
            .map(|(n, b)| Artifact::new(n, b))
            .collect();
        let rendered = set.content_hash().to_string();
        prop_assert_eq!(rendered.len(), 64);
        prop_assert!(rendered.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }
}
