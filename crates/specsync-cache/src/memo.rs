//! Process-local memo of resolved specs using moka
//!
//! Once a hash has resolved to a spec, later lookups in the same process are
//! answered without touching the network and return the identical bytes.

use crate::spec::TransformSpec;
use moka::future::Cache;
use specsync_artifact::ContentHash;
use std::time::Duration;

/// Resolved-spec memo keyed by content hash
#[derive(Debug, Clone)]
pub struct SpecMemo {
    inner: Cache<ContentHash, TransformSpec>,
}

impl SpecMemo {
    /// Create memo with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create memo whose entries expire `ttl` after insertion
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Remember `spec` under its hash
    #[inline]
    pub async fn insert(&self, spec: TransformSpec) {
        self.inner.insert(spec.hash(), spec).await;
    }

    /// Previously resolved spec for `hash`
    #[inline]
    pub async fn get(&self, hash: &ContentHash) -> Option<TransformSpec> {
        self.inner.get(hash).await
    }

    /// Forget `hash`; used before a spec is rebuilt
    #[inline]
    pub async fn invalidate(&self, hash: &ContentHash) {
        self.inner.invalidate(hash).await;
    }

    /// Whether `hash` is memoized
    #[inline]
    pub async fn contains(&self, hash: &ContentHash) -> bool {
        self.inner.get(hash).await.is_some()
    }
}

impl Default for SpecMemo {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(seed: &[u8]) -> TransformSpec {
        TransformSpec::from_decrypted(ContentHash::compute(seed), &br#"{"version":1}"#[..]).unwrap()
    }

    #[tokio::test]
    async fn memo_insert_and_get() {
        let memo = SpecMemo::default();
        let spec = spec(b"a");
        memo.insert(spec.clone()).await;
        assert_eq!(memo.get(&spec.hash()).await, Some(spec));
    }

    #[tokio::test]
    async fn memo_misses_unknown_hash() {
        let memo = SpecMemo::new(4);
        assert!(memo.get(&ContentHash::compute(b"missing")).await.is_none());
    }

    #[tokio::test]
    async fn memo_invalidation() {
        let memo = SpecMemo::new(4);
        let spec = spec(b"b");
        memo.insert(spec.clone()).await;
        assert!(memo.contains(&spec.hash()).await);

        memo.invalidate(&spec.hash()).await;
        assert!(!memo.contains(&spec.hash()).await);
    }

    #[tokio::test]
    async fn memo_entries_expire() {
        let memo = SpecMemo::with_ttl(4, Duration::from_millis(50));
        let spec = spec(b"c");
        memo.insert(spec.clone()).await;
        assert!(memo.contains(&spec.hash()).await);

        // moka reads its own clock, so this is a real sleep
        std::thread::sleep(Duration::from_millis(200));
        assert!(!memo.contains(&spec.hash()).await);
    }
}
