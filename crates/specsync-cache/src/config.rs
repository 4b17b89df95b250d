//! Cache client configuration

use serde::{Deserialize, Serialize};
use specsync_artifact::ContentHash;
use std::time::Duration;

/// Base pending delay used by the cache service (3 minutes and 30 ms)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000 * 60 * 3 + 30;

/// Spec cache endpoint and protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache base URL; entries live at `<base_url>/<hash>`
    pub base_url: String,
    /// Builder-election endpoint base; defaults to `base_url`
    pub bucket_url: Option<String>,
    /// Client name used in the `x-<name>-cv` header
    pub client_name: String,
    /// Client protocol version sent in the `x-<name>-cv` header
    pub client_version: String,
    /// Payload cipher suite
    pub cipher_suite: String,
    /// Base pending delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum number of resolved specs kept in memory
    pub memo_capacity: u64,
    /// Drop memoized specs this long after they were fetched; kept for the
    /// life of the process when unset
    pub memo_ttl_ms: Option<u64>,
    /// Whole-request timeout for cache exchanges in milliseconds
    pub request_timeout_ms: u64,
}

impl CacheConfig {
    /// Create default configuration for `base_url`
    #[inline]
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// With base pending delay
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With a separate builder-election endpoint
    #[inline]
    #[must_use]
    pub fn with_bucket_url(mut self, url: impl Into<String>) -> Self {
        self.bucket_url = Some(url.into());
        self
    }

    /// With cipher suite name
    #[inline]
    #[must_use]
    pub fn with_cipher_suite(mut self, suite: impl Into<String>) -> Self {
        self.cipher_suite = suite.into();
        self
    }

    /// Base pending delay
    #[inline]
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// With memo expiry
    #[inline]
    #[must_use]
    pub fn with_memo_ttl(mut self, ttl: Duration) -> Self {
        self.memo_ttl_ms = Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Memo expiry, if any
    #[inline]
    #[must_use]
    pub fn memo_ttl(&self) -> Option<Duration> {
        self.memo_ttl_ms.map(Duration::from_millis)
    }

    /// Request timeout for cache exchanges
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// URL of the cache entry for `hash`
    #[must_use]
    pub fn entry_url(&self, hash: &ContentHash) -> String {
        join(&self.base_url, hash)
    }

    /// URL used to request the upload target for `hash`
    #[must_use]
    pub fn bucket_entry_url(&self, hash: &ContentHash) -> String {
        join(self.bucket_url.as_deref().unwrap_or(&self.base_url), hash)
    }

    /// Client version header as `(name, value)`
    #[must_use]
    pub fn version_header(&self) -> (String, String) {
        (
            format!("x-{}-cv", self.client_name.to_lowercase()),
            self.client_version.clone(),
        )
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/loader/spec".to_string(),
            bucket_url: None,
            client_name: "specsync".to_string(),
            client_version: "100".to_string(),
            cipher_suite: crate::crypto::DEFAULT_SUITE.to_string(),
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            memo_capacity: 64,
            memo_ttl_ms: None,
            request_timeout_ms: 120_000,
        }
    }
}

/// Limits on the pending/backoff loop
///
/// Both limits are off by default: the loop only ends on a spec, a fatal
/// error or cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Give up after this many cache requests
    pub max_attempts: Option<u32>,
    /// Give up once this much time has been spent waiting
    pub deadline_ms: Option<u64>,
    /// Random extra delay (0..jitter_ms) added to each wait
    pub jitter_ms: u64,
}

impl RetryConfig {
    /// With attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// With deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

fn join(base: &str, hash: &ContentHash) -> String {
    format!("{}/{}", base.trim_end_matches('/'), hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_urls() {
        let hash = ContentHash::compute(b"x");
        let config = CacheConfig::new("http://cache/spec/");
        assert_eq!(config.entry_url(&hash), format!("http://cache/spec/{hash}"));
        assert_eq!(config.bucket_entry_url(&hash), config.entry_url(&hash));

        let split = config.with_bucket_url("http://cache/bucket");
        assert_eq!(split.bucket_entry_url(&hash), format!("http://cache/bucket/{hash}"));
    }

    #[test]
    fn version_header_is_lowercased() {
        let mut config = CacheConfig::default();
        config.client_name = "SpecSync".into();
        assert_eq!(
            config.version_header(),
            ("x-specsync-cv".to_string(), "100".to_string())
        );
    }

    #[test]
    fn default_delay_matches_service() {
        assert_eq!(CacheConfig::default().base_delay(), Duration::from_millis(180_030));
    }

    #[test]
    fn deserializes_partial_toml_like_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"base_url":"http://c","base_delay_ms":1000}"#).unwrap();
        assert_eq!(config.base_url, "http://c");
        assert_eq!(config.base_delay(), Duration::from_secs(1));
        assert_eq!(config.client_version, "100");
        assert_eq!(config.memo_ttl(), None);
    }

    #[test]
    fn memo_ttl_round_trips_through_millis() {
        let config = CacheConfig::default().with_memo_ttl(Duration::from_secs(90));
        assert_eq!(config.memo_ttl_ms, Some(90_000));
        assert_eq!(config.memo_ttl(), Some(Duration::from_secs(90)));
    }
}
