//! Capture session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture window and apply-loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wait between trapping and untrapping, in milliseconds
    pub settle_ms: u64,
    /// Loader parent type prefix identifying application code
    pub loader_prefix: String,
    /// Give up after this many stale rebuilds
    pub max_rebuilds: Option<u32>,
}

impl CaptureConfig {
    /// With settle window
    #[inline]
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = u64::try_from(settle.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With loader prefix
    #[inline]
    #[must_use]
    pub fn with_loader_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.loader_prefix = prefix.into();
        self
    }

    /// With rebuild limit
    #[inline]
    #[must_use]
    pub fn with_max_rebuilds(mut self, rebuilds: u32) -> Self {
        self.max_rebuilds = Some(rebuilds);
        self
    }

    /// Settle window
    #[inline]
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_ms: 2500,
            loader_prefix: "app.".to_string(),
            max_rebuilds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.settle(), Duration::from_millis(2500));
        assert_eq!(config.loader_prefix, "app.");
        assert_eq!(config.max_rebuilds, None);
    }

    #[test]
    fn builders() {
        let config = CaptureConfig::default()
            .with_settle(Duration::from_secs(1))
            .with_loader_prefix("game.")
            .with_max_rebuilds(2);
        assert_eq!(config.settle_ms, 1000);
        assert_eq!(config.loader_prefix, "game.");
        assert_eq!(config.max_rebuilds, Some(2));
    }
}
