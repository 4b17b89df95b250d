//! Application configuration
//!
//! One TOML file with a table per component; every table and key is
//! optional. The cache endpoints can be overridden from the environment.

use serde::{Deserialize, Serialize};
use specsync_cache::{CacheConfig, RetryConfig};
use specsync_loader::{CrawlResult, ExtractConfig};
use specsync_session::CaptureConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "specsync.toml";

/// Overrides `cache.base_url`
pub const CACHE_URL_ENV: &str = "SPECSYNC_CACHE_URL";

/// Overrides `cache.bucket_url`
pub const BUCKET_URL_ENV: &str = "SPECSYNC_BUCKET_URL";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Complete `specsync` configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub capture: CaptureConfig,
    pub extract: ExtractConfig,
    /// Fixed package location used by `fetch` when no crawler is wired in
    pub crawl: Option<CrawlResult>,
}

impl AppConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for invalid TOML or mistyped keys.
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path`
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &contents)
    }

    /// Load configuration: the explicit `path`, else [`DEFAULT_CONFIG_FILE`]
    /// if present, else defaults; then apply environment overrides.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a file exists but cannot be used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::read(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SPECSYNC_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = non_blank(lookup(CACHE_URL_ENV)) {
            self.cache.base_url = url;
        }
        if let Some(url) = non_blank(lookup(BUCKET_URL_ENV)) {
            self.cache.bucket_url = Some(url);
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
