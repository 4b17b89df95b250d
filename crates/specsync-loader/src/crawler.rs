//! Crawler interface
//!
//! Discovering where the client package lives is not this crate's job; a
//! [`Crawler`] hands over the archive location, the referer context and the
//! decode parameters.

use crate::error::LoadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameter carrying the cipher key
pub const KEY_PARAMETER: &str = "0";

/// Parameter carrying the initialization vector
pub const IV_PARAMETER: &str = "-1";

/// Output of a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Package download URL
    pub archive: String,
    /// Application entry page, sent as `Referer`
    pub referer: String,
    /// Decode parameters scraped alongside the archive
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Source of download locations and decode parameters
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Locate the current client package.
    ///
    /// # Errors
    /// Returns [`LoadError::Crawl`] when the location cannot be discovered.
    async fn crawl(&self) -> Result<CrawlResult, LoadError>;
}

/// Crawler that returns a fixed result (configuration or tests)
#[derive(Debug, Clone)]
pub struct StaticCrawler {
    result: CrawlResult,
}

impl StaticCrawler {
    /// Wrap a known crawl result
    #[inline]
    #[must_use]
    pub fn new(result: CrawlResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl Crawler for StaticCrawler {
    async fn crawl(&self) -> Result<CrawlResult, LoadError> {
        if self.result.archive.is_empty() {
            return Err(LoadError::Crawl("no archive location configured".into()));
        }
        Ok(self.result.clone())
    }
}
