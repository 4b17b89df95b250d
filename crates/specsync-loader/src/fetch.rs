//! Package fetcher

use crate::error::LoadError;
use bytes::Bytes;
use specsync_net::{HttpRequest, HttpTransport};
use std::sync::Arc;

/// Downloads the encrypted client package
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl PackageFetcher {
    /// Create fetcher over a transport
    #[inline]
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// GET `url` with `Referer: referer`, following redirects.
    ///
    /// # Errors
    /// Returns [`LoadError::Network`] on transport failure, a non-success
    /// status, or an empty body.
    pub async fn fetch(&self, url: &str, referer: &str) -> Result<Bytes, LoadError> {
        let request = HttpRequest::get(url)
            .with_header("Referer", referer)
            .following_redirects();
        let response = self.transport.execute(request).await?;

        if !response.status.is_success() {
            return Err(LoadError::network(url, format!("status {}", response.status)));
        }
        if response.body.is_empty() {
            return Err(LoadError::network(url, "empty response body"));
        }

        tracing::debug!("downloaded {} bytes from {}", response.body.len(), url);
        Ok(response.body)
    }
}
