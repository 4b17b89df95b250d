//! Client bootstrap
//!
//! Download-side pipeline run before any capture: crawl, fetch, decode,
//! hash, resolve the spec and adapt it.

use crate::error::SessionError;
use specsync_artifact::{ArtifactSet, ContentHash, FrozenArtifactSet};
use specsync_cache::{AdaptedSpec, Resolution, SpecResolver};
use specsync_loader::{Crawler, DecodeKeyPair, Extractor, PackageFetcher};
use std::sync::Arc;

/// Result of a successful bootstrap
#[derive(Debug, Clone)]
pub struct LoadedClient {
    artifacts: FrozenArtifactSet,
    spec: Arc<AdaptedSpec>,
}

impl LoadedClient {
    /// Owned copy of the extracted artifacts
    #[must_use]
    pub fn artifacts(&self) -> ArtifactSet {
        self.artifacts.to_set()
    }

    /// Hashed snapshot of the extracted artifacts
    #[inline]
    #[must_use]
    pub fn frozen(&self) -> &FrozenArtifactSet {
        &self.artifacts
    }

    /// Hash of the extracted package
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.artifacts.hash()
    }

    /// Adapted spec for the package
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &Arc<AdaptedSpec> {
        &self.spec
    }
}

/// Crawl → fetch → decode → hash → resolve → adapt
#[derive(Debug, Clone)]
pub struct ClientBootstrap {
    fetcher: PackageFetcher,
    extractor: Extractor,
    resolver: SpecResolver,
}

impl ClientBootstrap {
    /// Create bootstrap pipeline
    #[must_use]
    pub fn new(fetcher: PackageFetcher, extractor: Extractor, resolver: SpecResolver) -> Self {
        Self {
            fetcher,
            extractor,
            resolver,
        }
    }

    /// Resolver used for the spec step
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &SpecResolver {
        &self.resolver
    }

    /// Run the pipeline.
    ///
    /// # Errors
    /// Returns [`SessionError::Load`] for crawl, download and decode
    /// failures, [`SessionError::Cache`] for cache failures and
    /// [`SessionError::SpecUnavailable`] if the cache has no usable spec.
    pub async fn load(&self, crawler: &dyn Crawler) -> Result<LoadedClient, SessionError> {
        tracing::info!("Loading client");
        let crawl = crawler.crawl().await?;

        let raw = self.fetcher.fetch(&crawl.archive, &crawl.referer).await?;
        let keys = DecodeKeyPair::from_parameters(&crawl.parameters)?;
        let artifacts = self.extractor.decode(keys, &raw)?.freeze();

        let hash = artifacts.hash();
        tracing::info!("Unpacking ({})", hash.short());

        let spec = match self.resolver.resolve(&artifacts).await? {
            Resolution::Ready(spec) => spec,
            Resolution::Stale => return Err(SessionError::SpecUnavailable(hash.to_hex())),
        };
        let spec = Arc::new(spec.adapt()?);
        tracing::debug!("spec {} maps {} classes", hash.short(), spec.len());

        Ok(LoadedClient { artifacts, spec })
    }
}
