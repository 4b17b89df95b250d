//! Spec cache protocol client
//!
//! One `get` is one round of the shared-cache protocol for a content hash:
//!
//! | status | meaning |
//! |---|---|
//! | `200` | body is the encrypted spec |
//! | `202` | someone is building the spec; wait the base delay |
//! | `303` | this caller is the builder; upload to `Location`, then notify |
//! | `400` | the service refuses this hash |
//! | `404`/`410` | no entry for a hash the caller expected (stale) |
//!
//! The service elects at most one builder per hash; every other caller sees
//! `202` until the spec is published.

use crate::config::CacheConfig;
use crate::crypto::{seal_pack, CipherSuite, SpecKey};
use crate::error::CacheError;
use crate::memo::SpecMemo;
use crate::spec::TransformSpec;
use specsync_artifact::{ContentHash, FrozenArtifactSet};
use specsync_net::{HttpRequest, HttpResponse, HttpTransport, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Why the caller has to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingCause {
    /// Another caller holds the builder role
    BuildingElsewhere,
    /// This caller just uploaded and the service is materializing the spec
    JustTriggered,
}

/// Server-directed wait before asking again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingState {
    pub delay: Duration,
    pub cause: PendingCause,
}

impl PendingState {
    /// Pending with `delay`
    #[inline]
    #[must_use]
    pub fn new(delay: Duration, cause: PendingCause) -> Self {
        Self { delay, cause }
    }
}

/// Non-fatal result of one protocol round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Spec is available
    Ready(TransformSpec),
    /// Ask again later
    Pending(PendingState),
    /// The entry does not describe the caller's artifact set
    Stale,
}

/// Client for the shared spec cache
#[derive(Debug, Clone)]
pub struct SpecCacheClient {
    transport: Arc<dyn HttpTransport>,
    config: CacheConfig,
    suite: CipherSuite,
    memo: SpecMemo,
}

impl SpecCacheClient {
    /// Create client; the configured cipher suite is resolved up front.
    ///
    /// # Errors
    /// Returns [`CacheError::CryptoUnavailable`] for an unknown suite name.
    pub fn new(transport: Arc<dyn HttpTransport>, config: CacheConfig) -> Result<Self, CacheError> {
        let suite = config.cipher_suite.parse()?;
        let memo = match config.memo_ttl() {
            Some(ttl) => SpecMemo::with_ttl(config.memo_capacity, ttl),
            None => SpecMemo::new(config.memo_capacity),
        };
        Ok(Self {
            transport,
            config,
            suite,
            memo,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Key used for `hash`'s entry
    #[inline]
    #[must_use]
    pub fn key_for(&self, hash: &ContentHash) -> SpecKey {
        SpecKey::derive(self.suite, hash)
    }

    /// Run one protocol round for `artifacts`.
    ///
    /// If elected builder, the upload and completion notify happen inside this
    /// call and the result is `Pending` with twice the base delay.
    ///
    /// # Errors
    /// Returns [`CacheError`] for transport failures, rejections and
    /// unexpected statuses.
    pub async fn get(&self, artifacts: &FrozenArtifactSet) -> Result<CacheOutcome, CacheError> {
        let hash = artifacts.hash();
        if let Some(spec) = self.memo.get(&hash).await {
            tracing::debug!("spec {} served from memo", hash.short());
            return Ok(CacheOutcome::Ready(spec));
        }

        let response = self.send(HttpRequest::get(self.config.entry_url(&hash))).await?;
        if response.status == StatusCode::OK {
            return self.accept_spec(hash, &response).await;
        }

        // A split deployment serves published specs and elects builders on
        // different endpoints.
        let response = if self.config.bucket_url.is_some() {
            self.send(HttpRequest::get(self.config.bucket_entry_url(&hash)))
                .await?
        } else {
            response
        };

        match response.status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!("no cache entry for {}", hash.short());
                Ok(CacheOutcome::Stale)
            }
            _ => self.election(artifacts, &response).await.map(CacheOutcome::Pending),
        }
    }

    /// Ask to rebuild the entry for `artifacts` and, if granted, upload it.
    ///
    /// Used when a published spec does not fit the caller's set. `202` means
    /// another caller is already rebuilding.
    ///
    /// # Errors
    /// As for [`SpecCacheClient::get`]; any status besides `202`/`303`/`400`
    /// is a protocol error.
    pub async fn submit(&self, artifacts: &FrozenArtifactSet) -> Result<PendingState, CacheError> {
        let hash = artifacts.hash();
        self.memo.invalidate(&hash).await;

        let request = HttpRequest::get(self.config.bucket_entry_url(&hash))
            .with_header(self.rebuild_header(), "1");
        let response = self.send(request).await?;
        self.election(artifacts, &response).await
    }

    /// Outcome of a builder-election response
    async fn election(
        &self,
        artifacts: &FrozenArtifactSet,
        response: &HttpResponse,
    ) -> Result<PendingState, CacheError> {
        let hash = artifacts.hash();
        match response.status {
            StatusCode::ACCEPTED => Ok(PendingState::new(
                self.config.base_delay(),
                PendingCause::BuildingElsewhere,
            )),
            StatusCode::SEE_OTHER => {
                let target = response
                    .header("Location")
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| CacheError::protocol(response.status, "303 without Location"))?;
                self.build(artifacts, target).await
            }
            StatusCode::BAD_REQUEST => {
                tracing::warn!("spec cache rejected update for {}", hash);
                Err(CacheError::Rejected { hash })
            }
            status => Err(CacheError::protocol(status, "unexpected cache response")),
        }
    }

    /// Builder path: upload the sealed pack, then notify completion.
    async fn build(&self, artifacts: &FrozenArtifactSet, target: &str) -> Result<PendingState, CacheError> {
        let hash = artifacts.hash();
        tracing::info!("Updating spec cache, please do not disconnect or close");

        let body = seal_pack(&self.key_for(&hash), artifacts)?;
        tracing::debug!(
            "uploading {} artifacts ({} sealed bytes) for {}",
            artifacts.len(),
            body.len(),
            hash.short()
        );
        let upload = self.send(HttpRequest::put(target, body)).await?;
        if upload.status != StatusCode::OK {
            return Err(CacheError::UploadRejected {
                status: upload.status,
            });
        }

        let notify = self
            .send(HttpRequest::put(self.config.bucket_entry_url(&hash), Vec::new()))
            .await?;
        match notify.status {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(PendingState::new(
                self.config.base_delay() * 2,
                PendingCause::JustTriggered,
            )),
            status => Err(CacheError::NotifyRejected { status }),
        }
    }

    /// Decrypt a `200` body; an undecodable document is stale.
    async fn accept_spec(
        &self,
        hash: ContentHash,
        response: &HttpResponse,
    ) -> Result<CacheOutcome, CacheError> {
        let plain = self.key_for(&hash).apply(&response.body)?;
        match TransformSpec::from_decrypted(hash, plain) {
            Ok(spec) => {
                self.memo.insert(spec.clone()).await;
                Ok(CacheOutcome::Ready(spec))
            }
            Err(e) => {
                tracing::warn!("cached spec for {} is unreadable: {}", hash.short(), e);
                Ok(CacheOutcome::Stale)
            }
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CacheError> {
        let (name, value) = self.config.version_header();
        let response = self.transport.execute(request.with_header(name, value)).await?;
        Ok(response)
    }

    fn rebuild_header(&self) -> String {
        format!("x-{}-rebuild", self.config.client_name.to_lowercase())
    }
}
