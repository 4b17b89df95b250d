//! Pending/backoff state machine around [`SpecCacheClient::get`]
//!
//! ```text
//! Requesting ──Pending──▶ Waiting ──sleep──▶ Requesting ...
//!     │                      │
//!     ├──Ready/Stale──▶ done └──cancelled──▶ Interrupted
//! ```
//!
//! Unbounded unless [`RetryConfig`] sets an attempt limit or a deadline.

use crate::backoff::{describe_wait, policy_from_config, BackoffPolicy};
use crate::client::{CacheOutcome, PendingState, SpecCacheClient};
use crate::config::RetryConfig;
use crate::error::CacheError;
use crate::spec::TransformSpec;
use specsync_artifact::FrozenArtifactSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Terminal result of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Spec obtained
    Ready(TransformSpec),
    /// Entry does not describe the artifact set; rebuild it
    Stale,
}

#[derive(Debug, Clone, Copy)]
enum AcquireState {
    Requesting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
}

/// Resolves a spec, sleeping through pending answers
#[derive(Debug, Clone)]
pub struct SpecResolver {
    client: SpecCacheClient,
    retry: RetryConfig,
    policy: Arc<dyn BackoffPolicy>,
    cancel: CancellationToken,
}

impl SpecResolver {
    /// Create resolver with the policy described by `retry`
    #[must_use]
    pub fn new(client: SpecCacheClient, retry: RetryConfig) -> Self {
        let policy = policy_from_config(&retry);
        Self {
            client,
            retry,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// With a custom backoff policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn BackoffPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// With an externally owned cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Underlying protocol client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &SpecCacheClient {
        &self.client
    }

    /// Token that aborts waits in progress
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort any acquisition in progress
    #[inline]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolve the spec for `artifacts`.
    ///
    /// # Errors
    /// - [`CacheError::Interrupted`] if cancelled
    /// - [`CacheError::BackoffExhausted`] when a configured limit is reached
    /// - any fatal protocol error from the client
    pub async fn resolve(&self, artifacts: &FrozenArtifactSet) -> Result<Resolution, CacheError> {
        let started = Instant::now();
        let mut state = AcquireState::Requesting { attempt: 1 };

        loop {
            state = match state {
                AcquireState::Requesting { attempt } => {
                    if self.cancel.is_cancelled() {
                        return Err(CacheError::Interrupted);
                    }
                    match self.client.get(artifacts).await? {
                        CacheOutcome::Ready(spec) => return Ok(Resolution::Ready(spec)),
                        CacheOutcome::Stale => return Ok(Resolution::Stale),
                        CacheOutcome::Pending(pending) => {
                            let delay = self.plan_wait(&pending, attempt, started)?;
                            AcquireState::Waiting { attempt, delay }
                        }
                    }
                }
                AcquireState::Waiting { attempt, delay } => {
                    self.wait(delay).await?;
                    AcquireState::Requesting {
                        attempt: attempt + 1,
                    }
                }
            };
        }
    }

    /// Ask the cache to rebuild the entry for `artifacts` and wait out the
    /// pending delay it answers with.
    ///
    /// # Errors
    /// As for [`SpecResolver::resolve`].
    pub async fn rebuild(&self, artifacts: &FrozenArtifactSet) -> Result<(), CacheError> {
        if self.cancel.is_cancelled() {
            return Err(CacheError::Interrupted);
        }
        let started = Instant::now();
        let pending = self.client.submit(artifacts).await?;
        let delay = self.policy.next_delay(&pending, 1);
        self.check_deadline(delay, started, 1)?;
        self.wait(delay).await
    }

    fn plan_wait(
        &self,
        pending: &PendingState,
        attempt: u32,
        started: Instant,
    ) -> Result<Duration, CacheError> {
        if self.retry.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(CacheError::BackoffExhausted { attempts: attempt });
        }
        let delay = self.policy.next_delay(pending, attempt);
        self.check_deadline(delay, started, attempt)?;
        Ok(delay)
    }

    /// Fail if sleeping `delay` more would end past the configured deadline
    fn check_deadline(&self, delay: Duration, started: Instant, attempt: u32) -> Result<(), CacheError> {
        match self.retry.deadline_ms.map(Duration::from_millis) {
            Some(deadline) if started.elapsed() + delay > deadline => {
                Err(CacheError::BackoffExhausted { attempts: attempt })
            }
            _ => Ok(()),
        }
    }

    async fn wait(&self, delay: Duration) -> Result<(), CacheError> {
        tracing::warn!("Request pending, trying again in {}", describe_wait(delay));
        tokio::select! {
            () = self.cancel.cancelled() => Err(CacheError::Interrupted),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
