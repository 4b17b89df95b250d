//! Backoff policies for pending cache entries

use crate::client::PendingState;
use crate::config::RetryConfig;
use rand::Rng;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Decides how long to wait before asking the cache again
pub trait BackoffPolicy: Send + Sync + Debug {
    /// Wait after the `attempt`-th pending answer (1-based)
    fn next_delay(&self, pending: &PendingState, attempt: u32) -> Duration;
}

/// Wait exactly as long as the service asked
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerDirected;

impl BackoffPolicy for ServerDirected {
    #[inline]
    fn next_delay(&self, pending: &PendingState, _attempt: u32) -> Duration {
        pending.delay
    }
}

/// Server delay plus a random extra in `0..=max_jitter`
///
/// Spreads out clients that were told to wait at the same moment.
#[derive(Debug, Clone, Copy)]
pub struct Jittered {
    max_jitter: Duration,
}

impl Jittered {
    /// Create jittered policy
    #[inline]
    #[must_use]
    pub fn new(max_jitter: Duration) -> Self {
        Self { max_jitter }
    }
}

impl BackoffPolicy for Jittered {
    fn next_delay(&self, pending: &PendingState, _attempt: u32) -> Duration {
        let max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return pending.delay;
        }
        let extra = rand::rng().random_range(0..=max);
        pending.delay + Duration::from_millis(extra)
    }
}

/// Policy described by `config`
#[must_use]
pub fn policy_from_config(config: &RetryConfig) -> Arc<dyn BackoffPolicy> {
    if config.jitter_ms == 0 {
        Arc::new(ServerDirected)
    } else {
        Arc::new(Jittered::new(Duration::from_millis(config.jitter_ms)))
    }
}

/// Human form of a wait: whole seconds under a minute, else minutes rounded up.
#[must_use]
pub fn describe_wait(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs < 60 {
        format!("{secs} seconds")
    } else {
        format!("{} minutes", secs.div_ceil(60))
    }
}
