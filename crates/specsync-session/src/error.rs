//! Error types for sessions and bootstrap

use specsync_cache::{CacheError, SpecError};
use specsync_loader::LoadError;

/// Errors ending a capture session or a client bootstrap
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Package acquisition failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Spec cache failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Spec could not be adapted
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Cache has no usable spec for the downloaded package
    #[error("no spec available for {0}")]
    SpecUnavailable(String),

    /// Stale rebuild limit reached
    #[error("spec still stale after {0} rebuilds")]
    RebuildsExhausted(u32),

    /// Session was closed before it finished
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Coarse message suitable for a user-facing dialog
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Load(e) => e.user_message(),
            Self::Cache(e) => e.user_message(),
            Self::Closed => "cancelled",
            Self::Spec(_) | Self::SpecUnavailable(_) | Self::RebuildsExhausted(_) => {
                "error getting spec"
            }
        }
    }
}
