//! Error types for the spec cache
//!
//! `Pending` and `Stale` are not errors: they are [`CacheOutcome`] values the
//! caller loops on. Everything here ends acquisition.
//!
//! [`CacheOutcome`]: crate::client::CacheOutcome

use crate::spec::SpecError;
use specsync_artifact::{ContentHash, PackError};
use specsync_net::{StatusCode, TransportError};

/// Fatal spec-cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No response obtained from the cache
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cache answered `400` for this hash
    #[error("cache rejected update for {hash}")]
    Rejected { hash: ContentHash },

    /// Builder upload was not accepted
    #[error("upload rejected with status {status}")]
    UploadRejected { status: StatusCode },

    /// Completion notification was not accepted
    #[error("completion notify rejected with status {status}")]
    NotifyRejected { status: StatusCode },

    /// Unexpected status or malformed response
    #[error("protocol error (status {status}): {detail}")]
    Protocol { status: StatusCode, detail: String },

    /// Requested cipher suite or key size is not available
    #[error("crypto unavailable: {0}")]
    CryptoUnavailable(String),

    /// Artifact set could not be packed
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// Compression stream failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Spec document could not be adapted
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),

    /// Cancelled while waiting for a pending entry
    #[error("spec acquisition interrupted")]
    Interrupted,

    /// Configured retry limits were reached
    #[error("gave up after {attempts} attempts")]
    BackoffExhausted { attempts: u32 },
}

impl CacheError {
    /// Create protocol error
    pub fn protocol(status: StatusCode, detail: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            detail: detail.into(),
        }
    }

    /// Whether the failure came from the network rather than the service
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether acquisition was cancelled
    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Coarse message suitable for a user-facing dialog
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transport(_) => "please check your firewall and internet connection",
            Self::Interrupted => "cancelled",
            _ => "error getting spec",
        }
    }
}
