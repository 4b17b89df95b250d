//! Error types for package loading
//!
//! Internal classification is kept precise for logging and tests; the text
//! shown to a user is collapsed by [`LoadError::user_message`].

use specsync_net::TransportError;

/// Errors raised while crawling, downloading or unpacking the client package
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Crawler could not produce a download location
    #[error("crawl failed: {0}")]
    Crawl(String),

    /// Transport failure, non-success status or empty body
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Decode parameters missing or malformed
    #[error("bad decode parameters: {0}")]
    Parameters(String),

    /// Symmetric decode pass failed
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Container unpack pass failed
    #[error("unpack failed: {0}")]
    Unpack(String),

    /// Decode succeeded but produced no artifacts
    #[error("package decoded to zero artifacts")]
    Integrity,
}

impl LoadError {
    /// Create network error for url
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Coarse message suitable for a user-facing dialog
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Crawl(_) => "please check your firewall and internet connection",
            Self::Parameters(_) => "error parsing parameters",
            Self::Network { .. } | Self::Decrypt(_) | Self::Unpack(_) | Self::Integrity => {
                "error downloading client"
            }
        }
    }
}

impl From<TransportError> for LoadError {
    fn from(error: TransportError) -> Self {
        let url = match &error {
            TransportError::InvalidUrl { url, .. }
            | TransportError::Failed { url, .. }
            | TransportError::Timeout { url } => url.clone(),
        };
        Self::network(url, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_collapsed() {
        assert_eq!(
            LoadError::Integrity.user_message(),
            LoadError::network("u", "reset").user_message()
        );
        assert_eq!(
            LoadError::Parameters("missing".into()).user_message(),
            "error parsing parameters"
        );
    }

    #[test]
    fn transport_errors_become_network_errors() {
        let err: LoadError = TransportError::Timeout {
            url: "http://h/pkg".into(),
        }
        .into();
        assert!(matches!(err, LoadError::Network { ref url, .. } if url == "http://h/pkg"));
    }
}
