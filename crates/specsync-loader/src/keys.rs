//! Decode key pair
//!
//! The crawler scrapes two radix-encoded values from the application page.
//! They use base64 with `*` and `-` in place of `+` and `/`, and usually
//! without padding.

use crate::crawler::{IV_PARAMETER, KEY_PARAMETER};
use crate::error::LoadError;
use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use std::collections::HashMap;

const APP_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789*-") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid key alphabet"),
    };

/// Engine for the application's key encoding
pub const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &APP_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The two encoded keys needed to decrypt a package
///
/// Consumed by value: a pair is decoded exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeKeyPair {
    key: String,
    iv: String,
}

/// Raw key material after radix decoding
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

impl DecodeKeyPair {
    /// Pair from already-extracted encoded strings
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            iv: iv.into(),
        }
    }

    /// Pull the pair out of crawl parameters (`"0"` and `"-1"`).
    ///
    /// # Errors
    /// Returns [`LoadError::Parameters`] if either parameter is absent or blank.
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self, LoadError> {
        let get = |name: &str| {
            parameters
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| LoadError::Parameters(format!("missing parameter '{name}'")))
        };
        Ok(Self::new(get(KEY_PARAMETER)?, get(IV_PARAMETER)?))
    }

    /// Decode both values into raw bytes.
    ///
    /// Standard `+`/`/` characters are accepted as well.
    ///
    /// # Errors
    /// Returns [`LoadError::Parameters`] if either value is not valid base64.
    pub fn decode(self) -> Result<KeyMaterial, LoadError> {
        Ok(KeyMaterial {
            key: decode_radix(&self.key)
                .map_err(|e| LoadError::Parameters(format!("key: {e}")))?,
            iv: decode_radix(&self.iv).map_err(|e| LoadError::Parameters(format!("iv: {e}")))?,
        })
    }
}

/// Decode one value in the application's base64 variant
///
/// # Errors
/// Returns the base64 decode error for malformed input.
pub fn decode_radix(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '*',
            '/' => '-',
            other => other,
        })
        .collect();
    KEY_ENGINE.decode(normalized)
}

/// Encode bytes in the application's base64 variant
#[must_use]
pub fn encode_radix(bytes: &[u8]) -> String {
    KEY_ENGINE.encode(bytes)
}
