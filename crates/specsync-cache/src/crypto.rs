//! Hash-derived payload encryption
//!
//! Spec bodies and uploaded packs are encrypted with a key derived from the
//! content hash alone: the digest of the hash's hex string, truncated to
//! [`KEY_LEN`] bytes, drives a stream cipher. Anyone holding the artifact set
//! can therefore read and write its cache entry.

use crate::error::CacheError;
use flate2::write::GzEncoder;
use flate2::Compression;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use sha2::{Digest, Sha256};
use specsync_artifact::{write_pack, ContentHash, FrozenArtifactSet};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// Derived key length in bytes
pub const KEY_LEN: usize = 16;

/// Suite used when none is configured
pub const DEFAULT_SUITE: &str = "rc4-sha256";

/// Supported key-derivation + cipher combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// SHA-256 derived 128-bit key, RC4 keystream
    Rc4Sha256,
}

impl CipherSuite {
    /// Suite name as used in configuration
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rc4Sha256 => DEFAULT_SUITE,
        }
    }
}

impl FromStr for CipherSuite {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rc4-sha256" | "arcfour-sha256" => Ok(Self::Rc4Sha256),
            other => Err(CacheError::CryptoUnavailable(format!(
                "unknown cipher suite '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key for one cache entry
#[derive(Clone, PartialEq, Eq)]
pub struct SpecKey {
    suite: CipherSuite,
    key: [u8; KEY_LEN],
}

impl fmt::Debug for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecKey").field("suite", &self.suite).finish_non_exhaustive()
    }
}

impl SpecKey {
    /// Derive the key for `hash`
    #[must_use]
    pub fn derive(suite: CipherSuite, hash: &ContentHash) -> Self {
        let digest = match suite {
            CipherSuite::Rc4Sha256 => Sha256::digest(hash.to_hex().as_bytes()),
        };
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        Self { suite, key }
    }

    /// Fresh keystream positioned at the start of a payload.
    ///
    /// # Errors
    /// Returns [`CacheError::CryptoUnavailable`] if the cipher rejects the key.
    pub fn cipher(&self) -> Result<SpecCipher, CacheError> {
        match self.suite {
            CipherSuite::Rc4Sha256 => Rc4::<U16>::new_from_slice(&self.key)
                .map(SpecCipher)
                .map_err(|e| CacheError::CryptoUnavailable(e.to_string())),
        }
    }

    /// Decrypt (or encrypt) a whole payload
    ///
    /// # Errors
    /// See [`SpecKey::cipher`].
    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>, CacheError> {
        let mut out = data.to_vec();
        self.cipher()?.apply(&mut out);
        Ok(out)
    }
}

/// Stateful keystream
pub struct SpecCipher(Rc4<U16>);

impl SpecCipher {
    /// XOR the next `data.len()` keystream bytes into `data`
    #[inline]
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

impl fmt::Debug for SpecCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpecCipher")
    }
}

/// `Write` adapter that encrypts everything passing through it
#[derive(Debug)]
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: SpecCipher,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    /// Wrap `inner`
    #[inline]
    #[must_use]
    pub fn new(inner: W, cipher: SpecCipher) -> Self {
        Self {
            inner,
            cipher,
            scratch: Vec::new(),
        }
    }

    /// Unwrap the destination
    #[inline]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Pack `artifacts`, gzip the pack, then encrypt the compressed stream.
///
/// # Errors
/// Returns [`CacheError::Pack`] if an artifact cannot be packed, or a crypto
/// error from key setup.
pub fn seal_pack(key: &SpecKey, artifacts: &FrozenArtifactSet) -> Result<Vec<u8>, CacheError> {
    let sink = EncryptingWriter::new(Vec::new(), key.cipher()?);
    let mut gz = GzEncoder::new(sink, Compression::default());
    write_pack(artifacts.set(), &mut gz)?;
    let sink = gz.finish()?;
    Ok(sink.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use specsync_artifact::{read_pack, Artifact, ArtifactSet};
    use std::io::Read;

    fn frozen() -> FrozenArtifactSet {
        let set: ArtifactSet = vec![
            Artifact::new("b", b"second".to_vec()),
            Artifact::new("a", b"first".to_vec()),
        ]
        .into_iter()
        .collect();
        set.freeze()
    }

    #[test]
    fn unknown_suite_is_crypto_unavailable() {
        let err = "aes-gcm-siv".parse::<CipherSuite>().unwrap_err();
        assert!(matches!(err, CacheError::CryptoUnavailable(_)));
        assert_eq!("RC4-SHA256".parse::<CipherSuite>().unwrap(), CipherSuite::Rc4Sha256);
    }

    #[test]
    fn key_is_deterministic_per_hash() {
        let h1 = ContentHash::compute(b"one");
        let h2 = ContentHash::compute(b"two");
        let k1 = SpecKey::derive(CipherSuite::Rc4Sha256, &h1);
        assert_eq!(k1, SpecKey::derive(CipherSuite::Rc4Sha256, &h1));
        assert_ne!(k1, SpecKey::derive(CipherSuite::Rc4Sha256, &h2));
    }

    #[test]
    fn apply_is_an_involution() {
        let key = SpecKey::derive(CipherSuite::Rc4Sha256, &ContentHash::compute(b"k"));
        let cipher = key.apply(b"payload").unwrap();
        assert_ne!(cipher, b"payload");
        assert_eq!(key.apply(&cipher).unwrap(), b"payload");
    }

    #[test]
    fn writer_matches_whole_buffer_encryption() {
        let key = SpecKey::derive(CipherSuite::Rc4Sha256, &ContentHash::compute(b"k"));
        let mut writer = EncryptingWriter::new(Vec::new(), key.cipher().unwrap());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.into_inner(), key.apply(b"hello world").unwrap());
    }

    #[test]
    fn sealed_pack_is_compressed_then_encrypted() {
        let artifacts = frozen();
        let key = SpecKey::derive(CipherSuite::Rc4Sha256, &artifacts.hash());
        let sealed = seal_pack(&key, &artifacts).unwrap();

        let compressed = key.apply(&sealed).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut pack = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut pack).unwrap();
        let payloads = read_pack(&pack).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].as_ref(), b"first");
        assert_eq!(payloads[1].as_ref(), b"second");
    }
}
