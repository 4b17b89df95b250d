//! Decoder / extractor
//!
//! Two passes recover the artifacts from the downloaded bytes:
//! 1. AES-CBC with PKCS#7 padding (key size picked from the decoded key);
//! 2. a tar container, gzip-compressed when it starts with the gzip magic.

use crate::error::LoadError;
use crate::keys::{DecodeKeyPair, KeyMaterial};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use specsync_artifact::{Artifact, ArtifactSet};
use std::io::{Cursor, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Suffix removed from entry paths to form artifact names
    pub strip_suffix: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            strip_suffix: ".class".to_string(),
        }
    }
}

/// Turns an encrypted package into an [`ArtifactSet`]
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractConfig,
}

impl Extractor {
    /// Create extractor with settings
    #[inline]
    #[must_use]
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Decode `keys`, decrypt `raw` and unpack it.
    ///
    /// # Errors
    /// - [`LoadError::Parameters`] for undecodable keys or unsupported sizes
    /// - [`LoadError::Decrypt`] when padding does not check out
    /// - [`LoadError::Unpack`] for a corrupt container
    /// - [`LoadError::Integrity`] when nothing was extracted
    pub fn decode(&self, keys: DecodeKeyPair, raw: &[u8]) -> Result<ArtifactSet, LoadError> {
        let material = keys.decode()?;
        let plain = decrypt(&material, raw)?;
        let set = self.unpack(&plain)?;
        if set.is_empty() {
            return Err(LoadError::Integrity);
        }
        tracing::debug!(
            "extracted {} artifacts ({} bytes) from {} byte package",
            set.len(),
            set.total_bytes(),
            raw.len()
        );
        Ok(set)
    }

    /// Unpack a decrypted container.
    ///
    /// # Errors
    /// Returns [`LoadError::Unpack`] if the archive is malformed.
    pub fn unpack(&self, plain: &[u8]) -> Result<ArtifactSet, LoadError> {
        if plain.starts_with(&GZIP_MAGIC) {
            self.read_archive(GzDecoder::new(plain))
        } else {
            self.read_archive(Cursor::new(plain))
        }
    }

    fn read_archive<R: Read>(&self, reader: R) -> Result<ArtifactSet, LoadError> {
        let unpack_err = |e: std::io::Error| LoadError::Unpack(e.to_string());
        let mut archive = tar::Archive::new(reader);
        let mut set = ArtifactSet::new();

        for entry in archive.entries().map_err(unpack_err)? {
            let mut entry = entry.map_err(unpack_err)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(unpack_err)?;
            let path = path.to_string_lossy().into_owned();
            let name = path
                .strip_suffix(self.config.strip_suffix.as_str())
                .filter(|n| !n.is_empty())
                .unwrap_or(&path)
                .to_string();

            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(unpack_err)?;
            set.insert(Artifact::new(name, bytes));
        }

        Ok(set)
    }
}

/// AES-CBC decrypt `data` with the decoded key material.
///
/// # Errors
/// Returns [`LoadError::Parameters`] for an unsupported key or IV length and
/// [`LoadError::Decrypt`] for bad padding.
pub fn decrypt(material: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, LoadError> {
    match material.key.len() {
        16 => cbc_decrypt::<aes::Aes128>(material, data),
        24 => cbc_decrypt::<aes::Aes192>(material, data),
        32 => cbc_decrypt::<aes::Aes256>(material, data),
        n => Err(LoadError::Parameters(format!("unsupported key length {n}"))),
    }
}

fn cbc_decrypt<C>(material: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, LoadError>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let cipher = cbc::Decryptor::<C>::new_from_slices(&material.key, &material.iv)
        .map_err(|_| LoadError::Parameters(format!("bad iv length {}", material.iv.len())))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| LoadError::Decrypt("invalid padding (wrong keys or corrupt package)".into()))
}
