//! Encrypted client package fixtures

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use flate2::write::GzEncoder;
use flate2::Compression;
use specsync_loader::{encode_radix, DecodeKeyPair, IV_PARAMETER, KEY_PARAMETER};
use std::collections::HashMap;
use std::io::Write;

/// A client package: tar entries, gzip-compressed, AES-CBC encrypted
#[derive(Debug, Clone)]
pub struct PackageFixture {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
    pub entries: Vec<(String, Vec<u8>)>,
}

impl PackageFixture {
    /// Package with a 128-bit key and the given `(path, bytes)` entries
    pub fn new<N: Into<String>, B: Into<Vec<u8>>>(entries: impl IntoIterator<Item = (N, B)>) -> Self {
        Self {
            key: (0u8..16).collect(),
            iv: (100u8..116).collect(),
            entries: entries
                .into_iter()
                .map(|(n, b)| (n.into(), b.into()))
                .collect(),
        }
    }

    /// With a different key (16, 24 or 32 bytes)
    #[must_use]
    pub fn with_key(mut self, key: Vec<u8>) -> Self {
        self.key = key;
        self
    }

    /// Radix-encoded key pair
    pub fn key_pair(&self) -> DecodeKeyPair {
        DecodeKeyPair::new(encode_radix(&self.key), encode_radix(&self.iv))
    }

    /// Crawl parameters carrying the key pair
    pub fn parameters(&self) -> HashMap<String, String> {
        HashMap::from([
            (KEY_PARAMETER.to_string(), encode_radix(&self.key)),
            (IV_PARAMETER.to_string(), encode_radix(&self.iv)),
        ])
    }

    /// Encrypted package bytes
    pub fn build(&self) -> Vec<u8> {
        encrypt(&self.key, &self.iv, &tar_gz(&self.entries))
    }
}

/// Gzip-compressed tar of `entries`; paths ending in `/` become directories
pub fn tar_gz(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, body) in entries {
        let mut header = tar::Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, path, std::io::empty())
                .expect("append directory");
        } else {
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, body.as_slice())
                .expect("append file");
        }
    }
    let mut gz = builder.into_inner().expect("finish tar");
    gz.flush().expect("flush gzip");
    gz.finish().expect("finish gzip")
}

/// AES-CBC/PKCS#7 encrypt with a 16, 24 or 32 byte key
pub fn encrypt(key: &[u8], iv: &[u8], plain: &[u8]) -> Vec<u8> {
    match key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .expect("key/iv")
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .expect("key/iv")
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        32 => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .expect("key/iv")
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        n => panic!("unsupported key length {n}"),
    }
}
