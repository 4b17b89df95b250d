//! specsync loader
//!
//! Obtains the client's code artifacts from the distributed package:
//!
//! - [`Crawler`]: external source of the archive URL, referer and parameters
//! - [`PackageFetcher`]: downloads the encrypted package
//! - [`DecodeKeyPair`]: the two radix-encoded keys (`"0"`, `"-1"`)
//! - [`Extractor`]: decrypts and unpacks into an [`ArtifactSet`]
//!
//! [`ArtifactSet`]: specsync_artifact::ArtifactSet

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod keys;

pub use crawler::{CrawlResult, Crawler, StaticCrawler, IV_PARAMETER, KEY_PARAMETER};
pub use error::LoadError;
pub use extract::{ExtractConfig, Extractor};
pub use fetch::PackageFetcher;
pub use keys::{decode_radix, encode_radix, DecodeKeyPair, KeyMaterial};
