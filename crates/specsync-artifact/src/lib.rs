//! specsync artifact model
//!
//! Named code artifacts, the canonical content hash that keys the spec
//! cache, and the pack container used when uploading a set.
//!
//! # Core Concepts
//!
//! - [`Artifact`]: one named unit of code
//! - [`ArtifactSet`]: name-ordered, deduplicated collection for one session
//! - [`FrozenArtifactSet`]: hashed, immutable snapshot handed to the cache client
//! - [`ContentHash`]: 32-byte Blake3 digest over the set, sorted by name
//!
//! # Example
//!
//! ```rust
//! use specsync_artifact::{Artifact, ArtifactSet};
//!
//! let set: ArtifactSet = vec![
//!     Artifact::new("client", b"...".to_vec()),
//!     Artifact::new("ab", b"...".to_vec()),
//! ]
//! .into_iter()
//! .collect();
//!
//! let frozen = set.freeze();
//! assert_eq!(frozen.hash().to_string().len(), 64);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod hash;
pub mod pack;

pub use artifact::{Artifact, ArtifactSet, FrozenArtifactSet};
pub use hash::{ContentHash, HashError, HASH_LEN};
pub use pack::{read_pack, write_pack, PackError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
