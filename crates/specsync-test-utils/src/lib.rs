//! Testing utilities for the specsync workspace
//!
//! Shared fixtures: encrypted client packages, an in-memory spec cache
//! service and a recording host.

#![allow(missing_docs)]

pub mod host;
pub mod package;
pub mod server;

pub use host::{Counters, RecordingHost};
pub use package::{encrypt, tar_gz, PackageFixture};
pub use server::{name_prefix_spec, EntryState, MemoryCacheServer, SpecBuilder, CACHE_BASE, UPLOAD_BASE};

use specsync_artifact::{Artifact, ArtifactSet, FrozenArtifactSet};
use specsync_cache::CacheConfig;
use std::time::Duration;

/// Artifact whose payload is `name:body`, so [`name_prefix_spec`] can map it
pub fn named_artifact(name: &str, body: &str) -> Artifact {
    Artifact::new(name, format!("{name}:{body}").into_bytes())
}

/// Set of [`named_artifact`]s
pub fn artifact_set(names: &[&str]) -> ArtifactSet {
    names.iter().map(|n| named_artifact(n, "code")).collect()
}

/// Frozen set of [`named_artifact`]s
pub fn frozen_set(names: &[&str]) -> FrozenArtifactSet {
    artifact_set(names).freeze()
}

/// Cache config pointing at [`MemoryCacheServer`] with a one-second base delay
pub fn test_cache_config() -> CacheConfig {
    CacheConfig::new(CACHE_BASE).with_base_delay(Duration::from_millis(1000))
}
