//! specsync spec cache
//!
//! Client side of the shared spec cache. For a [`ContentHash`] the service
//! either returns the spec, says it is being built, or elects the caller to
//! build it; at most one caller per hash uploads.
//!
//! - [`SpecCacheClient`]: one protocol round (`get`) and explicit rebuild (`submit`)
//! - [`SpecResolver`]: pending/backoff state machine with cancellation
//! - [`TransformSpec`] / [`AdaptedSpec`] / [`ReflectorSpec`]: the spec as
//!   fetched, normalized, and bound to a session's artifacts
//! - [`SpecKey`]: hash-derived payload key
//!
//! [`ContentHash`]: specsync_artifact::ContentHash

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod memo;
pub mod resolver;
pub mod spec;

pub use backoff::{describe_wait, policy_from_config, BackoffPolicy, Jittered, ServerDirected};
pub use client::{CacheOutcome, PendingCause, PendingState, SpecCacheClient};
pub use config::{CacheConfig, RetryConfig, DEFAULT_BASE_DELAY_MS};
pub use crypto::{seal_pack, CipherSuite, EncryptingWriter, SpecKey, DEFAULT_SUITE};
pub use error::CacheError;
pub use memo::SpecMemo;
pub use resolver::{Resolution, SpecResolver};
pub use spec::{
    AdaptedSpec, ClassDocument, ClassMap, FieldDocument, FieldRef, ReflectorSpec, SpecDocument,
    SpecError, TransformSpec, SPEC_VERSION,
};
