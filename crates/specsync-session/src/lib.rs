//! specsync session
//!
//! Ties acquisition and the spec cache to a running host:
//!
//! - [`ClientBootstrap`]: download, decode and hash the client package, then
//!   resolve its spec
//! - [`CaptureSession`]: capture code loaded at runtime, resolve the spec for
//!   the merged set and apply it
//! - [`host`]: the collaborator traits a host implements

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod hook;
pub mod host;
pub mod session;

pub use bootstrap::{ClientBootstrap, LoadedClient};
pub use config::CaptureConfig;
pub use error::SessionError;
pub use hook::{Accumulator, CaptureHook};
pub use host::{
    ClientHost, Controller, Dispatcher, InputEvent, InputKind, InputObserver, InputSource, LoadHook,
    LoadRegistry, LoadedUnit, SessionHost, SubscriptionId,
};
pub use session::{CaptureSession, SessionId, SessionState};
