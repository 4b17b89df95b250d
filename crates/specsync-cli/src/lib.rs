//! specsync command line support
//!
//! Configuration loading, tracing setup and the command implementations
//! behind the `specsync` binary.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
pub mod config;
pub mod telemetry;

pub use commands::{PackageArgs, Summary};
pub use config::{AppConfig, ConfigError, BUCKET_URL_ENV, CACHE_URL_ENV, DEFAULT_CONFIG_FILE};
