//! Command implementations
//!
//! Each command takes an explicit transport so it can run against the
//! in-memory cache in tests; the binary passes a [`ReqwestTransport`].

use crate::config::AppConfig;
use anyhow::Context;
use serde::Serialize;
use specsync_artifact::FrozenArtifactSet;
use specsync_cache::{
    AdaptedSpec, CacheConfig, ReflectorSpec, Resolution, SpecCacheClient, SpecResolver,
};
use specsync_loader::{CrawlResult, DecodeKeyPair, Extractor, PackageFetcher, StaticCrawler};
use specsync_net::{HttpTransport, ReqwestTransport, TransportConfig, TransportError};
use specsync_session::{ClientBootstrap, SessionError};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

/// A package already on disk and its decode parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArgs {
    pub path: PathBuf,
    pub key: String,
    pub iv: String,
}

/// One mapped class in a [`Summary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub artifact: String,
    pub fields: usize,
}

/// What a command reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub hash: String,
    pub artifacts: usize,
    pub bytes: usize,
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<ClassSummary>>,
}

impl Summary {
    /// Summarize an artifact set
    #[must_use]
    pub fn of(artifacts: &FrozenArtifactSet) -> Self {
        let set = artifacts.set();
        Self {
            hash: artifacts.hash().to_hex(),
            artifacts: set.len(),
            bytes: set.total_bytes(),
            names: set.names().map(str::to_string).collect(),
            classes: None,
        }
    }

    /// Add the classes mapped by `spec`
    #[must_use]
    pub fn with_spec(mut self, spec: &AdaptedSpec) -> Self {
        self.classes = Some(
            spec.classes()
                .map(|c| ClassSummary {
                    name: c.name.clone(),
                    artifact: c.artifact.clone(),
                    fields: c.fields.len(),
                })
                .collect(),
        );
        self
    }

    /// Render as text, or as pretty JSON
    ///
    /// # Errors
    /// Fails only if serialization fails.
    pub fn render(&self, json: bool) -> anyhow::Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        let mut out = String::new();
        writeln!(out, "hash: {}", self.hash)?;
        writeln!(out, "artifacts: {} ({} bytes)", self.artifacts, self.bytes)?;
        if let Some(classes) = &self.classes {
            writeln!(out, "classes: {}", classes.len())?;
            for class in classes {
                writeln!(
                    out,
                    "  {} -> {} ({} fields)",
                    class.name, class.artifact, class.fields
                )?;
            }
        }
        Ok(out)
    }
}

/// Production transport honoring the cache request timeout
///
/// # Errors
/// Returns [`TransportError`] if the HTTP client cannot be built.
pub fn transport(cache: &CacheConfig) -> Result<Arc<dyn HttpTransport>, TransportError> {
    let config = TransportConfig {
        request_timeout: cache.request_timeout(),
        ..TransportConfig::default()
    };
    Ok(Arc::new(ReqwestTransport::new(&config)?))
}

/// Resolver for `config`, with a fresh cancellation token
///
/// # Errors
/// Fails when the configured cipher suite is unavailable.
pub fn resolver(
    transport: Arc<dyn HttpTransport>,
    config: &AppConfig,
) -> anyhow::Result<SpecResolver> {
    let client = SpecCacheClient::new(transport, config.cache.clone())?;
    Ok(SpecResolver::new(client, config.retry.clone()))
}

/// Cancel `resolver` on Ctrl-C
pub fn cancel_on_ctrl_c(resolver: &SpecResolver) {
    let token = resolver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

/// Read and decode a package from disk
///
/// # Errors
/// Fails when the file cannot be read or the package does not decode.
pub fn decode_package(config: &AppConfig, args: &PackageArgs) -> anyhow::Result<FrozenArtifactSet> {
    let raw = std::fs::read(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let keys = DecodeKeyPair::new(args.key.as_str(), args.iv.as_str());
    let artifacts = Extractor::new(config.extract.clone())
        .decode(keys, &raw)
        .map_err(SessionError::from)?;
    Ok(artifacts.freeze())
}

/// `hash`: decode a package on disk and report its content hash
///
/// # Errors
/// As for [`decode_package`].
pub fn hash(config: &AppConfig, args: &PackageArgs) -> anyhow::Result<Summary> {
    let artifacts = decode_package(config, args)?;
    tracing::info!("Unpacking ({})", artifacts.hash().short());
    Ok(Summary::of(&artifacts))
}

/// `fetch`: download, decode and resolve the package described by `crawl`
///
/// # Errors
/// Any [`SessionError`] from the bootstrap pipeline.
pub async fn fetch(
    transport: Arc<dyn HttpTransport>,
    config: &AppConfig,
    crawl: CrawlResult,
) -> anyhow::Result<Summary> {
    let resolver = resolver(Arc::clone(&transport), config)?;
    cancel_on_ctrl_c(&resolver);
    let bootstrap = ClientBootstrap::new(
        PackageFetcher::new(transport),
        Extractor::new(config.extract.clone()),
        resolver,
    );
    let loaded = bootstrap.load(&StaticCrawler::new(crawl)).await?;
    Ok(Summary::of(loaded.frozen()).with_spec(loaded.spec()))
}

/// `resolve`: decode a package on disk and resolve its spec
///
/// # Errors
/// As for [`decode_package`] and [`resolve_set`].
pub async fn resolve(
    transport: Arc<dyn HttpTransport>,
    config: &AppConfig,
    args: &PackageArgs,
    rebuild: bool,
) -> anyhow::Result<Summary> {
    let artifacts = decode_package(config, args)?;
    tracing::info!("Unpacking ({})", artifacts.hash().short());
    let resolver = resolver(transport, config)?;
    cancel_on_ctrl_c(&resolver);
    let spec = resolve_set(&resolver, &artifacts, rebuild).await?;
    Ok(Summary::of(&artifacts).with_spec(&spec))
}

/// Resolve and bind the spec for `artifacts`, rebuilding a stale entry once.
///
/// With `rebuild` the entry is rebuilt up front and a stale answer after
/// that is final.
///
/// # Errors
/// [`SessionError::Cache`] for cache failures, [`SessionError::Spec`] for
/// unusable specs, [`SessionError::SpecUnavailable`] when the entry is
/// still stale after a rebuild.
pub async fn resolve_set(
    resolver: &SpecResolver,
    artifacts: &FrozenArtifactSet,
    rebuild: bool,
) -> Result<Arc<AdaptedSpec>, SessionError> {
    let hash = artifacts.hash();
    let mut rebuilt = false;
    if rebuild {
        resolver.rebuild(artifacts).await?;
        rebuilt = true;
    }

    loop {
        let reason = match resolver.resolve(artifacts).await? {
            Resolution::Ready(spec) => {
                let adapted = Arc::new(spec.adapt()?);
                match ReflectorSpec::bind(Arc::clone(&adapted), artifacts.set()) {
                    Ok(_) => return Ok(adapted),
                    Err(e) if e.is_stale() => e.to_string(),
                    Err(e) => return Err(e.into()),
                }
            }
            Resolution::Stale => "entry invalidated".to_string(),
        };
        if rebuilt {
            return Err(SessionError::SpecUnavailable(hash.to_hex()));
        }
        tracing::info!("Spec for {} is stale ({}), rebuilding", hash.short(), reason);
        resolver.rebuild(artifacts).await?;
        rebuilt = true;
    }
}

/// Coarse message for the first known error in the chain
#[must_use]
pub fn user_message(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SessionError>() {
            return e.user_message().to_string();
        }
        if let Some(e) = cause.downcast_ref::<specsync_cache::CacheError>() {
            return e.user_message().to_string();
        }
        if let Some(e) = cause.downcast_ref::<specsync_loader::LoadError>() {
            return e.user_message().to_string();
        }
    }
    err.to_string()
}
