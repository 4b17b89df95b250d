//! Capture hook and accumulator
//!
//! While a session is trapping, every unit the host loads is offered to a
//! [`CaptureHook`]. Units that belong to the application (top-level name,
//! loaded under the application's loader) are kept; everything else is
//! ignored.

use crate::host::{LoadHook, LoadedUnit};
use dashmap::DashMap;
use specsync_artifact::Artifact;
use std::sync::Arc;

/// Concurrent store of captured artifacts
///
/// Inserts from several loading threads never block one another outside a
/// shard, and a drain never observes a torn entry.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    entries: Arc<DashMap<String, Artifact>>,
}

impl Accumulator {
    /// Create empty accumulator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an artifact, replacing an earlier capture of the same name
    pub fn insert(&self, artifact: Artifact) {
        self.entries.insert(artifact.name().to_string(), artifact);
    }

    /// Number of captured artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take everything captured so far
    pub fn drain(&self) -> Vec<Artifact> {
        let names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names
            .into_iter()
            .filter_map(|name| self.entries.remove(&name).map(|(_, artifact)| artifact))
            .collect()
    }
}

/// Load hook feeding an [`Accumulator`]
#[derive(Debug, Clone)]
pub struct CaptureHook {
    accumulator: Accumulator,
    loader_prefix: String,
}

impl CaptureHook {
    /// Hook keeping units whose loader parent type starts with `loader_prefix`
    #[must_use]
    pub fn new(accumulator: Accumulator, loader_prefix: impl Into<String>) -> Self {
        Self {
            accumulator,
            loader_prefix: loader_prefix.into(),
        }
    }

    /// Whether `unit` is application code
    #[must_use]
    pub fn accepts(&self, unit: &LoadedUnit) -> bool {
        !unit.name.contains('/') && unit.loader_parent.starts_with(&self.loader_prefix)
    }
}

impl LoadHook for CaptureHook {
    fn on_load(&self, unit: &LoadedUnit) {
        if self.accepts(unit) {
            tracing::trace!("captured {} ({} bytes)", unit.name, unit.bytes.len());
            self.accumulator
                .insert(Artifact::new(unit.name.clone(), unit.bytes.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook() -> (Accumulator, CaptureHook) {
        let acc = Accumulator::new();
        (acc.clone(), CaptureHook::new(acc, "app."))
    }

    #[test]
    fn keeps_top_level_application_units() {
        let (acc, hook) = hook();
        hook.on_load(&LoadedUnit::new("client", "app.loader.GameLoader", &b"c"[..]));
        hook.on_load(&LoadedUnit::new("java/lang/String", "app.loader.GameLoader", &b"s"[..]));
        hook.on_load(&LoadedUnit::new("ab", "sys.BootLoader", &b"a"[..]));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.drain()[0].name(), "client");
    }

    #[test]
    fn later_capture_wins() {
        let (acc, hook) = hook();
        hook.on_load(&LoadedUnit::new("ab", "app.L", &b"one"[..]));
        hook.on_load(&LoadedUnit::new("ab", "app.L", &b"two"[..]));
        let drained = acc.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].bytes().as_ref(), b"two");
        assert!(acc.is_empty());
    }

    #[test]
    fn concurrent_inserts_are_all_kept() {
        let (acc, hook) = hook();
        let hook = Arc::new(hook);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let hook = Arc::clone(&hook);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        hook.on_load(&LoadedUnit::new(format!("u{t}_{i}"), "app.L", vec![1u8]));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.drain().len(), 800);
    }
}
