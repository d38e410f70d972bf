//! Collector discovery.
//!
//! A registry maps collector names to factories. It is assembled from three
//! sources, later ones replacing earlier ones on a name collision:
//!
//! ```text
//!   built-in list  ──►  linked extensions  ──►  plugin directories
//!   (this crate)        (register_collector!)   (*.json manifests)
//!      lowest                                      highest
//! ```
//!
//! Loading never fails: a broken plugin source is logged and skipped.

mod manifest;
mod plugins;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::collector::{
    CollectContext, Collector, EthereumCollector, EthereumConfig, StaticCollector,
    SubstrateCollector, SubstrateConfig,
};

pub use manifest::PluginError;
pub use plugins::CollectorPlugin;

#[doc(hidden)]
pub use inventory as __inventory;

/// Builds a fresh collector instance for one run.
pub type CollectorFactory = Arc<dyn Fn(&CollectContext) -> Box<dyn Collector> + Send + Sync>;

/// Where a registry entry came from. Ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Source {
    Builtin,
    Extension,
    Filesystem,
}

struct Entry {
    factory: CollectorFactory,
    source: Source,
}

/// Name-to-factory mapping, sorted by name.
#[derive(Default)]
pub struct CollectorRegistry {
    entries: BTreeMap<String, Entry>,
}

impl CollectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the collectors shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, factory) in builtin_factories() {
            registry.register(name, Source::Builtin, factory);
        }
        registry
    }

    /// Adds or replaces a collector unconditionally.
    pub fn insert(&mut self, name: impl Into<String>, factory: CollectorFactory) {
        self.entries.insert(
            name.into(),
            Entry {
                factory,
                source: Source::Filesystem,
            },
        );
    }

    /// Adds a collector unless an entry of higher precedence already holds the name.
    pub(crate) fn register(&mut self, name: impl Into<String>, source: Source, factory: CollectorFactory) {
        let name = name.into();
        if let Some(existing) = self.entries.get(&name) {
            if existing.source > source {
                debug!(collector = %name, ?source, kept = ?existing.source, "lower precedence collector ignored");
                return;
            }
            debug!(collector = %name, ?source, replaced = ?existing.source, "collector overridden");
        }
        self.entries.insert(name, Entry { factory, source });
    }

    pub fn get(&self, name: &str) -> Option<&CollectorFactory> {
        self.entries.get(name).map(|e| &e.factory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name and version of every collector, instantiating each once.
    pub fn describe(&self, ctx: &CollectContext) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let collector = (entry.factory)(ctx);
                (name.clone(), collector.version().to_string())
            })
            .collect()
    }

    pub(crate) fn source(&self, name: &str) -> Option<Source> {
        self.entries.get(name).map(|e| e.source)
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, e)| (name, e.source)))
            .finish()
    }
}

fn substrate(config: SubstrateConfig) -> (String, CollectorFactory) {
    let name = config.name.clone();
    let factory: CollectorFactory =
        Arc::new(move |ctx: &CollectContext| -> Box<dyn Collector> {
            Box::new(SubstrateCollector::new(config.clone(), ctx))
        });
    (name, factory)
}

fn ethereum(config: EthereumConfig) -> (String, CollectorFactory) {
    let name = config.name.clone();
    let factory: CollectorFactory =
        Arc::new(move |ctx: &CollectContext| -> Box<dyn Collector> {
            Box::new(EthereumCollector::new(config.clone(), ctx))
        });
    (name, factory)
}

fn fixed(collector: StaticCollector) -> (String, CollectorFactory) {
    let name = collector.name().to_string();
    let factory: CollectorFactory =
        Arc::new(move |_: &CollectContext| -> Box<dyn Collector> { Box::new(collector.clone()) });
    (name, factory)
}

fn builtin_factories() -> Vec<(String, CollectorFactory)> {
    vec![
        fixed(StaticCollector::null()),
        fixed(StaticCollector::dummychain()),
        substrate(SubstrateConfig::default()),
        substrate(SubstrateConfig::polkadot()),
        substrate(SubstrateConfig::ajuna()),
        ethereum(EthereumConfig::reth()),
        ethereum(EthereumConfig::op_reth()),
        ethereum(EthereumConfig::bera_reth()),
        ethereum(EthereumConfig::geth()),
    ]
}

/// Builds the registry from built-ins, linked extensions and the manifests
/// found in `plugin_dirs` (scanned in the given order).
pub fn load_collectors(plugin_dirs: &[PathBuf]) -> CollectorRegistry {
    let mut registry = CollectorRegistry::with_builtins();

    for plugin in plugins::linked() {
        let factory = plugin.factory;
        registry.register(
            plugin.name,
            Source::Extension,
            Arc::new(move |ctx: &CollectContext| factory(ctx)),
        );
    }

    for dir in plugin_dirs {
        for (name, factory) in manifest::scan_dir(dir) {
            registry.register(name, Source::Filesystem, factory);
        }
    }

    info!(collectors = registry.len(), plugin_dirs = plugin_dirs.len(), "collector registry loaded");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectOutcome;
    use crate::rpc::MockTransport;

    fn ctx() -> CollectContext {
        CollectContext::isolated(Arc::new(MockTransport::new()))
    }

    fn version_of(registry: &CollectorRegistry, name: &str) -> String {
        let factory = registry.get(name).unwrap();
        factory(&ctx()).version().to_string()
    }

    #[test]
    fn test_builtins_present() {
        let registry = CollectorRegistry::with_builtins();
        for name in [
            "null", "dummychain", "substrate", "polkadot", "ajuna", "reth", "op-reth",
            "bera-reth", "geth",
        ] {
            assert!(registry.contains(name), "{name}");
            assert_eq!(registry.source(name), Some(Source::Builtin));
        }
    }

    #[test]
    fn test_factory_builds_fresh_instances() {
        let registry = CollectorRegistry::with_builtins();
        let factory = registry.get("null").unwrap();
        let mut first = factory(&ctx());
        let mut second = factory(&ctx());
        assert!(matches!(first.collect(), CollectOutcome::Success(_)));
        assert!(matches!(second.collect(), CollectOutcome::Success(_)));
    }

    #[test]
    fn test_lower_precedence_does_not_replace() {
        let mut registry = CollectorRegistry::with_builtins();
        let factory: CollectorFactory = Arc::new(|_: &CollectContext| -> Box<dyn Collector> {
            Box::new(StaticCollector::new("null", "7.0.0", Default::default(), Default::default()))
        });
        registry.register("null", Source::Filesystem, factory.clone());
        registry.register("null", Source::Extension, factory);
        assert_eq!(registry.source("null"), Some(Source::Filesystem));
    }

    #[test]
    fn test_filesystem_manifest_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("null.json"),
            r#"{"name": "null", "version": "9.9.9", "kind": "static",
                "workload": {"client_name": "override"}}"#,
        )
        .unwrap();

        let registry = load_collectors(&[dir.path().to_path_buf()]);
        assert_eq!(registry.source("null"), Some(Source::Filesystem));
        assert_eq!(version_of(&registry, "null"), "9.9.9");
    }

    #[test]
    fn test_later_plugin_dir_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(
            first.path().join("a.json"),
            r#"{"name": "site", "version": "1", "kind": "static", "blockchain": {"blockchain_network_name": "a"}}"#,
        )
        .unwrap();
        std::fs::write(
            second.path().join("a.json"),
            r#"{"name": "site", "version": "2", "kind": "static", "blockchain": {"blockchain_network_name": "b"}}"#,
        )
        .unwrap();

        let registry = load_collectors(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(version_of(&registry, "site"), "2");
    }

    #[test]
    fn test_malformed_manifest_does_not_hide_valid_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"name": "good", "version": "1", "kind": "static", "workload": {"client_name": "g"}}"#,
        )
        .unwrap();

        let registry = load_collectors(&[dir.path().to_path_buf()]);
        assert!(registry.contains("good"));
        assert!(registry.contains("null"));
    }

    #[test]
    fn test_missing_plugin_dir_is_skipped() {
        let registry = load_collectors(&[PathBuf::from("/nonexistent/harvester-plugins")]);
        assert_eq!(registry.len(), CollectorRegistry::with_builtins().len() + plugins::linked().count());
    }

    #[test]
    fn test_describe_lists_versions_sorted() {
        let registry = CollectorRegistry::with_builtins();
        let described = registry.describe(&ctx());
        assert_eq!(described.len(), registry.len());
        assert!(described.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(described.contains(&("null".to_string(), "0.1.0".to_string())));
    }
}
