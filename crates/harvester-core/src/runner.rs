//! Running collectors.
//!
//! `Harvester` resolves names against a registry, builds a fresh collector
//! per run, times it and wraps the outcome into a `CollectorDocument`.
//! `collect_all` runs a batch sequentially; one collector failing never
//! stops the others.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::collector::{CollectContext, CollectOutcome};
use crate::error::HarvestError;
use crate::registry::{CollectorFactory, CollectorRegistry};
use crate::report::{AggregatedReport, CollectStatus, CollectorDocument};
use crate::schema::{Schema, SchemaSource};

/// Options shared by single and batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub schema: SchemaSource,
    pub validate: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            schema: SchemaSource::Bundled,
            validate: true,
        }
    }
}

impl RunOptions {
    fn schema(&self) -> Result<Option<Schema>, HarvestError> {
        if !self.validate {
            return Ok(None);
        }
        Ok(Some(Schema::load(&self.schema)?))
    }
}

/// Runs collectors from a registry with a given context.
pub struct Harvester<'a> {
    registry: &'a CollectorRegistry,
    ctx: CollectContext,
}

impl<'a> Harvester<'a> {
    pub fn new(registry: &'a CollectorRegistry, ctx: CollectContext) -> Self {
        Self { registry, ctx }
    }

    /// Runs one collector.
    ///
    /// A partial result is returned as `Ok` with status `partial`. A total
    /// failure is returned as `CollectorFailed`, still carrying the error document.
    pub fn run_collector(
        &self,
        name: &str,
        options: &RunOptions,
    ) -> Result<CollectorDocument, HarvestError> {
        let factory = self
            .registry
            .get(name)
            .ok_or_else(|| HarvestError::UnknownCollector {
                name: name.to_string(),
            })?;
        let schema = options.schema()?;

        let document = self.execute(name, factory);

        if document.status() == CollectStatus::Error {
            return Err(HarvestError::CollectorFailed {
                name: name.to_string(),
                messages: document.messages().to_vec(),
                document: Box::new(document),
            });
        }

        if let Some(schema) = schema {
            let mut wrapped = Map::new();
            wrapped.insert(name.to_string(), serde_json::to_value(&document)?);
            if let Err(source) = schema.validate(&Value::Object(wrapped)) {
                warn!(collector = %name, error = %source, "collector document failed validation");
                return Err(HarvestError::SchemaViolation {
                    document: Box::new(document),
                    source,
                });
            }
        }

        Ok(document)
    }

    /// Runs every requested collector once and collects the documents.
    ///
    /// Duplicate names are run once, at the position of their last
    /// occurrence. Unknown names and failing collectors become `error`
    /// entries. Only an empty request, a request naming no known collector
    /// or an unusable schema is returned as an error.
    pub fn collect_all<S: AsRef<str>>(
        &self,
        names: &[S],
        options: &RunOptions,
    ) -> Result<AggregatedReport, HarvestError> {
        let requested = dedup_keep_last(names);
        if !requested.iter().any(|n| self.registry.contains(n)) {
            return Err(HarvestError::NoKnownCollectors { requested });
        }
        let schema = options.schema()?;

        let started = Instant::now();
        let mut report = AggregatedReport::new();
        for name in &requested {
            let document = match self.registry.get(name) {
                Some(factory) => self.execute(name, factory),
                None => {
                    warn!(collector = %name, "unknown collector requested");
                    CollectorDocument::unknown(name, Utc::now())
                }
            };
            report.insert(document);
        }

        if let Some(schema) = schema {
            let value = report.to_value()?;
            let validation = schema.validate(&value).err();
            if let Some(e) = &validation {
                warn!(error = %e, "report failed validation");
            }
            report.set_validation(validation);
        }

        info!(
            collectors = report.len(),
            success = report.count(CollectStatus::Success),
            partial = report.count(CollectStatus::Partial),
            error = report.count(CollectStatus::Error),
            duration_ms = started.elapsed().as_millis() as u64,
            "collection finished"
        );
        Ok(report)
    }

    fn execute(&self, name: &str, factory: &CollectorFactory) -> CollectorDocument {
        let mut collector = factory(&self.ctx);
        let collected_at = Utc::now();
        let started = Instant::now();
        let outcome = collector.collect();
        let elapsed = started.elapsed();

        match &outcome {
            CollectOutcome::Success(_) => {
                debug!(collector = %name, duration_ms = elapsed.as_millis() as u64, "collector succeeded")
            }
            CollectOutcome::Partial { messages, .. } => warn!(
                collector = %name,
                duration_ms = elapsed.as_millis() as u64,
                messages = %messages.joined(),
                "collector returned partial data"
            ),
            CollectOutcome::Failed(messages) => warn!(
                collector = %name,
                duration_ms = elapsed.as_millis() as u64,
                messages = %messages.joined(),
                "collector failed"
            ),
        }

        let version = collector.version().to_string();
        CollectorDocument::from_outcome(name, &version, outcome, collected_at, elapsed)
    }
}

/// Trims names, drops blanks and keeps each remaining name at its last position.
fn dedup_keep_last<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = names
        .iter()
        .rev()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty() && seen.insert(n.to_string()))
        .map(str::to_string)
        .collect();
    unique.reverse();
    unique
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::collector::{Collector, Section, StaticCollector, SubstrateCollector, SubstrateConfig};
    use crate::rpc::MockTransport;

    const GENESIS: &str = "0xb0a8d493285c2df73290dfb7e61f870f17b41801197a149ca93654499ea3dafe";

    struct AlwaysFails;

    impl Collector for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn collect(&mut self) -> CollectOutcome {
            CollectOutcome::failed(["node unreachable"])
        }
    }

    fn known_good() -> StaticCollector {
        let mut blockchain = Section::new();
        blockchain.insert("blockchain_ecosystem".into(), json!("Test"));
        let mut workload = Section::new();
        workload.insert("client_name".into(), json!("good"));
        StaticCollector::new("known_good", "1.0.0", blockchain, workload)
    }

    fn registry() -> CollectorRegistry {
        let mut registry = CollectorRegistry::with_builtins();
        registry.insert(
            "known_good",
            Arc::new(|_: &CollectContext| -> Box<dyn Collector> { Box::new(known_good()) }),
        );
        registry.insert(
            "always_fails",
            Arc::new(|_: &CollectContext| -> Box<dyn Collector> { Box::new(AlwaysFails) }),
        );
        registry
    }

    fn ctx(rpc: MockTransport) -> CollectContext {
        CollectContext::isolated(Arc::new(rpc))
    }

    #[test]
    fn test_unknown_collector() {
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let err = harvester.run_collector("nope", &RunOptions::default()).unwrap_err();
        assert!(matches!(err, HarvestError::UnknownCollector { ref name } if name == "nope"));
    }

    #[test]
    fn test_substrate_with_no_rpc_is_collector_failed() {
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let err = harvester.run_collector("substrate", &RunOptions::default()).unwrap_err();
        let HarvestError::CollectorFailed { messages, document, .. } = err else {
            panic!("expected CollectorFailed");
        };
        assert!(!messages.is_empty());
        assert_eq!(document.status(), CollectStatus::Error);
        assert!(document.blockchain.is_empty());
        assert!(document.workload.is_empty());
    }

    #[test]
    fn test_substrate_partial_is_ok() {
        let registry = registry();
        let rpc = MockTransport::new()
            .with_result("system_version", "polkadot/v1.2.3")
            .with_result("system_chain", "Kusama");
        let harvester = Harvester::new(&registry, ctx(rpc));
        let doc = harvester.run_collector("substrate", &RunOptions::default()).unwrap();
        assert_eq!(doc.status(), CollectStatus::Partial);
        assert_eq!(doc.blockchain["blockchain_network_name"], "Kusama");
        assert_eq!(doc.workload["client_version"], "polkadot/v1.2.3");
        assert!(doc.messages().iter().any(|m| m.contains("chain_getBlockHash")));
        assert!(doc.messages().iter().any(|m| m.contains("client_name")));
    }

    #[test]
    fn test_polkadot_without_system_name_succeeds() {
        let registry = registry();
        let rpc = MockTransport::new()
            .with_result("system_version", "polkadot/v1.2.3")
            .with_result("system_chain", "Kusama")
            .with_result("chain_getBlockHash", GENESIS)
            .with_error("system_name", "method not found");
        let harvester = Harvester::new(&registry, ctx(rpc));
        let doc = harvester.run_collector("polkadot", &RunOptions::default()).unwrap();
        assert_eq!(doc.status(), CollectStatus::Success);
        assert_eq!(doc.metadata.collector_name, "polkadot");
        assert_eq!(doc.blockchain["blockchain_ecosystem"], "Polkadot");
        assert_eq!(doc.blockchain["chain_id"], GENESIS);
        assert_eq!(doc.workload["client_name"], "polkadot");
    }

    #[test]
    fn test_client_name_from_system_name_or_override() {
        let rpc = || {
            MockTransport::new()
                .with_result("system_version", "v1")
                .with_result("system_name", "parity-polkadot")
                .with_result("system_chain", "Polkadot")
        };
        let registry = registry();

        let derived = Harvester::new(&registry, ctx(rpc()))
            .run_collector("substrate", &RunOptions::default())
            .unwrap();
        assert_eq!(derived.workload["client_name"], "parity-polkadot");

        let overridden = Harvester::new(&registry, ctx(rpc()))
            .run_collector("ajuna", &RunOptions::default())
            .unwrap();
        assert_eq!(overridden.workload["client_name"], "ajuna-node");
    }

    #[test]
    fn test_aggregation_isolates_failures() {
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let report = harvester
            .collect_all(&["known_good", "unknown_x", "always_fails"], &RunOptions::default())
            .unwrap();

        assert_eq!(report.names(), ["known_good", "unknown_x", "always_fails"]);
        assert_eq!(report.get("known_good").unwrap().status(), CollectStatus::Success);

        let unknown = report.get("unknown_x").unwrap();
        assert_eq!(unknown.status(), CollectStatus::Error);
        assert!(unknown.messages()[0].contains("unknown_x"));

        let failed = report.get("always_fails").unwrap();
        assert_eq!(failed.status(), CollectStatus::Error);
        assert_eq!(failed.messages(), ["node unreachable".to_string()]);

        assert!(report.validation().is_none());
    }

    #[test]
    fn test_duplicates_run_once_at_last_position() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = registry();
        let counter = Arc::clone(&runs);
        registry.insert(
            "counted",
            Arc::new(move |_: &CollectContext| -> Box<dyn Collector> {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(known_good())
            }),
        );
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let report = harvester
            .collect_all(&["counted", "null", " counted "], &RunOptions::default())
            .unwrap();
        assert_eq!(report.names(), ["null", "counted"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_known_collectors() {
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let empty: [&str; 0] = [];
        assert!(matches!(
            harvester.collect_all(&empty, &RunOptions::default()),
            Err(HarvestError::NoKnownCollectors { .. })
        ));
        assert!(matches!(
            harvester.collect_all(&["ghost", "phantom"], &RunOptions::default()),
            Err(HarvestError::NoKnownCollectors { ref requested }) if requested.len() == 2
        ));
    }

    #[test]
    fn test_unreadable_schema_is_systemic() {
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));
        let options = RunOptions {
            schema: SchemaSource::Path("/nonexistent/schema.json".into()),
            validate: true,
        };
        assert!(matches!(
            harvester.collect_all(&["null"], &options),
            Err(HarvestError::Schema(_))
        ));

        let skipped = RunOptions {
            validate: false,
            ..options
        };
        assert_eq!(harvester.collect_all(&["null"], &skipped).unwrap().len(), 1);
    }

    #[test]
    fn test_schema_violation_keeps_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"type": "object", "additionalProperties": {"type": "object", "required": ["chain_extras"]}}"#,
        )
        .unwrap();
        let options = RunOptions {
            schema: SchemaSource::Path(file.path().to_path_buf()),
            validate: true,
        };
        let registry = registry();
        let harvester = Harvester::new(&registry, ctx(MockTransport::new()));

        let err = harvester.run_collector("null", &options).unwrap_err();
        assert_eq!(err.document().map(CollectorDocument::name), Some("null"));
        let HarvestError::SchemaViolation { document, source } = err else {
            panic!("expected SchemaViolation");
        };
        assert_eq!(document.status(), CollectStatus::Success);
        assert!(!source.violations().is_empty());

        let report = harvester.collect_all(&["null", "known_good"], &options).unwrap();
        assert_eq!(report.count(CollectStatus::Success), 2);
        assert!(report.validation().is_some());
    }

    #[test]
    fn test_rpc_url_taken_from_context() {
        let registry = registry();
        let rpc = MockTransport::new().with_result("system_chain", "Westend");
        let context = ctx(rpc).with_var("SUBSTRATE_RPC_URL", "http://node:9944");
        let collector = SubstrateCollector::new(SubstrateConfig::default(), &context);
        assert_eq!(collector.rpc_url(), "http://node:9944");

        let doc = Harvester::new(&registry, context)
            .run_collector("substrate", &RunOptions { validate: false, ..Default::default() })
            .unwrap();
        assert_eq!(doc.workload["rpc_url"], "http://node:9944");
    }

    #[test]
    fn test_dedup_keep_last() {
        assert_eq!(dedup_keep_last(&["a", "b", "a", "", "c", "b"]), ["a", "c", "b"]);
    }
}
