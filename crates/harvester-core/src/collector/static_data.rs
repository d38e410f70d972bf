//! Collectors reporting fixed data: the built-in `null` and `dummychain`
//! collectors and `static` plugin manifests.

use serde_json::json;

use crate::collector::outcome::{CollectOutcome, Section};
use crate::collector::traits::Collector;

/// Collector that always reports the same sections.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticCollector {
    name: String,
    version: String,
    blockchain: Section,
    workload: Section,
}

impl StaticCollector {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        blockchain: Section,
        workload: Section,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            blockchain,
            workload,
        }
    }

    /// Placeholder collector; useful to check the pipeline end to end.
    pub fn null() -> Self {
        let mut blockchain = Section::new();
        blockchain.insert("blockchain_ecosystem".into(), json!("none"));
        blockchain.insert("blockchain_network_name".into(), json!("none"));
        let mut workload = Section::new();
        workload.insert("client_name".into(), json!("null"));
        workload.insert("client_version".into(), json!("0.0.0"));
        Self::new("null", "0.1.0", blockchain, workload)
    }

    /// Example chain with every field filled in.
    pub fn dummychain() -> Self {
        let mut blockchain = Section::new();
        blockchain.insert("blockchain_ecosystem".into(), json!("Dummychain"));
        blockchain.insert("blockchain_network_name".into(), json!("dummynet"));
        blockchain.insert("chain_id".into(), json!("0"));
        let mut workload = Section::new();
        workload.insert("client_name".into(), json!("dummy-node"));
        workload.insert("client_version".into(), json!("dummy-node/v0.0.1"));
        Self::new("dummychain", "0.1.0", blockchain, workload)
    }
}

impl Collector for StaticCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn collect(&mut self) -> CollectOutcome {
        CollectOutcome::success(self.blockchain.clone(), self.workload.clone())
    }
}
