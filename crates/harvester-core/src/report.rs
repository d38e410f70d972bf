//! Documents produced by a run.
//!
//! One `CollectorDocument` per collector:
//!
//! ```json
//! {
//!   "metadata": {
//!     "collector_name": "polkadot",
//!     "collector_version": "0.1.0",
//!     "last_collect_status": "success",
//!     "collected_at": "2025-01-01T00:00:00.000Z",
//!     "collect_duration_ms": 12,
//!     "messages": []
//!   },
//!   "blockchain": { "blockchain_ecosystem": "Polkadot", ... },
//!   "workload": { "client_name": "polkadot", ... }
//! }
//! ```
//!
//! An `AggregatedReport` serializes as an object keyed by collector name, in
//! the order the entries were added.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::collector::{CollectOutcome, Section};
use crate::schema::SchemaValidationError;

/// Status of the last collection, as reported in `metadata.last_collect_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectStatus {
    Success,
    Partial,
    Error,
}

impl CollectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectStatus::Success => "success",
            CollectStatus::Partial => "partial",
            CollectStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CollectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution metadata attached to every collector document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub collector_name: String,
    pub collector_version: String,
    pub last_collect_status: CollectStatus,
    /// RFC 3339 UTC timestamp of the start of the collection.
    pub collected_at: String,
    pub collect_duration_ms: u64,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Normalized output of one collector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorDocument {
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Section::is_empty")]
    pub blockchain: Section,
    #[serde(default, skip_serializing_if = "Section::is_empty")]
    pub workload: Section,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl CollectorDocument {
    /// Wraps an outcome with execution metadata.
    pub fn from_outcome(
        name: &str,
        version: &str,
        outcome: CollectOutcome,
        collected_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let (status, blockchain, workload, messages) = match outcome {
            CollectOutcome::Success(result) => {
                let (b, w) = result.into_sections();
                (CollectStatus::Success, b, w, Vec::new())
            }
            CollectOutcome::Partial { result, messages } => {
                let (b, w) = result.into_sections();
                (CollectStatus::Partial, b, w, messages.into_vec())
            }
            CollectOutcome::Failed(messages) => (
                CollectStatus::Error,
                Section::new(),
                Section::new(),
                messages.into_vec(),
            ),
        };
        Self {
            metadata: DocumentMetadata {
                collector_name: name.to_string(),
                collector_version: version.to_string(),
                last_collect_status: status,
                collected_at: format_timestamp(collected_at),
                collect_duration_ms: duration.as_millis() as u64,
                messages,
            },
            blockchain,
            workload,
        }
    }

    /// Error document for a name the registry does not know.
    pub fn unknown(name: &str, collected_at: DateTime<Utc>) -> Self {
        Self {
            metadata: DocumentMetadata {
                collector_name: name.to_string(),
                collector_version: "unknown".to_string(),
                last_collect_status: CollectStatus::Error,
                collected_at: format_timestamp(collected_at),
                collect_duration_ms: 0,
                messages: vec![format!("unknown collector '{}'", name)],
            },
            blockchain: Section::new(),
            workload: Section::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.collector_name
    }

    pub fn status(&self) -> CollectStatus {
        self.metadata.last_collect_status
    }

    pub fn messages(&self) -> &[String] {
        &self.metadata.messages
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Batch result: one document per requested collector, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedReport {
    entries: Vec<CollectorDocument>,
    validation: Option<SchemaValidationError>,
}

impl AggregatedReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document. An existing entry with the same name is removed first,
    /// so the new one takes the last position.
    pub fn insert(&mut self, document: CollectorDocument) {
        self.entries.retain(|d| d.name() != document.name());
        self.entries.push(document);
    }

    pub fn get(&self, name: &str) -> Option<&CollectorDocument> {
        self.entries.iter().find(|d| d.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(CollectorDocument::name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whole-report schema violation, if validation ran and failed.
    pub fn validation(&self) -> Option<&SchemaValidationError> {
        self.validation.as_ref()
    }

    pub(crate) fn set_validation(&mut self, validation: Option<SchemaValidationError>) {
        self.validation = validation;
    }

    /// Number of entries with the given status.
    pub fn count(&self, status: CollectStatus) -> usize {
        self.entries.iter().filter(|d| d.status() == status).count()
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for AggregatedReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for document in &self.entries {
            map.serialize_entry(document.name(), document)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(name: &str) -> CollectorDocument {
        CollectorDocument::unknown(name, Utc::now())
    }

    #[test]
    fn test_failed_outcome_has_no_sections() {
        let d = CollectorDocument::from_outcome(
            "x",
            "1",
            CollectOutcome::failed(["down"]),
            Utc::now(),
            Duration::from_millis(5),
        );
        let v = d.to_value().unwrap();
        assert_eq!(v["metadata"]["last_collect_status"], "error");
        assert_eq!(v["metadata"]["messages"], json!(["down"]));
        assert_eq!(v["metadata"]["collect_duration_ms"], 5);
        assert!(v.get("blockchain").is_none());
        assert!(v.get("workload").is_none());
    }

    #[test]
    fn test_unknown_document_mentions_name() {
        let d = doc("nope");
        assert_eq!(d.status(), CollectStatus::Error);
        assert!(d.messages()[0].contains("'nope'"));
    }

    #[test]
    fn test_report_keeps_insertion_order_and_replaces_duplicates() {
        let mut report = AggregatedReport::new();
        report.insert(doc("b"));
        report.insert(doc("a"));
        report.insert(doc("b"));
        assert_eq!(report.names(), ["a", "b"]);

        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(CollectStatus::Partial).unwrap(), "partial");
        assert_eq!(CollectStatus::Error.to_string(), "error");
    }
}
