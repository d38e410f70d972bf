//! Errors returned by the runner and aggregator.

use crate::report::CollectorDocument;
use crate::schema::{SchemaError, SchemaValidationError};

/// Error from running one collector or a batch.
#[derive(Debug)]
pub enum HarvestError {
    /// Requested name is not in the registry.
    UnknownCollector { name: String },
    /// Collector ran and reported a total failure. The error document is kept
    /// so callers can still publish it.
    CollectorFailed {
        name: String,
        messages: Vec<String>,
        document: Box<CollectorDocument>,
    },
    /// Document was produced but does not conform to the schema.
    SchemaViolation {
        document: Box<CollectorDocument>,
        source: SchemaValidationError,
    },
    /// Schema could not be loaded.
    Schema(SchemaError),
    /// Batch request named nothing the registry knows.
    NoKnownCollectors { requested: Vec<String> },
    /// Document could not be turned into JSON for validation.
    Serialize(serde_json::Error),
}

impl HarvestError {
    /// Document computed before the error, if any.
    pub fn document(&self) -> Option<&CollectorDocument> {
        match self {
            HarvestError::CollectorFailed { document, .. }
            | HarvestError::SchemaViolation { document, .. } => Some(document),
            _ => None,
        }
    }
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarvestError::UnknownCollector { name } => write!(f, "unknown collector '{}'", name),
            HarvestError::CollectorFailed { name, messages, .. } => {
                write!(f, "collector '{}' failed: {}", name, messages.join("; "))
            }
            HarvestError::SchemaViolation { document, source } => {
                write!(f, "collector '{}': {}", document.name(), source)
            }
            HarvestError::Schema(e) => write!(f, "{}", e),
            HarvestError::NoKnownCollectors { requested } if requested.is_empty() => {
                write!(f, "no collectors requested")
            }
            HarvestError::NoKnownCollectors { requested } => {
                write!(f, "none of the requested collectors are known: {}", requested.join(", "))
            }
            HarvestError::Serialize(e) => write!(f, "cannot serialize document: {}", e),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarvestError::SchemaViolation { source, .. } => Some(source),
            HarvestError::Schema(e) => Some(e),
            HarvestError::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(e: serde_json::Error) -> Self {
        HarvestError::Serialize(e)
    }
}

impl From<SchemaError> for HarvestError {
    fn from(e: SchemaError) -> Self {
        HarvestError::Schema(e)
    }
}
