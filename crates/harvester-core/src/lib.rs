//! harvester-core: collector framework for blockchain node metadata.
//!
//! Provides:
//! - `collector`: the `Collector` trait, outcome model and built-in collectors
//! - `registry`: discovery of collectors (built-in, linked extensions, plugin manifests)
//! - `runner`: running one collector or a batch into a report
//! - `report`: the documents produced per collector and per batch
//! - `schema`: JSON Schema validation of reports
//! - `rpc`: blocking JSON-RPC client used by chain-family collectors
//! - `error`: error types returned by the runner

pub mod collector;
pub mod error;
pub mod registry;
pub mod report;
pub mod rpc;
pub mod runner;
pub mod schema;

pub use collector::{CollectContext, CollectOutcome, CollectResult, Collector, Messages, Section};
pub use error::HarvestError;
pub use registry::{CollectorRegistry, load_collectors};
pub use report::{AggregatedReport, CollectStatus, CollectorDocument};
pub use runner::{Harvester, RunOptions};
pub use schema::{Schema, SchemaSource, SchemaValidationError};

/// Crate version with the short git SHA it was built from (e.g. "0.3.0-abc1234").
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "-",
    env!("HARVESTER_GIT_SHA")
);
