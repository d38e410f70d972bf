//! Collectors: the units that talk to one kind of node and report its identity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Collector                         │
//! │   name() / version() / collect() -> CollectOutcome       │
//! └───────┬───────────────┬────────────────┬─────────────────┘
//!         │               │                │
//!  ┌──────▼──────┐ ┌──────▼──────┐ ┌───────▼───────┐ ┌─────────────────┐
//!  │ Substrate   │ │ Ethereum    │ │ Static        │ │ Command         │
//!  │ (JSON-RPC)  │ │ (JSON-RPC)  │ │ (fixed data)  │ │ (external exe)  │
//!  └──────┬──────┘ └──────┬──────┘ └───────────────┘ └─────────────────┘
//!         └───────┬───────┘
//!          ┌──────▼───────┐
//!          │ RpcTransport │ (trait: HttpTransport / MockTransport)
//!          └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use harvester_core::collector::{CollectContext, CollectOutcome, Collector, SubstrateCollector, SubstrateConfig};
//! use harvester_core::rpc::MockTransport;
//!
//! let rpc = MockTransport::new()
//!     .with_result("system_version", "polkadot/v1.2.3")
//!     .with_result("system_name", "polkadot")
//!     .with_result("system_chain", "Polkadot");
//! let ctx = CollectContext::isolated(Arc::new(rpc));
//! let mut collector = SubstrateCollector::new(SubstrateConfig::default(), &ctx);
//! assert!(matches!(collector.collect(), CollectOutcome::Success(_)));
//! ```

mod command;
mod ethereum;
mod outcome;
mod static_data;
mod substrate;
mod traits;

pub use command::{CommandCollector, CommandConfig, DEFAULT_COMMAND_TIMEOUT};
pub use ethereum::{ETHEREUM_DEFAULT_RPC, ETHEREUM_RPC_ENV, EthereumCollector, EthereumConfig};
pub use outcome::{
    CollectOutcome, CollectResult, GENERIC_FAILURE, GENERIC_PARTIAL, Messages, Section,
};
pub use static_data::StaticCollector;
pub use substrate::{SUBSTRATE_DEFAULT_RPC, SUBSTRATE_RPC_ENV, SubstrateCollector, SubstrateConfig};
pub use traits::{CollectContext, Collector};
